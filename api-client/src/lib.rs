//! HTTP access to the Tally backend.
//!
//! [`HttpClient`] is the seam the permission cache depends on; [`ApiClient`]
//! is the production implementation over `reqwest`.

pub mod client;
pub mod error;

pub use client::{ApiClient, HttpClient};
pub use error::{ClientError, Result};
