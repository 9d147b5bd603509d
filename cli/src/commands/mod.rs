pub mod auth;
pub mod check;
pub mod navigate;
pub mod permissions;
pub mod routes;
