//! Route table and the navigation gate that enforces its requirements.

pub mod error;
pub mod gate;
pub mod loading;
pub mod routes;

pub use error::{Result, RouteError};
pub use gate::{
    DenialReason, GateConfig, GateState, NavigationOutcome, Navigator, RouteAuthorizationGate,
};
pub use loading::{LoadingGuard, LoadingIndicator};
pub use routes::{RequiredPermissions, RouteDef, RouteMatch, RouteMeta, RouteTable, DEFAULT_PROJECT_PARAM};
