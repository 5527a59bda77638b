pub mod channels;
pub mod credentials;
pub mod dms;
pub mod error;
pub mod membership;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;
pub mod users;
pub mod workspaces;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner, AuthConfig};
