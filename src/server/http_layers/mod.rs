mod auth;
mod requests_logging;

pub use auth::require_bearer_auth;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
