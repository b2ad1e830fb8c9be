mod auth;
mod error_handler;

pub use auth::{CurrentUser, auth_middleware, permits, require_admin};
pub use error_handler::log_errors;
