mod handler;
pub mod model;

pub use handler::google_auth;
