mod handler;
pub mod model;

pub use handler::{impersonate, update_user};
