mod handler;
pub mod model;

pub(crate) use handler::issue_session;
pub use handler::{
    change_password, forgot_password, login, logout, profile, refresh_token, register,
    reset_password,
};
