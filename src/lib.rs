use std::sync::Arc;

use config::Config;
use sqlx::PgPool;

use crate::email::EmailSender;

pub mod config;
pub mod email;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod token;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub http: reqwest::Client,
    pub mailer: Arc<dyn EmailSender>,
}
