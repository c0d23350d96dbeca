use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::gateway::{AuthError, AuthGateway};
use crate::auth::session::SqliteSessionStore;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub auth: AuthGateway,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Result<Self, AuthError> {
        let sessions = Arc::new(SqliteSessionStore::new(db.clone()));
        let auth = AuthGateway::new(db.clone(), sessions, &config.auth)?;
        Ok(Self { db, config, auth })
    }
}
