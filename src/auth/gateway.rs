use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::auth::session::{generate_token, SessionStore, SessionStoreError};
use crate::config::AuthConfig;
use crate::db::models::{Session, User};
use crate::db::users::{self, NewUserRecord};
use crate::db::is_unique_violation;
use crate::state::DbPool;

const MIN_PASSWORD_LEN: usize = 8;
const DUMMY_PASSWORD: &str = "not-a-real-password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Session store error: {0}")]
    Store(#[from] SessionStoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: String,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: Option<bool>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_date_of_birth(value: &str) -> Result<(), AuthError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| AuthError::Validation("Date of birth must be YYYY-MM-DD".into()))
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl NewUser {
    fn validate(&self) -> Result<(), AuthError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("A valid email is required".into()));
        }
        validate_password(&self.password)?;
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AuthError::Validation("First and last name are required".into()));
        }
        validate_date_of_birth(&self.date_of_birth)
    }
}

/// Credential checks and the session lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct AuthGateway {
    db: DbPool,
    sessions: Arc<dyn SessionStore>,
    session_hours: u64,
    bcrypt_cost: u32,
    /// Verified against when the email is unknown, at the configured cost.
    dummy_hash: Arc<str>,
}

impl AuthGateway {
    /// Hashes the dummy password up front, so it runs once at startup and
    /// fails there if the configured cost is invalid.
    pub fn new(
        db: DbPool,
        sessions: Arc<dyn SessionStore>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, config.bcrypt_cost)?;
        Ok(Self {
            db,
            sessions,
            session_hours: config.session_hours,
            bcrypt_cost: config.bcrypt_cost,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let cost = self.bcrypt_cost;
        Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
    }

    /// A malformed stored hash counts as a mismatch.
    async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?;
        Ok(verified.unwrap_or(false))
    }

    pub async fn register(&self, new: NewUser) -> Result<User, AuthError> {
        new.validate()?;
        let email = normalize_email(&new.email);

        {
            let conn = self.db.get()?;
            if users::email_exists(&conn, &email)? {
                return Err(AuthError::EmailTaken);
            }
        }

        let password_hash = self.hash_password(&new.password).await?;

        let mut conn = self.db.get()?;
        let tx = conn.transaction()?;
        let user = match users::insert(
            &tx,
            &NewUserRecord {
                email: &email,
                password_hash: &password_hash,
                first_name: new.first_name.trim(),
                last_name: new.last_name.trim(),
                date_of_birth: new.date_of_birth.trim(),
                nickname: non_empty(new.nickname.as_deref()),
                about_me: non_empty(new.about_me.as_deref()),
                avatar_url: non_empty(new.avatar_url.as_deref()),
                is_public: new.is_public.unwrap_or(true),
            },
        ) {
            Ok(user) => user,
            // Lost a race with a concurrent registration for the same email.
            Err(e) if is_unique_violation(&e) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;

        tracing::info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    /// Unknown emails still pay for a bcrypt verification and get the same error.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let user = {
            let conn = self.db.get()?;
            users::find_by_email(&conn, &email)?
        };

        match user {
            Some(user) => {
                if Self::verify_password(password, &user.password_hash).await? {
                    Ok(user)
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
            None => {
                Self::verify_password(password, &self.dummy_hash).await?;
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    pub async fn create_session(&self, user_id: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            token: generate_token(),
            created_at: now,
            expires_at: now + Duration::hours(self.session_hours as i64),
        };
        self.sessions.insert(&session).await?;
        Ok(session.token)
    }

    /// Resolves a token to its user. Expired sessions are deleted on sight.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<User>, AuthError> {
        let Some(session) = self.sessions.find_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            self.sessions.delete_by_id(&session.id).await?;
            tracing::debug!(session_id = %session.id, "Deleted expired session");
            return Ok(None);
        }

        let conn = self.db.get()?;
        Ok(users::find_by_id(&conn, &session.user_id)?)
    }

    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.delete_by_token(token).await?;
        Ok(())
    }

    pub async fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, AuthError> {
        Ok(self.sessions.delete_for_user(user_id).await?)
    }

    /// Replaces the password, revokes every session of the user and issues a
    /// fresh one for the caller.
    pub async fn change_password(
        &self,
        user_id: &str,
        current: &str,
        new: &str,
    ) -> Result<String, AuthError> {
        validate_password(new)?;

        let stored_hash = {
            let conn = self.db.get()?;
            users::find_by_id(&conn, user_id)?
                .map(|u| u.password_hash)
                .ok_or(AuthError::InvalidCredentials)?
        };
        if !Self::verify_password(current, &stored_hash).await? {
            return Err(AuthError::Validation("Current password is incorrect".into()));
        }

        let new_hash = self.hash_password(new).await?;
        {
            let conn = self.db.get()?;
            users::set_password_hash(&conn, user_id, &new_hash)?;
        }

        let revoked = self.revoke_all_sessions(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Password changed");
        self.create_session(user_id).await
    }
}
