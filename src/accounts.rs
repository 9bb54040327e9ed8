//! Registration and login
//!
//! Passwords are stored as bcrypt hashes. Hashing and verification run on
//! the blocking pool.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::auth::{AuthError, TokenAuthority};
use crate::models::User;
use crate::store::{Store, StoreError};
use crate::types::UserId;

const MIN_PASSWORD_LEN: usize = 8;

/// `POST /api/v1/register` body
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

/// `POST /api/v1/login` body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn Store>,
    tokens: Arc<TokenAuthority>,
    password_cost: u32,
}

impl Accounts {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenAuthority>, password_cost: u32) -> Self {
        Self {
            store,
            tokens,
            password_cost,
        }
    }

    /// Create an account and return a token for it
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<String, AuthError> {
        let email = request.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AuthError::InvalidRegistration("invalid email".to_string()));
        }
        if request.password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidRegistration(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user = User {
            id: UserId::new(),
            name: request.name.trim().to_string(),
            email,
            password_hash: hash_password(request.password, self.password_cost).await?,
        };
        let id = user.id;

        match self.store.create_user(user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        info!(user = %id, "user registered");
        self.tokens.issue(id)
    }

    /// Check credentials and return a fresh token
    pub async fn login(&self, request: LoginRequest) -> Result<String, AuthError> {
        let user = self
            .store
            .find_user_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(request.password, user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        self.tokens.issue(user.id)
    }

    /// Resolve an `Authorization` header to an existing user
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<UserId, AuthError> {
        let user = self.tokens.authenticate(authorization)?;
        if !self.store.user_exists(user).await? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

/// A stored hash bcrypt cannot parse never matches
async fn verify_password(password: String, stored: String) -> Result<bool, AuthError> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored)).await?;
    Ok(verified.unwrap_or(false))
}
