//! Identity seam and the client-side auth rules layered on top of it.
//!
//! [`IdentityService`] is the opaque provider (sign-up, sign-in, sessions,
//! OAuth). [`AuthActions`] validates input, maps provider messages to the
//! wording shown to users, and mirrors new users into the data store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{User, UserRecord};
use tracing::{debug, warn};

use crate::store::{DataStore, StoreError};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Message reported by the provider, e.g. "Invalid login credentials"
    #[error("{0}")]
    Provider(String),

    #[error("Identity backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for IdentityError {
    fn from(e: sqlx::Error) -> Self {
        IdentityError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpCredentials {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user: User,
    pub issued_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>, IdentityError>;

    async fn sign_up(&self, credentials: SignUpCredentials) -> Result<AuthSession, IdentityError>;

    async fn sign_in(&self, credentials: SignInCredentials) -> Result<AuthSession, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// URL that starts the provider's OAuth flow
    fn oauth_authorize_url(&self, provider: OAuthProvider) -> Result<String, IdentityError>;

    /// Provider an existing account with `email` was created with, if any
    async fn primary_provider(&self, email: &str) -> Result<Option<String>, IdentityError>;
}

// ============================================================================
// Display Names
// ============================================================================

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// First non-blank of full name, name, user name, email.
pub fn display_name(user: &User) -> Option<String> {
    let meta = &user.metadata;
    non_blank(meta.full_name.as_deref())
        .or_else(|| non_blank(meta.name.as_deref()))
        .or_else(|| non_blank(meta.user_name.as_deref()))
        .or_else(|| non_blank(user.email.as_deref()))
}

/// Name stamped on comments and shared snippets.
pub fn author_name(user: &User) -> String {
    let meta = &user.metadata;
    non_blank(meta.full_name.as_deref())
        .or_else(|| non_blank(meta.name.as_deref()))
        .or_else(|| {
            user.email
                .as_deref()
                .and_then(|email| non_blank(email.split('@').next()))
        })
        .unwrap_or_else(|| "Anonymous".to_string())
}

/// Mirror `user` into the data store's `users` table.
pub async fn mirror_user(
    store: &dyn DataStore,
    user: &User,
    override_name: Option<&str>,
) -> Result<(), StoreError> {
    let name = non_blank(override_name)
        .or_else(|| non_blank(user.metadata.full_name.as_deref()))
        .or_else(|| non_blank(user.metadata.name.as_deref()));
    store
        .upsert_user(UserRecord {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name,
        })
        .await
}

// ============================================================================
// Validation and Message Mapping
// ============================================================================

/// Message shown to the user when an auth action fails
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AuthFailure(pub String);

fn validate_email_and_password(email: &str, password: &str) -> Option<&'static str> {
    if email.is_empty() || password.is_empty() {
        return Some("Email and password are required");
    }
    None
}

fn validate_full_name(full_name: &str) -> Option<&'static str> {
    if full_name.trim().chars().count() < 2 {
        return Some("Full name must be at least 2 characters");
    }
    None
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn provider_label(provider: Option<&str>) -> Option<String> {
    let lower = provider?.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    Some(match lower.as_str() {
        "email" => "Mail".to_string(),
        "google" => "Google".to_string(),
        "github" => "GitHub".to_string(),
        other => capitalize(other),
    })
}

fn already_exists(label: &str) -> String {
    format!("An account with this email already exists with {label}")
}

fn map_sign_up_error(message: &str, existing_provider: Option<&str>) -> String {
    let msg = message.to_lowercase();
    if msg.contains("user already registered") {
        return match provider_label(existing_provider) {
            Some(label) => already_exists(&label),
            None => already_exists("Email or Google or Github"),
        };
    }
    if msg.contains("password should be at least") {
        return "Password does not meet requirements".to_string();
    }
    message.to_string()
}

fn map_sign_in_error(message: &str, user_exists: Option<bool>) -> String {
    if message.to_lowercase().contains("invalid login credentials") {
        if user_exists == Some(false) {
            return "No account found for this email".to_string();
        }
        return "Incorrect password".to_string();
    }
    message.to_string()
}

// ============================================================================
// Auth Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub session: AuthSession,
    pub full_name: String,
}

pub struct AuthActions {
    identity: Arc<dyn IdentityService>,
    store: Arc<dyn DataStore>,
}

impl AuthActions {
    pub fn new(identity: Arc<dyn IdentityService>, store: Arc<dyn DataStore>) -> Self {
        Self { identity, store }
    }

    pub async fn sign_up(
        &self,
        credentials: SignUpCredentials,
    ) -> Result<SignUpOutcome, AuthFailure> {
        let email = credentials.email.trim().to_string();
        let full_name = credentials.full_name.trim().to_string();
        if let Some(message) = validate_email_and_password(&email, &credentials.password)
            .or_else(|| validate_full_name(&full_name))
        {
            return Err(AuthFailure(message.to_string()));
        }

        let existing_provider = match self.identity.primary_provider(&email).await {
            Ok(provider) => provider,
            Err(e) => {
                debug!(error = %e, "Provider lookup failed during sign-up");
                None
            }
        };
        if let Some(label) = provider_label(existing_provider.as_deref()) {
            return Err(AuthFailure(already_exists(&label)));
        }

        let session = self
            .identity
            .sign_up(SignUpCredentials {
                email,
                password: credentials.password,
                full_name: full_name.clone(),
            })
            .await
            .map_err(|e| {
                AuthFailure(map_sign_up_error(
                    &e.to_string(),
                    existing_provider.as_deref(),
                ))
            })?;

        if let Err(e) = mirror_user(self.store.as_ref(), &session.user, Some(&full_name)).await {
            warn!(error = %e, user_id = %session.user.id, "Failed to mirror new user");
        }

        Ok(SignUpOutcome { session, full_name })
    }

    pub async fn sign_in(
        &self,
        credentials: SignInCredentials,
    ) -> Result<AuthSession, AuthFailure> {
        let email = credentials.email.trim().to_string();
        if let Some(message) = validate_email_and_password(&email, &credentials.password) {
            return Err(AuthFailure(message.to_string()));
        }

        let user_exists = match self.store.find_user_by_email(&email).await {
            Ok(row) => Some(row.is_some()),
            Err(e) => {
                debug!(error = %e, "User mirror lookup failed during sign-in");
                None
            }
        };

        self.identity
            .sign_in(SignInCredentials {
                email,
                password: credentials.password,
            })
            .await
            .map_err(|e| AuthFailure(map_sign_in_error(&e.to_string(), user_exists)))
    }

    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        self.identity
            .sign_out()
            .await
            .map_err(|e| AuthFailure(e.to_string()))
    }

    pub fn oauth_redirect(&self, provider: OAuthProvider) -> Result<String, AuthFailure> {
        self.identity
            .oauth_authorize_url(provider)
            .map_err(|e| AuthFailure(e.to_string()))
    }
}
