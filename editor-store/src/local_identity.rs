//! Self-hosted [`IdentityService`] over the SQLite pool.
//!
//! Email/password accounts with argon2id hashes, one signed-in session per
//! process. OAuth sign-in is delegated to the configured base URL.

use std::sync::Mutex;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use shared_types::{User, UserMetadata};
use sqlx::SqlitePool;
use tracing::info;
use url::Url;

use crate::auth::{
    AuthSession, IdentityError, IdentityService, OAuthProvider, SignInCredentials,
    SignUpCredentials,
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    provider: String,
}

impl AccountRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            email: Some(self.email),
            metadata: UserMetadata {
                full_name: self.full_name,
                name: None,
                user_name: None,
            },
            provider: Some(self.provider),
        }
    }
}

pub struct LocalIdentity {
    pool: SqlitePool,
    oauth_base_url: String,
    redirect_path: String,
    current: Mutex<Option<User>>,
}

impl LocalIdentity {
    pub fn new(
        pool: SqlitePool,
        oauth_base_url: impl Into<String>,
        redirect_path: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            oauth_base_url: oauth_base_url.into(),
            redirect_path: redirect_path.into(),
            current: Mutex::new(None),
        }
    }

    /// Create the accounts table if it does not exist.
    pub async fn migrate(&self) -> Result<(), IdentityError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id            TEXT    PRIMARY KEY,
                email         TEXT    NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT    NOT NULL,
                full_name     TEXT,
                provider      TEXT    NOT NULL,
                created_at    INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_account(&self, email: &str) -> Result<Option<AccountRow>, IdentityError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, full_name, provider FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    fn start_session(&self, user: User) -> AuthSession {
        *self.current.lock().expect("LocalIdentity lock poisoned") = Some(user.clone());
        AuthSession {
            user,
            issued_at: Utc::now(),
        }
    }
}

fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| IdentityError::Backend(format!("argon2 salt error: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Backend(format!("argon2 hash error: {e}")))
}

fn verify_password(candidate: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn current_user(&self) -> Result<Option<User>, IdentityError> {
        Ok(self
            .current
            .lock()
            .expect("LocalIdentity lock poisoned")
            .clone())
    }

    async fn sign_up(&self, credentials: SignUpCredentials) -> Result<AuthSession, IdentityError> {
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::Provider(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.find_account(&credentials.email).await?.is_some() {
            return Err(IdentityError::Provider("User already registered".to_string()));
        }

        let account = AccountRow {
            id: uuid::Uuid::new_v4().to_string(),
            email: credentials.email,
            password_hash: hash_password(&credentials.password)?,
            full_name: Some(credentials.full_name).filter(|n| !n.is_empty()),
            provider: "email".to_string(),
        };
        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, full_name, provider, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(&account.provider)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        info!(user_id = %account.id, "Account created");
        Ok(self.start_session(account.into_user()))
    }

    async fn sign_in(&self, credentials: SignInCredentials) -> Result<AuthSession, IdentityError> {
        let invalid = || IdentityError::Provider("Invalid login credentials".to_string());

        let account = self.find_account(&credentials.email).await?.ok_or_else(invalid)?;
        if !verify_password(&credentials.password, &account.password_hash) {
            return Err(invalid());
        }

        Ok(self.start_session(account.into_user()))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.current
            .lock()
            .expect("LocalIdentity lock poisoned")
            .take();
        Ok(())
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider) -> Result<String, IdentityError> {
        let base = Url::parse(&self.oauth_base_url)
            .map_err(|e| IdentityError::Backend(format!("invalid OAuth base URL: {e}")))?;
        let redirect_to = base
            .join(&self.redirect_path)
            .map_err(|e| IdentityError::Backend(format!("invalid OAuth redirect path: {e}")))?;
        let mut url = base
            .join("/auth/v1/authorize")
            .map_err(|e| IdentityError::Backend(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to.as_str());
        Ok(url.to_string())
    }

    async fn primary_provider(&self, email: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.find_account(email).await?.map(|account| account.provider))
    }
}
