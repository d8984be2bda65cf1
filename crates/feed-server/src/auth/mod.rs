//! Authentication Module
//!
//! Account signup, login and status, plus the bearer token codec and the
//! middleware that guards mutating routes. Users live in the same SQLite
//! database as posts.

pub mod middleware;
pub mod token;

pub use middleware::{authenticate, mw_require_auth};
pub use token::{Claims, TokenCodec, TokenError};

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, FieldError, Result};
use crate::models::User;

const DEFAULT_STATUS: &str = "I am new!";

#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl SignupInput {
    fn normalize(self) -> std::result::Result<SignupInput, Vec<FieldError>> {
        let email = self.email.trim().to_lowercase();
        let name = self.name.trim().to_string();
        let password = self.password.trim().to_string();

        let mut errors = Vec::new();
        if !looks_like_email(&email) {
            errors.push(FieldError::new("email", "Please enter a valid email."));
        }
        if password.chars().count() < 5 {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 5 characters.",
            ));
        }
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name must not be empty."));
        }

        if errors.is_empty() {
            Ok(SignupInput {
                email,
                name,
                password,
            })
        } else {
            Err(errors)
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        && !email.chars().any(char::is_whitespace)
}

type UserRow = (String, String, String, String, String);

fn user_from_row((id, email, name, status, created_at): UserRow) -> User {
    User {
        id,
        email,
        name,
        status,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    }
}

fn no_user() -> Error {
    Error::NotFound("No user found.".to_string())
}

/// Account storage and password checks
pub struct AccountManager {
    pool: SqlitePool,
    bcrypt_cost: u32,
}

impl AccountManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_cost(pool, DEFAULT_COST)
    }

    /// Lower costs are only meant for tests
    pub fn with_cost(pool: SqlitePool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    /// Register a new user
    pub async fn signup(&self, input: SignupInput) -> Result<User> {
        let input = input.normalize().map_err(Error::validation)?;

        // Check if email already exists
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&input.email)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Err(Error::validation(vec![FieldError::new(
                "email",
                "Email address already exists",
            )]));
        }

        let password_hash = hash(&input.password, self.bcrypt_cost)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: input.email,
            name: input.name,
            status: DEFAULT_STATUS.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&password_hash)
        .bind(&user.status)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!("[Auth] User registered: {} ({})", user.name, user.email);

        Ok(user)
    }

    /// Check credentials. Unknown email and wrong password look the same.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();

        let row: Option<(String, String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, email, name, status, created_at, password_hash FROM users WHERE email = ?",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let invalid = || Error::Unauthenticated("Invalid email or password.".to_string());

        let Some((id, email, name, status, created_at, password_hash)) = row else {
            warn!("[Auth] Login for unknown email {}", email);
            return Err(invalid());
        };

        if !verify(password, &password_hash)? {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(invalid());
        }

        info!("[Auth] User logged in: {}", name);

        Ok(user_from_row((id, email, name, status, created_at)))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, status, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).ok_or_else(no_user)
    }

    pub async fn status(&self, user_id: &str) -> Result<String> {
        Ok(self.get_user(user_id).await?.status)
    }

    pub async fn update_status(&self, user_id: &str, status: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(no_user());
        }

        info!("[Auth] Status updated for {}", user_id);
        Ok(())
    }
}
