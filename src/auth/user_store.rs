//! User Storage
//! Mission: Persist user accounts in SQLite and answer identity lookups

use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, ErrorCode, Row};
use tracing::{info, warn};
use uuid::Uuid;

/// Identity lookups the authenticator and login flow depend on
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Resolve an account by email, only if the password matches
    async fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>>;
}

const USER_COLUMNS: &str =
    "id, display_name, email, password_hash, role, is_active, created_at";

/// User storage with SQLite backend
#[derive(Clone)]
pub struct UserStore {
    db_path: String,
    hash_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        Self::with_hash_cost(db_path, DEFAULT_COST)
    }

    /// Same as `new`, with an explicit bcrypt cost
    pub fn with_hash_cost(db_path: &str, hash_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            hash_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open user database at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create the bootstrap admin account unless the email is already taken
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        if self.get_user_by_email(email)?.is_some() {
            return Ok(());
        }

        self.create_user("Administrator", email, password, UserRole::Admin)?;
        info!(email = %email, "🔐 Bootstrap admin account created");
        Ok(())
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        let id: String = row.get(0)?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let role_str: String = row.get(4)?;

        Ok(User {
            id,
            display_name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            // Unknown roles degrade to the least privileged one
            role: UserRole::parse(&role_str).unwrap_or(UserRole::User),
            is_active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn query_one(&self, sql: &str, key: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;

        match stmt.query_row(params![key], Self::row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get user by id
    pub fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            &id.to_string(),
        )
    }

    /// Get user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            &normalize_email(email),
        )
    }

    /// Verify email and password, returning the account on success
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self.get_user_by_email(email)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid.then_some(user))
            }
            None => {
                // Same bcrypt work as a wrong password, so unknown emails
                // are not distinguishable by response time
                hash(password, self.hash_cost).context("Failed to hash password")?;
                Ok(None)
            }
        }
    }

    /// Create a new user
    pub fn create_user(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        let password_hash = hash(password, self.hash_cost).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            display_name: display_name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
            is_active: true,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (id, display_name, email, password_hash, role, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.display_name,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.is_active,
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(user_id = %user.id, role = %user.role, "✅ Created user");

        Ok(user)
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Activate or deactivate an account. Returns false if no such user.
    pub fn set_active(&self, user_id: &Uuid, is_active: bool) -> Result<bool> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![is_active, user_id.to_string()],
        )?;

        if rows > 0 && !is_active {
            warn!(user_id = %user_id, "Account deactivated");
        }
        Ok(rows > 0)
    }

    /// Change an account's role. Returns false if no such user.
    pub fn set_role(&self, user_id: &Uuid, role: UserRole) -> Result<bool> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id.to_string()],
        )?;

        if rows > 0 {
            info!(user_id = %user_id, role = %role, "Role changed");
        }
        Ok(rows > 0)
    }

    /// Delete a user by ID (admin only)
    pub fn delete_user(&self, user_id: &Uuid) -> Result<()> {
        let conn = self.connect()?;

        let rows_affected = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![user_id.to_string()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("User not found");
        }

        info!(user_id = %user_id, "🗑️  Deleted user");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for UserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.get_user_by_id(&id))
            .await
            .context("User lookup task failed")?
    }

    async fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let store = self.clone();
        let email = email.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || store.verify_credentials(&email, &password))
            .await
            .context("Credential check task failed")?
    }
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// True if the error chain bottoms out in a SQLite UNIQUE/constraint failure
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
        )
    })
}
