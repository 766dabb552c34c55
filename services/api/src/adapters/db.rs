//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use killfeed_core::domain::{
    LocalPostRecord, NewUser, ReactionKind, TotpConfig, User, UserCredentials,
    VerificationSecret, VerificationType,
};
use killfeed_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Closes every pooled connection; called once during graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Maps read failures; a missing row is reported by the caller, not here.
fn read_error(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps write failures, surfacing constraint violations the core reacts to.
fn write_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return PortError::Conflict(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return PortError::NotFound(db_err.message().to_string());
        }
    }
    PortError::Unexpected(e.to_string())
}

/// The insert selects the kind's id from `post_reaction_types`, so an unseeded
/// kind inserts nothing instead of failing.
fn reaction_inserted(rows_affected: u64, kind: ReactionKind) -> PortResult<()> {
    match rows_affected {
        1 => Ok(()),
        0 => Err(PortError::Unexpected(format!(
            "reaction kind '{}' is not seeded in post_reaction_types",
            kind.name()
        ))),
        n => Err(PortError::Unexpected(format!(
            "reaction insert touched {} rows",
            n
        ))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            username: self.username,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    username: String,
    password_hash: Option<String>,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            username: self.username,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct PostRecord {
    id: String,
    slug: String,
}
impl PostRecord {
    fn to_domain(self) -> LocalPostRecord {
        LocalPostRecord {
            id: self.id,
            slug: self.slug,
        }
    }
}

#[derive(FromRow)]
struct VerificationRecord {
    #[sqlx(rename = "type")]
    kind: String,
    target: String,
    secret: String,
    algorithm: String,
    digits: i32,
    char_set: String,
    period: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: i32,
}
impl VerificationRecord {
    fn to_domain(self) -> PortResult<VerificationSecret> {
        Ok(VerificationSecret {
            kind: self.kind.parse().map_err(PortError::Unexpected)?,
            target: self.target,
            config: TotpConfig {
                secret: self.secret,
                algorithm: self.algorithm.parse().map_err(PortError::Unexpected)?,
                digits: self.digits as u32,
                char_set: self.char_set,
                period: self.period as u64,
            },
            created_at: self.created_at,
            expires_at: self.expires_at,
            attempts: self.attempts.max(0) as u32,
        })
    }
}

const USER_COLUMNS: &str = "id, email, username, name, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, email, username, name, password_hash) \
             VALUES ($1, lower($2), lower($3), $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?
        .map(UserRecord::to_domain)
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn find_user_by_email(&self, email: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn find_user_by_username(&self, username: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = lower($1)"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn find_credentials(&self, login: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, username, password_hash FROM users \
             WHERE email = lower($1) OR username = lower($1)",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;
        Ok(record.map(CredentialsRecord::to_domain))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn find_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
    ) -> PortResult<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM connections WHERE provider_name = $1 AND provider_id = $2",
        )
        .bind(provider_name)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)
    }

    async fn create_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
        user_id: Uuid,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO connections (provider_name, provider_id, user_id) VALUES ($1, $2, $3)",
        )
        .bind(provider_name)
        .bind(provider_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?
        .ok_or_else(|| PortError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get_local_post(&self, post_id: &str) -> PortResult<Option<LocalPostRecord>> {
        let record = sqlx::query_as::<_, PostRecord>("SELECT id, slug FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;
        Ok(record.map(PostRecord::to_domain))
    }

    async fn insert_local_post(&self, record: &LocalPostRecord) -> PortResult<()> {
        sqlx::query("INSERT INTO posts (id, slug) VALUES ($1, $2)")
            .bind(&record.id)
            .bind(&record.slug)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn seed_reaction_kinds(&self, kinds: &[ReactionKind]) -> PortResult<()> {
        for kind in kinds {
            sqlx::query(
                "INSERT INTO post_reaction_types (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            )
            .bind(kind.name())
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        }
        Ok(())
    }

    async fn get_reaction(&self, user_id: Uuid, post_id: &str) -> PortResult<Option<ReactionKind>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM post_reactions r \
             JOIN post_reaction_types t ON t.id = r.reaction_type_id \
             WHERE r.user_id = $1 AND r.post_id = $2",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;

        name.map(|name| {
            name.parse::<ReactionKind>()
                .map_err(|e| PortError::Unexpected(e.to_string()))
        })
        .transpose()
    }

    async fn insert_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "INSERT INTO post_reactions (user_id, post_id, reaction_type_id) \
             SELECT $1, $2, id FROM post_reaction_types WHERE name = $3",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(kind.name())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        reaction_inserted(result.rows_affected(), kind)
    }

    async fn update_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        from: ReactionKind,
        to: ReactionKind,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE post_reactions \
             SET reaction_type_id = (SELECT id FROM post_reaction_types WHERE name = $4), \
                 updated_at = now() \
             WHERE user_id = $1 AND post_id = $2 \
               AND reaction_type_id = (SELECT id FROM post_reaction_types WHERE name = $3)",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(from.name())
        .bind(to.name())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
        kind: ReactionKind,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "DELETE FROM post_reactions \
             WHERE user_id = $1 AND post_id = $2 \
               AND reaction_type_id = (SELECT id FROM post_reaction_types WHERE name = $3)",
        )
        .bind(user_id)
        .bind(post_id)
        .bind(kind.name())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_reactions(&self, post_id: &str) -> PortResult<Vec<(ReactionKind, u64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT t.name, COUNT(*) FROM post_reactions r \
             JOIN post_reaction_types t ON t.id = r.reaction_type_id \
             WHERE r.post_id = $1 GROUP BY t.name",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        let counts = rows
            .into_iter()
            .filter_map(|(name, count)| match name.parse::<ReactionKind>() {
                Ok(kind) => Some((kind, count.max(0) as u64)),
                Err(e) => {
                    warn!("Ignoring reactions of a retired kind: {}", e);
                    None
                }
            })
            .collect();
        Ok(counts)
    }

    async fn upsert_verification(&self, secret: &VerificationSecret) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO verifications \
                 (type, target, secret, algorithm, digits, char_set, period, created_at, expires_at, attempts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (type, target) DO UPDATE SET \
                 secret = EXCLUDED.secret, algorithm = EXCLUDED.algorithm, \
                 digits = EXCLUDED.digits, char_set = EXCLUDED.char_set, \
                 period = EXCLUDED.period, created_at = EXCLUDED.created_at, \
                 expires_at = EXCLUDED.expires_at, attempts = EXCLUDED.attempts",
        )
        .bind(secret.kind.as_str())
        .bind(&secret.target)
        .bind(&secret.config.secret)
        .bind(secret.config.algorithm.as_str())
        .bind(secret.config.digits as i32)
        .bind(&secret.config.char_set)
        .bind(secret.config.period as i32)
        .bind(secret.created_at)
        .bind(secret.expires_at)
        .bind(secret.attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn get_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<Option<VerificationSecret>> {
        let record = sqlx::query_as::<_, VerificationRecord>(
            "SELECT type, target, secret, algorithm, digits, char_set, period, created_at, expires_at, attempts \
             FROM verifications WHERE type = $1 AND target = $2",
        )
        .bind(kind.as_str())
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error)?;

        record.map(VerificationRecord::to_domain).transpose()
    }

    async fn record_failed_verification(
        &self,
        kind: VerificationType,
        target: &str,
    ) -> PortResult<u32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE verifications SET attempts = attempts + 1 \
             WHERE type = $1 AND target = $2 RETURNING attempts",
        )
        .bind(kind.as_str())
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(attempts.map_or(0, |n| n.max(0) as u32))
    }
}
