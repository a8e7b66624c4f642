use super::Db;
use crate::db::models::{DbConnection, DbSession, DbVerification};
use crate::error::QuillError;
use chrono::{DateTime, Utc};

impl Db {
    pub async fn create_session(
        &self,
        user_id: &str,
        expiration_date: DateTime<Utc>,
    ) -> Result<DbSession, QuillError> {
        let now = Utc::now();
        let session = sqlx::query_as::<_, DbSession>(
            r#"
        INSERT INTO session (id, user_id, expiration_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, user_id, expiration_date, created_at, updated_at
        "#,
        )
        .bind(Db::new_id())
        .bind(user_id)
        .bind(expiration_date)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(session)
    }

    /// Resolve a session to its owning user id, honoring expiry at read time.
    /// Expired and unknown ids are indistinguishable: both yield `None`.
    pub async fn active_session_user(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, QuillError> {
        let row = sqlx::query_scalar::<_, String>(
            r#"
        SELECT user.id
        FROM session JOIN user ON user.id = session.user_id
        WHERE session.id = ? AND session.expiration_date > ?
        "#,
        )
        .bind(session_id)
        .bind(Utc::now())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<DbSession>, QuillError> {
        let row = sqlx::query_as::<_, DbSession>(
            r#"
        SELECT id, user_id, expiration_date, created_at, updated_at
        FROM session WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), QuillError> {
        sqlx::query("DELETE FROM session WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<DbSession>, QuillError> {
        let rows = sqlx::query_as::<_, DbSession>(
            r#"
        SELECT id, user_id, expiration_date, created_at, updated_at
        FROM session WHERE user_id = ?
        ORDER BY created_at
        "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_sessions_for_user(&self, user_id: &str) -> Result<i64, QuillError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM session WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    pub async fn create_connection(
        &self,
        user_id: &str,
        provider_name: &str,
        provider_id: &str,
    ) -> Result<DbConnection, QuillError> {
        let now = Utc::now();
        let connection = sqlx::query_as::<_, DbConnection>(
            r#"
        INSERT INTO connection (id, provider_name, provider_id, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, provider_name, provider_id, user_id, created_at, updated_at
        "#,
        )
        .bind(Db::new_id())
        .bind(provider_name)
        .bind(provider_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(connection)
    }

    pub async fn find_connection(
        &self,
        provider_name: &str,
        provider_id: &str,
    ) -> Result<Option<DbConnection>, QuillError> {
        let row = sqlx::query_as::<_, DbConnection>(
            r#"
        SELECT id, provider_name, provider_id, user_id, created_at, updated_at
        FROM connection WHERE provider_name = ? AND provider_id = ?
        "#,
        )
        .bind(provider_name)
        .bind(provider_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbConnection>, QuillError> {
        let rows = sqlx::query_as::<_, DbConnection>(
            r#"
        SELECT id, provider_name, provider_id, user_id, created_at, updated_at
        FROM connection WHERE user_id = ?
        ORDER BY created_at
        "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Delete a connection owned by the given user. Returns whether a row
    /// was actually removed.
    pub async fn delete_connection(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<bool, QuillError> {
        let result = sqlx::query("DELETE FROM connection WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Verifications
    // -----------------------------------------------------------------------

    /// Create or replace the verification record for (target, type).
    pub async fn upsert_verification(
        &self,
        r#type: &str,
        target: &str,
        secret: &str,
        algorithm: &str,
        digits: u32,
        period_secs: u64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<DbVerification, QuillError> {
        let now = Utc::now();
        let verification = sqlx::query_as::<_, DbVerification>(
            r#"
        INSERT INTO verification (id, type, target, secret, algorithm, digits, period, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(target, type) DO UPDATE SET
            secret = excluded.secret,
            algorithm = excluded.algorithm,
            digits = excluded.digits,
            period = excluded.period,
            expires_at = excluded.expires_at,
            created_at = excluded.created_at
        RETURNING id, type, target, secret, algorithm, digits, period, expires_at, created_at
        "#,
        )
        .bind(Db::new_id())
        .bind(r#type)
        .bind(target)
        .bind(secret)
        .bind(algorithm)
        .bind(i64::from(digits))
        .bind(i64::try_from(period_secs).unwrap_or(i64::MAX))
        .bind(expires_at)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(verification)
    }

    /// Fetch the verification for (target, type) unless it has expired.
    pub async fn find_verification(
        &self,
        r#type: &str,
        target: &str,
    ) -> Result<Option<DbVerification>, QuillError> {
        let row = sqlx::query_as::<_, DbVerification>(
            r#"
        SELECT id, type, target, secret, algorithm, digits, period, expires_at, created_at
        FROM verification
        WHERE target = ? AND type = ? AND (expires_at IS NULL OR expires_at > ?)
        "#,
        )
        .bind(target)
        .bind(r#type)
        .bind(Utc::now())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn delete_verification(
        &self,
        r#type: &str,
        target: &str,
    ) -> Result<(), QuillError> {
        sqlx::query("DELETE FROM verification WHERE target = ? AND type = ?")
            .bind(target)
            .bind(r#type)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Promote a pending `2fa-setup` record into the active `2fa` type.
    pub async fn promote_two_factor(&self, target: &str) -> Result<bool, QuillError> {
        let result = sqlx::query(
            r#"
        UPDATE verification SET type = '2fa', expires_at = NULL
        WHERE target = ? AND type = '2fa-setup'
        "#,
        )
        .bind(target)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
