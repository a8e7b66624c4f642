use super::Db;
use crate::db::models::{DbImageBlob, DbImageMeta, DbUser};
use crate::error::QuillError;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};

impl Db {
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<DbUser>, QuillError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, email, username, name, created_at, updated_at FROM user WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<DbUser>, QuillError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, email, username, name, created_at, updated_at FROM user WHERE username = ?",
        )
        .bind(username.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, QuillError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, email, username, name, created_at, updated_at FROM user WHERE email = ?",
        )
        .bind(email.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Create a user with a password credential and the default `user` role.
    pub async fn create_user_with_password(
        &self,
        email: &str,
        username: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<DbUser, QuillError> {
        let mut tx = self.pool().begin().await?;
        let user = insert_user(&mut tx, email, username, name).await?;

        sqlx::query("INSERT INTO password (user_id, hash) VALUES (?, ?)")
            .bind(&user.id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        grant_default_role(&mut tx, &user.id).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Create a user from an OAuth profile: connection instead of password,
    /// optionally with a downloaded avatar as the profile image.
    pub async fn create_user_with_connection(
        &self,
        email: &str,
        username: &str,
        name: Option<&str>,
        provider_name: &str,
        provider_id: &str,
        avatar: Option<(String, Vec<u8>)>,
    ) -> Result<DbUser, QuillError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let user = insert_user(&mut tx, email, username, name).await?;

        sqlx::query(
            r#"
        INSERT INTO connection (id, provider_name, provider_id, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(Db::new_id())
        .bind(provider_name)
        .bind(provider_id)
        .bind(&user.id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some((content_type, blob)) = avatar {
            sqlx::query(
                r#"
            INSERT INTO user_image (id, content_type, blob, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(Db::new_id())
            .bind(content_type)
            .bind(blob)
            .bind(&user.id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        grant_default_role(&mut tx, &user.id).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Argon2 PHC hash for a username, together with the owning user id.
    /// `None` when the user does not exist or has no password credential.
    pub async fn password_hash_by_username(
        &self,
        username: &str,
    ) -> Result<Option<(String, String)>, QuillError> {
        let row = sqlx::query_as::<_, (String, String)>(
            r#"
        SELECT user.id, password.hash
        FROM user JOIN password ON password.user_id = user.id
        WHERE user.username = ?
        "#,
        )
        .bind(username.to_lowercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn password_hash_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<String>, QuillError> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT hash FROM password WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Set (or replace) a user's password hash.
    pub async fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<(), QuillError> {
        sqlx::query(
            r#"
        INSERT INTO password (user_id, hash) VALUES (?, ?)
        ON CONFLICT(user_id) DO UPDATE SET hash = excluded.hash
        "#,
        )
        .bind(user_id)
        .bind(hash)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn user_has_password(&self, user_id: &str) -> Result<bool, QuillError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM password WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }

    /// Replace the user's profile image (at most one per user).
    pub async fn replace_user_image(
        &self,
        user_id: &str,
        content_type: &str,
        blob: Vec<u8>,
        alt_text: Option<&str>,
    ) -> Result<String, QuillError> {
        let now = Utc::now();
        let id = Db::new_id();
        sqlx::query(
            r#"
        INSERT INTO user_image (id, alt_text, content_type, blob, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            id = excluded.id,
            alt_text = excluded.alt_text,
            content_type = excluded.content_type,
            blob = excluded.blob,
            updated_at = excluded.updated_at
        "#,
        )
        .bind(&id)
        .bind(alt_text)
        .bind(content_type)
        .bind(blob)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    pub async fn user_image_meta(
        &self,
        user_id: &str,
    ) -> Result<Option<DbImageMeta>, QuillError> {
        let row = sqlx::query_as::<_, DbImageMeta>(
            "SELECT id, alt_text FROM user_image WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn user_image_blob(&self, id: &str) -> Result<Option<DbImageBlob>, QuillError> {
        let row = sqlx::query_as::<_, DbImageBlob>(
            "SELECT id, content_type, blob FROM user_image WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn role_names_for_user(&self, user_id: &str) -> Result<Vec<String>, QuillError> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
        SELECT role.name
        FROM role JOIN user_role ON user_role.role_id = role.id
        WHERE user_role.user_id = ?
        ORDER BY role.name
        "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Grant a named role (admin management).
    pub async fn assign_role(&self, user_id: &str, role_name: &str) -> Result<(), QuillError> {
        sqlx::query(
            r#"
        INSERT OR IGNORE INTO user_role (user_id, role_id)
        SELECT ?, id FROM role WHERE name = ?
        "#,
        )
        .bind(user_id)
        .bind(role_name)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// True when any of the user's roles carries a permission matching
    /// (action, entity) with one of the given access levels.
    pub async fn user_has_permission(
        &self,
        user_id: &str,
        action: &str,
        entity: &str,
        accesses: &[&str],
    ) -> Result<bool, QuillError> {
        let placeholders = vec!["?"; accesses.len()].join(", ");
        let sql = format!(
            r#"
        SELECT COUNT(*)
        FROM permission
        JOIN role_permission ON role_permission.permission_id = permission.id
        JOIN user_role ON user_role.role_id = role_permission.role_id
        WHERE user_role.user_id = ?
          AND permission.action = ?
          AND permission.entity = ?
          AND permission.access IN ({placeholders})
        "#
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id)
            .bind(action)
            .bind(entity);
        for access in accesses {
            query = query.bind(*access);
        }

        let count = query.fetch_one(self.pool()).await?;
        Ok(count > 0)
    }
}

async fn insert_user(
    tx: &mut Transaction<'_, Sqlite>,
    email: &str,
    username: &str,
    name: Option<&str>,
) -> Result<DbUser, QuillError> {
    let now = Utc::now();
    let user = sqlx::query_as::<_, DbUser>(
        r#"
    INSERT INTO user (id, email, username, name, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
    RETURNING id, email, username, name, created_at, updated_at
    "#,
    )
    .bind(Db::new_id())
    .bind(email.to_lowercase())
    .bind(username.to_lowercase())
    .bind(name)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(user)
}

async fn grant_default_role(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
) -> Result<(), QuillError> {
    sqlx::query(
        r#"
    INSERT INTO user_role (user_id, role_id)
    SELECT ?, id FROM role WHERE name = 'user'
    "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
