use crate::auth::password::{hash_password, verify_password};
use crate::config::AuthPolicyConfig;
use crate::db::{Db, DbSession};
use crate::error::QuillError;
use chrono::{DateTime, Duration, Utc};

pub fn session_expiration_date(cfg: &AuthPolicyConfig) -> DateTime<Utc> {
    Utc::now() + Duration::days(cfg.session_ttl_days)
}

/// Verify (username, password) and mint a Session row. Unknown usernames and
/// wrong passwords are indistinguishable: both yield `None`.
pub async fn login(
    db: &Db,
    cfg: &AuthPolicyConfig,
    username: &str,
    password: &str,
) -> Result<Option<DbSession>, QuillError> {
    let Some((user_id, hash)) = db.password_hash_by_username(username).await? else {
        return Ok(None);
    };
    if !verify_password(password, &hash)? {
        return Ok(None);
    }
    let session = db
        .create_session(&user_id, session_expiration_date(cfg))
        .await?;
    Ok(Some(session))
}

/// Create a password-credentialed user and log them in.
pub async fn signup(
    db: &Db,
    cfg: &AuthPolicyConfig,
    email: &str,
    username: &str,
    name: Option<&str>,
    password: &str,
) -> Result<DbSession, QuillError> {
    let hash = hash_password(password)?;
    let user = db
        .create_user_with_password(email, username, name, &hash)
        .await?;
    db.create_session(&user.id, session_expiration_date(cfg))
        .await
}

/// Create a user from an OAuth profile (connection instead of password) and
/// log them in.
#[allow(clippy::too_many_arguments)]
pub async fn signup_with_connection(
    db: &Db,
    cfg: &AuthPolicyConfig,
    email: &str,
    username: &str,
    name: Option<&str>,
    provider_name: &str,
    provider_id: &str,
    avatar: Option<(String, Vec<u8>)>,
) -> Result<DbSession, QuillError> {
    let user = db
        .create_user_with_connection(email, username, name, provider_name, provider_id, avatar)
        .await?;
    db.create_session(&user.id, session_expiration_date(cfg))
        .await
}

/// Re-check a logged-in user's password (settings flows).
pub async fn verify_user_password(
    db: &Db,
    user_id: &str,
    password: &str,
) -> Result<bool, QuillError> {
    match db.password_hash_by_user_id(user_id).await? {
        Some(hash) => verify_password(password, &hash),
        None => Ok(false),
    }
}
