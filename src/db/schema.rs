//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - identity tables (`user`, `password`, `session`, `connection`, `verification`)
/// - content tables (`note`, `note_image`, `user_image`)
/// - authorization tables (`role`, `permission` and their join tables)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Identity
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    name TEXT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL  -- RFC3339
);

-- Hash lives in its own table so user queries never select it by accident.
CREATE TABLE IF NOT EXISTS password (
    user_id TEXT PRIMARY KEY NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    expiration_date TEXT NOT NULL, -- RFC3339
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_user_id ON session(user_id);

CREATE TABLE IF NOT EXISTS connection (
    id TEXT PRIMARY KEY NOT NULL,
    provider_name TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(provider_name, provider_id)
);

CREATE INDEX IF NOT EXISTS idx_connection_user_id ON connection(user_id);

-- One-time-passcode / link records for email verification and 2FA.
-- `expires_at` is NULL for permanent records (active 2FA secrets).
CREATE TABLE IF NOT EXISTS verification (
    id TEXT PRIMARY KEY NOT NULL,
    type TEXT NOT NULL,
    target TEXT NOT NULL,
    secret TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    digits INTEGER NOT NULL,
    period INTEGER NOT NULL, -- seconds
    expires_at TEXT NULL,    -- RFC3339
    created_at TEXT NOT NULL,
    UNIQUE(target, type)
);

-- ---------------------------------------------------------------------------
-- Content
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS note (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    owner_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_note_owner_updated ON note(owner_id, updated_at);

CREATE TABLE IF NOT EXISTS note_image (
    id TEXT PRIMARY KEY NOT NULL,
    alt_text TEXT NULL,
    content_type TEXT NOT NULL,
    blob BLOB NOT NULL,
    note_id TEXT NOT NULL REFERENCES note(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_note_image_note_id ON note_image(note_id);

CREATE TABLE IF NOT EXISTS user_image (
    id TEXT PRIMARY KEY NOT NULL,
    alt_text TEXT NULL,
    content_type TEXT NOT NULL,
    blob BLOB NOT NULL,
    user_id TEXT NOT NULL UNIQUE REFERENCES user(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ---------------------------------------------------------------------------
-- Authorization
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS role (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS permission (
    id TEXT PRIMARY KEY NOT NULL,
    action TEXT NOT NULL,  -- create | read | update | delete
    entity TEXT NOT NULL,  -- user | note
    access TEXT NOT NULL,  -- own | any
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(action, entity, access)
);

CREATE TABLE IF NOT EXISTS role_permission (
    role_id TEXT NOT NULL REFERENCES role(id) ON DELETE CASCADE,
    permission_id TEXT NOT NULL REFERENCES permission(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS user_role (
    user_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    role_id TEXT NOT NULL REFERENCES role(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);
"#;
