use crate::db::Db;
use crate::error::QuillError;

/// A permission requirement in `action:entity` or `action:entity:access`
/// form, e.g. `delete:note:own,any`. Omitted access matches any level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSpec<'a> {
    pub action: &'a str,
    pub entity: &'a str,
    pub accesses: Vec<&'a str>,
}

impl<'a> PermissionSpec<'a> {
    pub fn parse(spec: &'a str) -> Option<Self> {
        let mut parts = spec.split(':');
        let action = parts.next().filter(|s| !s.is_empty())?;
        let entity = parts.next().filter(|s| !s.is_empty())?;
        let accesses = match parts.next() {
            Some(access) => {
                let list: Vec<&str> = access.split(',').filter(|s| !s.is_empty()).collect();
                if list.is_empty() {
                    return None;
                }
                list
            }
            None => vec!["own", "any"],
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            action,
            entity,
            accesses,
        })
    }
}

/// True when any role of the user carries a matching permission.
pub async fn user_has_permission(
    db: &Db,
    user_id: &str,
    spec: &str,
) -> Result<bool, QuillError> {
    let spec = PermissionSpec::parse(spec)
        .ok_or_else(|| QuillError::Unexpected(format!("invalid permission spec: {spec}")))?;
    db.user_has_permission(user_id, spec.action, spec.entity, &spec.accesses)
        .await
}
