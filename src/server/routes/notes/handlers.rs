use crate::auth::permissions::user_has_permission;
use crate::db::DbNote;
use crate::error::{FieldErrors, QuillError};
use crate::server::cookies::{Toast, set_toast};
use crate::server::guards::auth::{MaybeUser, RequireUser, RequireUserId};
use crate::server::router::QuillState;
use crate::server::routes::notes::editor::parse_note_editor;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde_json::json;

/// GET /users/{username}/notes
pub async fn notes_index(
    State(state): State<QuillState>,
    Path(username): Path<String>,
) -> Result<Response, QuillError> {
    let owner = state
        .db
        .find_user_by_username(&username)
        .await?
        .ok_or(QuillError::NotFound("user"))?;
    let notes = state.db.notes_for_owner(&owner.id).await?;

    Ok(Json(json!({
        "owner": { "username": owner.username, "name": owner.name },
        "notes": notes,
    }))
    .into_response())
}

/// GET /users/{username}/notes/{note_id}
pub async fn note_detail(
    State(state): State<QuillState>,
    MaybeUser(viewer): MaybeUser,
    Path((username, note_id)): Path<(String, String)>,
) -> Result<Response, QuillError> {
    let (owner_id, note) = owned_note(&state, &username, &note_id).await?;

    let images = state.db.note_images_meta(&note.id).await?;
    let can_modify = match &viewer {
        Some(viewer_id) if *viewer_id == owner_id => true,
        Some(viewer_id) => {
            user_has_permission(&state.db, viewer_id, "delete:note:any").await?
        }
        None => false,
    };

    Ok(Json(json!({
        "note": {
            "id": note.id,
            "title": note.title,
            "content": note.content,
            "updatedAt": note.updated_at,
            "images": images,
        },
        "canModify": can_modify,
    }))
    .into_response())
}

/// POST /users/{username}/notes/new, multipart note editor submission.
pub async fn note_create(
    State(state): State<QuillState>,
    RequireUser(user): RequireUser,
    Path(username): Path<String>,
    multipart: Multipart,
) -> Result<Response, QuillError> {
    if user.username != username.to_lowercase() {
        return Err(QuillError::Forbidden("Notes can only be created under your own profile"));
    }

    let form = parse_note_editor(multipart).await?;
    validate_image_ids(&state, None, &form).await?;

    let note = state.db.create_note(&user.id, &form.title, &form.content).await?;
    state
        .db
        .reconcile_note_images(&note.id, form.into_changes())
        .await?;

    Ok(Redirect::to(&format!("/users/{}/notes/{}", user.username, note.id)).into_response())
}

/// POST /users/{username}/notes/{note_id}/edit
pub async fn note_edit(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    Path((username, note_id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Response, QuillError> {
    let (_owner_id, note) = owned_note(&state, &username, &note_id).await?;
    if note.owner_id != user_id {
        return Err(QuillError::Forbidden("Only the owner can edit a note"));
    }

    let form = parse_note_editor(multipart).await?;
    validate_image_ids(&state, Some(&note.id), &form).await?;

    state.db.update_note(&note.id, &form.title, &form.content).await?;
    state
        .db
        .reconcile_note_images(&note.id, form.into_changes())
        .await?;

    Ok(Redirect::to(&format!("/users/{username}/notes/{note_id}")).into_response())
}

/// POST /users/{username}/notes/{note_id}/delete
///
/// Owners may always delete their own notes; `delete:note:any` (admins)
/// covers the rest.
pub async fn note_delete(
    State(state): State<QuillState>,
    RequireUserId(user_id): RequireUserId,
    Path((username, note_id)): Path<(String, String)>,
    jar: PrivateCookieJar,
) -> Result<Response, QuillError> {
    let (_owner_id, note) = owned_note(&state, &username, &note_id).await?;

    if note.owner_id != user_id
        && !user_has_permission(&state.db, &user_id, "delete:note:any").await?
    {
        return Err(QuillError::Forbidden("You may not delete this note"));
    }

    state.db.delete_note(&note.id).await?;

    let jar = set_toast(
        jar,
        &Toast::success("Deleted", "Your note has been deleted."),
        !state.config.basic.insecure_cookie,
    );
    Ok((jar, Redirect::to(&format!("/users/{username}/notes"))).into_response())
}

/// Resolve `{username}/{note_id}` to a note, 404ing when either is unknown
/// or the note belongs to someone else.
async fn owned_note(
    state: &QuillState,
    username: &str,
    note_id: &str,
) -> Result<(String, DbNote), QuillError> {
    let owner = state
        .db
        .find_user_by_username(username)
        .await?
        .ok_or(QuillError::NotFound("user"))?;
    let note = state
        .db
        .note_by_id(note_id)
        .await?
        .filter(|note| note.owner_id == owner.id)
        .ok_or(QuillError::NotFound("note"))?;
    Ok((owner.id, note))
}

/// Submitted image ids must belong to the note being edited; anything else
/// is a stale or forged reference.
async fn validate_image_ids(
    state: &QuillState,
    note_id: Option<&str>,
    form: &super::editor::NoteEditorForm,
) -> Result<(), QuillError> {
    let submitted: Vec<&String> = form.images.iter().filter_map(|s| s.id.as_ref()).collect();
    if submitted.is_empty() {
        return Ok(());
    }
    let Some(note_id) = note_id else {
        return Err(FieldErrors::single("images", "Image does not exist").into());
    };
    let known = state.db.note_images_meta(note_id).await?;
    for id in submitted {
        if !known.iter().any(|meta| &meta.id == id) {
            return Err(FieldErrors::single("images", "Image does not exist").into());
        }
    }
    Ok(())
}
