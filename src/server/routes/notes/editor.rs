//! Multipart parsing for the note editor form.
//!
//! The form submits `title`, `content` and an indexed image fieldset:
//! `images[0].id`, `images[0].altText`, `images[0].file`, `images[1].id`, …
//! An `id` references an existing image on the note; a `file` part carries
//! replacement or new bytes.

use crate::db::NoteImageChange;
use crate::error::{FieldErrors, QuillError};
use axum::extract::Multipart;
use std::collections::BTreeMap;

pub const TITLE_MAX_LEN: usize = 100;
pub const CONTENT_MAX_LEN: usize = 10_000;
pub const MAX_UPLOAD_SIZE: usize = 3 * 1024 * 1024;
pub const MAX_IMAGES: usize = 5;

#[derive(Debug, Default)]
pub struct ImageSlot {
    pub id: Option<String>,
    pub alt_text: Option<String>,
    pub file: Option<(String, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub struct NoteEditorForm {
    pub title: String,
    pub content: String,
    pub images: Vec<ImageSlot>,
}

impl NoteEditorForm {
    pub fn into_changes(self) -> Vec<NoteImageChange> {
        self.images
            .into_iter()
            .map(|slot| NoteImageChange {
                id: slot.id,
                alt_text: slot.alt_text,
                data: slot.file,
            })
            .collect()
    }
}

pub async fn parse_note_editor(mut multipart: Multipart) -> Result<NoteEditorForm, QuillError> {
    let mut form = NoteEditorForm::default();
    let mut slots: BTreeMap<usize, ImageSlot> = BTreeMap::new();
    let mut errors = FieldErrors::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| QuillError::Unexpected(format!("multipart read failed: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "title" => {
                form.title = read_text(field).await?;
            }
            "content" => {
                form.content = read_text(field).await?;
            }
            _ => {
                let Some((index, attribute)) = image_field(&name) else {
                    continue;
                };
                let slot = slots.entry(index).or_default();
                match attribute {
                    "id" => {
                        let id = read_text(field).await?;
                        if !id.is_empty() {
                            slot.id = Some(id);
                        }
                    }
                    "altText" => {
                        let alt = read_text(field).await?;
                        if !alt.is_empty() {
                            slot.alt_text = Some(alt);
                        }
                    }
                    "file" => {
                        let content_type = field
                            .content_type()
                            .unwrap_or("application/octet-stream")
                            .to_string();
                        let bytes = field.bytes().await.map_err(|e| {
                            QuillError::Unexpected(format!("upload read failed: {e}"))
                        })?;
                        if bytes.len() > MAX_UPLOAD_SIZE {
                            errors = errors.field(
                                &format!("images[{index}].file"),
                                "File size must be less than 3MB",
                            );
                        } else if !bytes.is_empty() {
                            // A file input left empty still submits a part;
                            // zero bytes means "keep what's there".
                            slot.file = Some((content_type, bytes.to_vec()));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    form.title = form.title.trim().to_string();
    if form.title.is_empty() {
        errors = errors.field("title", "Title is required");
    } else if form.title.len() > TITLE_MAX_LEN {
        errors = errors.field("title", "Title is too long");
    }
    if form.content.is_empty() {
        errors = errors.field("content", "Content is required");
    } else if form.content.len() > CONTENT_MAX_LEN {
        errors = errors.field("content", "Content is too long");
    }
    if slots.len() > MAX_IMAGES {
        errors = errors.field("images", "A note can carry at most 5 images");
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    form.images = slots.into_values().collect();
    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, QuillError> {
    field
        .text()
        .await
        .map_err(|e| QuillError::Unexpected(format!("multipart read failed: {e}")))
}

/// `images[3].altText` → `(3, "altText")`.
fn image_field(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("images[")?;
    let close = rest.find(']')?;
    let index: usize = rest[..close].parse().ok()?;
    let attribute = rest[close + 1..].strip_prefix('.')?;
    Some((index, attribute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_field_parses_indexed_names() {
        assert_eq!(image_field("images[0].id"), Some((0, "id")));
        assert_eq!(image_field("images[12].altText"), Some((12, "altText")));
        assert_eq!(image_field("images[1].file"), Some((1, "file")));
        assert_eq!(image_field("title"), None);
        assert_eq!(image_field("images[x].id"), None);
        assert_eq!(image_field("images[0]"), None);
    }
}
