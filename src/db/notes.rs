use super::Db;
use crate::db::models::{DbImageBlob, DbImageMeta, DbNote, DbNoteSummary};
use crate::error::QuillError;
use chrono::Utc;

/// One image slot submitted by the note editor. `id` references an existing
/// image; `data` carries freshly uploaded bytes. Existing images absent from
/// the submitted set are deleted.
#[derive(Debug, Clone)]
pub struct NoteImageChange {
    pub id: Option<String>,
    pub alt_text: Option<String>,
    pub data: Option<(String, Vec<u8>)>,
}

impl Db {
    pub async fn note_by_id(&self, id: &str) -> Result<Option<DbNote>, QuillError> {
        let row = sqlx::query_as::<_, DbNote>(
            r#"
        SELECT id, title, content, owner_id, created_at, updated_at
        FROM note WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn notes_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<DbNoteSummary>, QuillError> {
        let rows = sqlx::query_as::<_, DbNoteSummary>(
            "SELECT id, title FROM note WHERE owner_id = ? ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn create_note(
        &self,
        owner_id: &str,
        title: &str,
        content: &str,
    ) -> Result<DbNote, QuillError> {
        let now = Utc::now();
        let note = sqlx::query_as::<_, DbNote>(
            r#"
        INSERT INTO note (id, title, content, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, title, content, owner_id, created_at, updated_at
        "#,
        )
        .bind(Db::new_id())
        .bind(title)
        .bind(content)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(note)
    }

    pub async fn update_note(
        &self,
        id: &str,
        title: &str,
        content: &str,
    ) -> Result<(), QuillError> {
        sqlx::query("UPDATE note SET title = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(content)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), QuillError> {
        sqlx::query("DELETE FROM note WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn note_images_meta(
        &self,
        note_id: &str,
    ) -> Result<Vec<DbImageMeta>, QuillError> {
        let rows = sqlx::query_as::<_, DbImageMeta>(
            "SELECT id, alt_text FROM note_image WHERE note_id = ? ORDER BY created_at",
        )
        .bind(note_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn note_image_blob(&self, id: &str) -> Result<Option<DbImageBlob>, QuillError> {
        let row = sqlx::query_as::<_, DbImageBlob>(
            "SELECT id, content_type, blob FROM note_image WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Bring a note's images in line with the editor submission: images not
    /// resubmitted are removed, resubmitted ones update alt text (and bytes
    /// when a new file was attached), new uploads are inserted. Runs in one
    /// transaction so a failed upload never half-applies.
    pub async fn reconcile_note_images(
        &self,
        note_id: &str,
        changes: Vec<NoteImageChange>,
    ) -> Result<(), QuillError> {
        let now = Utc::now();
        let keep_ids: Vec<&String> = changes.iter().filter_map(|c| c.id.as_ref()).collect();

        let mut tx = self.pool().begin().await?;

        if keep_ids.is_empty() {
            sqlx::query("DELETE FROM note_image WHERE note_id = ?")
                .bind(note_id)
                .execute(&mut *tx)
                .await?;
        } else {
            let placeholders = vec!["?"; keep_ids.len()].join(", ");
            let sql = format!(
                "DELETE FROM note_image WHERE note_id = ? AND id NOT IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql).bind(note_id);
            for id in &keep_ids {
                query = query.bind(id.as_str());
            }
            query.execute(&mut *tx).await?;
        }

        for change in changes {
            match (change.id, change.data) {
                (Some(id), Some((content_type, blob))) => {
                    sqlx::query(
                        r#"
                    UPDATE note_image
                    SET alt_text = ?, content_type = ?, blob = ?, updated_at = ?
                    WHERE id = ? AND note_id = ?
                    "#,
                    )
                    .bind(change.alt_text)
                    .bind(content_type)
                    .bind(blob)
                    .bind(now)
                    .bind(id)
                    .bind(note_id)
                    .execute(&mut *tx)
                    .await?;
                }
                (Some(id), None) => {
                    sqlx::query(
                        "UPDATE note_image SET alt_text = ?, updated_at = ? WHERE id = ? AND note_id = ?",
                    )
                    .bind(change.alt_text)
                    .bind(now)
                    .bind(id)
                    .bind(note_id)
                    .execute(&mut *tx)
                    .await?;
                }
                (None, Some((content_type, blob))) => {
                    sqlx::query(
                        r#"
                    INSERT INTO note_image (id, alt_text, content_type, blob, note_id, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                    )
                    .bind(Db::new_id())
                    .bind(change.alt_text)
                    .bind(content_type)
                    .bind(blob)
                    .bind(note_id)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                // An empty slot (no id, no upload) is a no-op.
                (None, None) => {}
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
