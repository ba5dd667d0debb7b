use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db::now_timestamp,
    error::{AppError, AppResult},
    models::{FeedbackRow, PublishFlag},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackInput {
    pub name: String,
    pub email: String,
    pub body: String,
}

impl FeedbackInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.body.trim().is_empty()
        {
            return Err("جميع الحقول مطلوبة".to_string());
        }
        if !self.email.contains('@') {
            return Err("البريد الإلكتروني غير صالح".to_string());
        }
        Ok(())
    }
}

const SELECT_FEEDBACK: &str =
    "SELECT id, name, email, body, publish, likes, created_at FROM feedback";

/// New entries wait for the admin to publish them.
pub async fn submit(pool: &SqlitePool, input: &FeedbackInput) -> AppResult<FeedbackRow> {
    input.validate().map_err(AppError::Validation)?;

    let row = FeedbackRow {
        id: new_id(),
        name: input.name.trim().to_string(),
        email: input.email.trim().to_string(),
        body: input.body.trim().to_string(),
        publish: PublishFlag::No.as_str().to_string(),
        likes: 0,
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"INSERT INTO feedback (id, name, email, body, publish, likes, created_at)
           VALUES (?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.email)
    .bind(&row.body)
    .bind(&row.publish)
    .bind(&row.created_at)
    .execute(pool)
    .await?;

    Ok(row)
}

pub async fn list_published(pool: &SqlitePool) -> AppResult<Vec<FeedbackRow>> {
    Ok(sqlx::query_as::<_, FeedbackRow>(&format!(
        "{SELECT_FEEDBACK} WHERE publish = ? ORDER BY created_at DESC"
    ))
    .bind(PublishFlag::Yes.as_str())
    .fetch_all(pool)
    .await?)
}

pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<FeedbackRow>> {
    Ok(
        sqlx::query_as::<_, FeedbackRow>(&format!("{SELECT_FEEDBACK} ORDER BY created_at DESC"))
            .fetch_all(pool)
            .await?,
    )
}

pub async fn like(pool: &SqlitePool, id: &str) -> AppResult<i64> {
    sqlx::query_scalar::<_, i64>("UPDATE feedback SET likes = likes + 1 WHERE id = ? RETURNING likes")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Feedback not found"))
}

pub async fn toggle_publish(pool: &SqlitePool, id: &str) -> AppResult<PublishFlag> {
    let current = sqlx::query_scalar::<_, String>("SELECT publish FROM feedback WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Feedback not found"))?;

    let next = PublishFlag::parse(&current).toggled();
    sqlx::query("UPDATE feedback SET publish = ? WHERE id = ?")
        .bind(next.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(next)
}

pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM feedback WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Feedback not found"));
    }
    Ok(())
}
