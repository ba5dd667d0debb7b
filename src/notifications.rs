use sqlx::SqlitePool;

use crate::{
    dates::display_date,
    error::{AppError, AppResult},
    models::NotificationRow,
    state::{AppState, NotificationSnapshot, ServerEvent},
};

pub fn appointment_message(customer_name: &str, date: &str) -> String {
    format!("موعد جديد: {} - {}", customer_name, display_date(date))
}

pub async fn snapshot(pool: &SqlitePool, limit: i64) -> AppResult<NotificationSnapshot> {
    let items = sqlx::query_as::<_, NotificationRow>(
        r#"SELECT id, appointment_id, kind, message, customer_name, date, read, created_at
           FROM notifications
           ORDER BY created_at DESC
           LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    // The dashboard badge counts what the feed shows, not the whole table.
    let unread = items.iter().filter(|item| !item.read).count() as i64;

    Ok(NotificationSnapshot { unread, items })
}

pub async fn mark_read(pool: &SqlitePool, id: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Notification not found"));
    }
    Ok(())
}

pub async fn mark_all_read(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Sends the current feed to every live dashboard. Having no listeners is
/// not an error.
pub async fn publish(state: &AppState, kind: &str, notification_id: Option<String>) {
    match snapshot(&state.db, state.config.notification_feed_limit).await {
        Ok(snapshot) => {
            let _ = state
                .events
                .send(ServerEvent::new(kind, notification_id, snapshot));
        }
        Err(err) => log::warn!("Could not build notification snapshot: {err}"),
    }
}

/// Edge detector for the dashboard's audio cue.
#[derive(Debug, Default)]
pub struct UnreadTracker {
    previous: Option<i64>,
}

impl UnreadTracker {
    /// Returns true when `unread` rose above the last observed count. The
    /// first observation only sets the baseline.
    pub fn observe(&mut self, unread: i64) -> bool {
        let chime = matches!(self.previous, Some(previous) if unread > previous);
        self.previous = Some(unread);
        chime
    }
}
