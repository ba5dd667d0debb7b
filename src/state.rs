use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{config::Config, models::NotificationRow};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            db,
            events,
            config: Arc::new(config),
        }
    }

    pub fn push(&self) -> &PushConfig {
        &self.config.push
    }
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}

/// The dashboard's view of the notifications table.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NotificationSnapshot {
    pub unread: i64,
    pub items: Vec<NotificationRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub notification_id: Option<String>,
    pub snapshot: NotificationSnapshot,
}

impl ServerEvent {
    pub fn new(kind: &str, notification_id: Option<String>, snapshot: NotificationSnapshot) -> Self {
        Self {
            kind: kind.to_string(),
            notification_id,
            snapshot,
        }
    }
}
