use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub const ROLE_ADMIN: &str = "admin";

pub const NOTIFICATION_KIND_APPOINTMENT: &str = "appointment";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 3] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::Cancelled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "في الانتظار",
            ReservationStatus::Confirmed => "تم التأكيد",
            ReservationStatus::Cancelled => "تم الإلغاء",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.label() == value)
            .ok_or_else(|| format!("Unknown reservation status: {value}"))
    }
}

/// Feedback visibility on the public testimonials page, stored as "yes"/"no".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFlag {
    Yes,
    No,
}

impl PublishFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishFlag::Yes => "yes",
            PublishFlag::No => "no",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            PublishFlag::Yes => PublishFlag::No,
            PublishFlag::No => PublishFlag::Yes,
        }
    }

    /// Anything that is not exactly "yes" counts as unpublished.
    pub fn parse(value: &str) -> Self {
        if value == "yes" {
            PublishFlag::Yes
        } else {
            PublishFlag::No
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
    ProfileImage,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::ProfileImage => "profile_image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStorage {
    Local,
    Hosted,
    Inline,
}

impl MediaStorage {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaStorage::Local => "local",
            MediaStorage::Hosted => "hosted",
            MediaStorage::Inline => "inline",
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReservationRow {
    pub id: String,
    pub customer_name: String,
    pub region: String,
    pub date: String,
    pub phone: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub customer_name: String,
    pub region: String,
    pub date: String,
    pub phone: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub appointment_id: Option<String>,
    pub kind: String,
    pub message: String,
    pub customer_name: String,
    pub date: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeedbackRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub body: String,
    pub publish: String,
    pub likes: i64,
    pub created_at: String,
}

impl FeedbackRow {
    pub fn is_published(&self) -> bool {
        PublishFlag::parse(&self.publish) == PublishFlag::Yes
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MediaItemRow {
    pub id: String,
    pub kind: String,
    pub storage: String,
    pub url: Option<String>,
    pub original_name: Option<String>,
    #[serde(skip_serializing)]
    pub inline_data: Option<String>,
    pub created_at: String,
}

impl MediaItemRow {
    /// Address a browser can load: the stored URL, or the inline data URL.
    pub fn src(&self) -> &str {
        self.url
            .as_deref()
            .or(self.inline_data.as_deref())
            .unwrap_or_default()
    }
}
