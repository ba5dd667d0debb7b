use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    dates::normalize_reservation_date,
    db::now_timestamp,
    error::{AppError, AppResult},
    models::{AppointmentRow, NotificationRow, NOTIFICATION_KIND_APPOINTMENT},
    notifications::appointment_message,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentInput {
    pub customer_name: String,
    pub region: String,
    pub date: String,
    pub phone: String,
}

impl AppointmentInput {
    pub fn validate(&self) -> Result<AppointmentInput, Vec<String>> {
        let mut errors = Vec::new();
        if self.customer_name.trim().is_empty() {
            errors.push("الاسم مطلوب".to_string());
        }
        if self.region.trim().is_empty() {
            errors.push("المنطقة مطلوبة".to_string());
        }
        if self.phone.trim().is_empty() {
            errors.push("رقم الهاتف مطلوب".to_string());
        }
        let date = normalize_reservation_date(&self.date);
        if date.is_err() {
            errors.push("يرجى اختيار تاريخ صحيح".to_string());
        }

        match date {
            Ok(date) if errors.is_empty() => Ok(AppointmentInput {
                customer_name: self.customer_name.trim().to_string(),
                region: self.region.trim().to_string(),
                date,
                phone: self.phone.trim().to_string(),
            }),
            _ => Err(errors),
        }
    }
}

/// Writes the appointment and its admin notification atomically.
pub async fn create(
    pool: &SqlitePool,
    input: &AppointmentInput,
) -> AppResult<(AppointmentRow, NotificationRow)> {
    let created_at = now_timestamp();
    let appointment = AppointmentRow {
        id: new_id(),
        customer_name: input.customer_name.clone(),
        region: input.region.clone(),
        date: input.date.clone(),
        phone: input.phone.clone(),
        created_at: created_at.clone(),
    };
    let notification = NotificationRow {
        id: new_id(),
        appointment_id: Some(appointment.id.clone()),
        kind: NOTIFICATION_KIND_APPOINTMENT.to_string(),
        message: appointment_message(&appointment.customer_name, &appointment.date),
        customer_name: appointment.customer_name.clone(),
        date: appointment.date.clone(),
        read: false,
        created_at,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO appointments (id, customer_name, region, date, phone, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&appointment.id)
    .bind(&appointment.customer_name)
    .bind(&appointment.region)
    .bind(&appointment.date)
    .bind(&appointment.phone)
    .bind(&appointment.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO notifications (id, appointment_id, kind, message, customer_name, date, read, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&notification.id)
    .bind(&notification.appointment_id)
    .bind(&notification.kind)
    .bind(&notification.message)
    .bind(&notification.customer_name)
    .bind(&notification.date)
    .bind(&notification.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Appointment {} booked for {} on {}",
        appointment.id,
        appointment.customer_name,
        appointment.date
    );
    Ok((appointment, notification))
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<AppointmentRow>> {
    Ok(sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, customer_name, region, date, phone, created_at
           FROM appointments
           ORDER BY date ASC, created_at ASC"#,
    )
    .fetch_all(pool)
    .await?)
}

/// Removes the appointment together with the notifications that point at it.
pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<u64> {
    let mut tx = pool.begin().await?;

    let removed_notifications = sqlx::query("DELETE FROM notifications WHERE appointment_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let removed = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 0 {
        tx.rollback().await?;
        return Err(AppError::not_found("Appointment not found"));
    }

    tx.commit().await?;
    Ok(removed_notifications)
}
