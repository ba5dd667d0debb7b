use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    dates::{display_date, normalize_reservation_date, parse_reservation_date, DateView},
    db::now_timestamp,
    error::{AppError, AppResult},
    models::{ReservationRow, ReservationStatus},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationInput {
    pub customer_name: String,
    pub region: String,
    pub date: String,
    pub phone: String,
    pub status: Option<String>,
}

/// A validated reservation, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub customer_name: String,
    pub region: String,
    pub date: String,
    pub phone: String,
    pub status: ReservationStatus,
}

impl ReservationInput {
    /// Collects every problem instead of stopping at the first one, so the
    /// form can show them all.
    pub fn validate(&self) -> Result<NewReservation, Vec<String>> {
        let mut errors = Vec::new();
        if self.customer_name.trim().is_empty() {
            errors.push("اسم الزبون مطلوب".to_string());
        }
        if self.region.trim().is_empty() {
            errors.push("المنطقة مطلوبة".to_string());
        }
        if self.phone.trim().is_empty() {
            errors.push("رقم الهاتف مطلوب".to_string());
        }
        let date = match normalize_reservation_date(&self.date) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push("التاريخ غير صالح".to_string());
                None
            }
        };
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Some(ReservationStatus::default()),
            Some(raw) => match raw.parse::<ReservationStatus>() {
                Ok(status) => Some(status),
                Err(err) => {
                    errors.push(err);
                    None
                }
            },
        };

        match (date, status) {
            (Some(date), Some(status)) if errors.is_empty() => Ok(NewReservation {
                customer_name: self.customer_name.trim().to_string(),
                region: self.region.trim().to_string(),
                date,
                phone: self.phone.trim().to_string(),
                status,
            }),
            _ => Err(errors),
        }
    }
}

impl From<&ReservationRow> for ReservationInput {
    fn from(row: &ReservationRow) -> Self {
        Self {
            customer_name: row.customer_name.clone(),
            region: row.region.clone(),
            date: row.date.clone(),
            phone: row.phone.clone(),
            status: Some(row.status.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationFilter {
    #[serde(default)]
    pub view: DateView,
    pub name: Option<String>,
    pub date: Option<String>,
}

impl ReservationFilter {
    fn name_needle(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
    }

    /// The exact-date filter, if present and parseable. An unparseable
    /// filter matches nothing.
    fn exact_date(&self) -> Option<Option<NaiveDate>> {
        self.date
            .as_deref()
            .map(str::trim)
            .filter(|date| !date.is_empty())
            .map(parse_reservation_date)
    }

    pub fn apply(
        &self,
        rows: Vec<ReservationRow>,
        today: NaiveDate,
        window_days: i64,
    ) -> Vec<ReservationRow> {
        let needle = self.name_needle();
        let exact = self.exact_date();

        let mut kept: Vec<(Option<NaiveDate>, ReservationRow)> = rows
            .into_iter()
            .map(|row| (parse_reservation_date(&row.date), row))
            .filter(|(date, row)| {
                let name_ok = needle
                    .as_ref()
                    .map_or(true, |needle| row.customer_name.to_lowercase().contains(needle));
                let date_ok = match exact {
                    None => true,
                    Some(wanted) => wanted.is_some() && *date == wanted,
                };
                name_ok && date_ok && self.view.includes(*date, today, window_days)
            })
            .collect();

        match self.view {
            DateView::Old => kept.sort_by(|a, b| b.0.cmp(&a.0)),
            DateView::Upcoming => kept.sort_by(|a, b| a.0.cmp(&b.0)),
            DateView::All => kept.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at)),
        }

        kept.into_iter().map(|(_, row)| row).collect()
    }
}

pub async fn create(pool: &SqlitePool, reservation: &NewReservation) -> AppResult<ReservationRow> {
    let row = ReservationRow {
        id: new_id(),
        customer_name: reservation.customer_name.clone(),
        region: reservation.region.clone(),
        date: reservation.date.clone(),
        phone: reservation.phone.clone(),
        status: reservation.status.label().to_string(),
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"INSERT INTO reservations (id, customer_name, region, date, phone, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.customer_name)
    .bind(&row.region)
    .bind(&row.date)
    .bind(&row.phone)
    .bind(&row.status)
    .bind(&row.created_at)
    .execute(pool)
    .await?;

    Ok(row)
}

pub async fn fetch(pool: &SqlitePool, id: &str) -> AppResult<ReservationRow> {
    sqlx::query_as::<_, ReservationRow>(
        r#"SELECT id, customer_name, region, date, phone, status, created_at
           FROM reservations
           WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Reservation not found"))
}

pub async fn fetch_all(pool: &SqlitePool) -> AppResult<Vec<ReservationRow>> {
    Ok(sqlx::query_as::<_, ReservationRow>(
        "SELECT id, customer_name, region, date, phone, status, created_at FROM reservations",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn update(pool: &SqlitePool, id: &str, reservation: &NewReservation) -> AppResult<()> {
    let result = sqlx::query(
        r#"UPDATE reservations
           SET customer_name = ?, region = ?, date = ?, phone = ?, status = ?
           WHERE id = ?"#,
    )
    .bind(&reservation.customer_name)
    .bind(&reservation.region)
    .bind(&reservation.date)
    .bind(&reservation.phone)
    .bind(reservation.status.label())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Reservation not found"));
    }
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM reservations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Reservation not found"));
    }
    Ok(())
}

pub fn to_csv(rows: &[ReservationRow]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |err: csv::Error| AppError::Internal(format!("CSV export failed: {err}"));

    writer
        .write_record(["اسم الزبون", "المنطقة", "التاريخ", "رقم الهاتف", "الحالة"])
        .map_err(csv_err)?;
    for row in rows {
        writer
            .write_record([
                row.customer_name.as_str(),
                row.region.as_str(),
                display_date(&row.date).as_str(),
                row.phone.as_str(),
                row.status.as_str(),
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|err| AppError::Internal(format!("CSV export failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn row(name: &str, date: &str, created_at: &str) -> ReservationRow {
        ReservationRow {
            id: new_id(),
            customer_name: name.to_string(),
            region: "عمان".to_string(),
            date: date.to_string(),
            phone: "0790000000".to_string(),
            status: ReservationStatus::Pending.label().to_string(),
            created_at: created_at.to_string(),
        }
    }

    fn input(date: &str) -> ReservationInput {
        ReservationInput {
            customer_name: " ليلى ".to_string(),
            region: "إربد".to_string(),
            date: date.to_string(),
            phone: "0790000000".to_string(),
            status: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn validation_normalizes_and_defaults_status() {
        let reservation = input("20/06/2025").validate().unwrap();
        assert_eq!(reservation.date, "2025-06-20");
        assert_eq!(reservation.customer_name, "ليلى");
        assert_eq!(reservation.status, ReservationStatus::Pending);
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut bad = input("someday");
        bad.phone = " ".to_string();
        bad.status = Some("done".to_string());
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn partitions_mixed_encodings() {
        let rows = vec![
            row("A", "2025-06-01", "2025-01-01T00:00:00.000001Z"),
            row("B", "12/06/2025", "2025-01-02T00:00:00.000001Z"),
            row("C", "not a date", "2025-01-03T00:00:00.000001Z"),
            row("D", "2025-06-30", "2025-01-04T00:00:00.000001Z"),
            row("E", "05/06/2025", "2025-01-05T00:00:00.000001Z"),
        ];

        let names = |view: DateView| -> Vec<String> {
            ReservationFilter { view, ..Default::default() }
                .apply(rows.clone(), today(), 8)
                .into_iter()
                .map(|row| row.customer_name)
                .collect()
        };

        assert_eq!(names(DateView::Old), vec!["E", "A"]);
        assert_eq!(names(DateView::Upcoming), vec!["B"]);
        assert_eq!(names(DateView::All), vec!["E", "D", "C", "B", "A"]);
    }

    #[test]
    fn filters_by_name_and_exact_date() {
        let rows = vec![
            row("Sara Haddad", "2025-06-01", "1"),
            row("sara khalil", "2025-06-02", "2"),
            row("Omar", "2025-06-01", "3"),
        ];

        let by_name = ReservationFilter {
            view: DateView::Old,
            name: Some("SARA".to_string()),
            date: None,
        }
        .apply(rows.clone(), today(), 8);
        assert_eq!(by_name.len(), 2);

        let by_date = ReservationFilter {
            view: DateView::Old,
            name: None,
            date: Some("01/06/2025".to_string()),
        }
        .apply(rows.clone(), today(), 8);
        assert_eq!(by_date.len(), 2);

        let bad_date = ReservationFilter {
            view: DateView::Old,
            name: None,
            date: Some("junk".to_string()),
        }
        .apply(rows, today(), 8);
        assert!(bad_date.is_empty());
    }

    #[test]
    fn csv_export_has_header_and_display_dates() {
        let csv = to_csv(&[row("A", "2025-06-01", "1")]).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("اسم الزبون"));
        assert!(lines.next().unwrap().contains("01/06/2025"));
    }

    #[actix_web::test]
    async fn create_update_delete() {
        let pool = test_pool().await;
        let created = create(&pool, &input("2025-06-20").validate().unwrap())
            .await
            .unwrap();

        let mut change = input("21/06/2025");
        change.status = Some(ReservationStatus::Confirmed.label().to_string());
        update(&pool, &created.id, &change.validate().unwrap())
            .await
            .unwrap();

        let stored = fetch(&pool, &created.id).await.unwrap();
        assert_eq!(stored.date, "2025-06-21");
        assert_eq!(stored.status, "تم التأكيد");

        delete(&pool, &created.id).await.unwrap();
        assert!(matches!(
            fetch(&pool, &created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete(&pool, &created.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
