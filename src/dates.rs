//! Reservation date handling.
//!
//! Older reservations carry locale-formatted dates (`DD/MM/YYYY`) while newer
//! ones use `YYYY-MM-DD`. Everything written by this service is normalized to
//! the ISO form; reading tolerates both so legacy rows still classify.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const ISO_FORMAT: &str = "%Y-%m-%d";
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Which slice of the reservation list an admin view shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateView {
    #[default]
    All,
    Old,
    Upcoming,
}

impl DateView {
    pub fn as_str(self) -> &'static str {
        match self {
            DateView::All => "all",
            DateView::Old => "old",
            DateView::Upcoming => "upcoming",
        }
    }

    /// `All` keeps every row, malformed dates included. The dated views
    /// drop rows whose date cannot be parsed.
    pub fn includes(self, date: Option<NaiveDate>, today: NaiveDate, window_days: i64) -> bool {
        match (self, date) {
            (DateView::All, _) => true,
            (_, None) => false,
            (DateView::Old, Some(date)) => date < today,
            (DateView::Upcoming, Some(date)) => match window_end(today, window_days) {
                Some(end) => date >= today && date <= end,
                None => false,
            },
        }
    }
}

/// Last day of the upcoming window, or `None` when the window is negative
/// or runs past the calendar chrono can represent.
fn window_end(today: NaiveDate, window_days: i64) -> Option<NaiveDate> {
    if window_days < 0 {
        return None;
    }
    Duration::try_days(window_days).and_then(|days| today.checked_add_signed(days))
}

pub fn parse_reservation_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, ISO_FORMAT) {
        return Some(date);
    }

    // ISO date-time: only the calendar part matters.
    if raw.len() > 10 && raw.is_char_boundary(10) {
        let (head, tail) = raw.split_at(10);
        if tail.starts_with('T') || tail.starts_with(' ') {
            if let Ok(date) = NaiveDate::parse_from_str(head, ISO_FORMAT) {
                return Some(date);
            }
        }
    }

    let mut parts = raw.split('/');
    let (Some(day), Some(month), Some(year), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if year.len() != 4 {
        return None;
    }
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn normalize_reservation_date(raw: &str) -> AppResult<String> {
    parse_reservation_date(raw)
        .map(|date| date.format(ISO_FORMAT).to_string())
        .ok_or_else(|| AppError::validation(format!("Invalid date: {}", raw.trim())))
}

/// `DD/MM/YYYY` for anything parseable, the raw string otherwise.
pub fn display_date(raw: &str) -> String {
    match parse_reservation_date(raw) {
        Some(date) => date.format(DISPLAY_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Stored RFC 3339 timestamps as `HH:MM DD/MM/YYYY`, local time.
pub fn display_timestamp(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .with_timezone(&chrono::Local)
            .format("%H:%M %d/%m/%Y")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_both_historical_encodings() {
        assert_eq!(parse_reservation_date("2025-06-14"), Some(ymd(2025, 6, 14)));
        assert_eq!(parse_reservation_date("14/06/2025"), Some(ymd(2025, 6, 14)));
        assert_eq!(parse_reservation_date("4/6/2025"), Some(ymd(2025, 6, 4)));
        assert_eq!(
            parse_reservation_date("2025-06-14T18:30"),
            Some(ymd(2025, 6, 14))
        );
        assert_eq!(parse_reservation_date(" 2025-06-14 "), Some(ymd(2025, 6, 14)));
    }

    #[test]
    fn rejects_malformed_dates() {
        for raw in ["", "tomorrow", "31/02/2025", "2025/06/14", "14/06/25", "06-14-2025", "1/2/3/2025"] {
            assert_eq!(parse_reservation_date(raw), None, "{raw}");
        }
    }

    #[test]
    fn normalizes_to_iso() {
        assert_eq!(normalize_reservation_date("01/12/2025").unwrap(), "2025-12-01");
        assert!(matches!(
            normalize_reservation_date("soon"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn displays_day_first() {
        assert_eq!(display_date("2025-12-01"), "01/12/2025");
        assert_eq!(display_date("غير معروف"), "غير معروف");
    }

    #[test]
    fn timestamps_fall_back_to_raw_text() {
        assert_eq!(display_timestamp("yesterday"), "yesterday");
        let shown = display_timestamp("2025-06-10T10:00:00.000000Z");
        assert_eq!(shown.len(), "10:00 10/06/2025".len());
    }

    #[test]
    fn old_view_is_strictly_before_today() {
        let today = ymd(2025, 6, 10);
        assert!(DateView::Old.includes(Some(ymd(2025, 6, 9)), today, 8));
        assert!(!DateView::Old.includes(Some(today), today, 8));
        assert!(!DateView::Old.includes(None, today, 8));
    }

    #[test]
    fn upcoming_window_is_inclusive_on_both_ends() {
        let today = ymd(2025, 6, 10);
        assert!(DateView::Upcoming.includes(Some(today), today, 8));
        assert!(DateView::Upcoming.includes(Some(ymd(2025, 6, 18)), today, 8));
        assert!(!DateView::Upcoming.includes(Some(ymd(2025, 6, 19)), today, 8));
        assert!(!DateView::Upcoming.includes(Some(ymd(2025, 6, 9)), today, 8));
        assert!(!DateView::Upcoming.includes(None, today, 8));
    }

    #[test]
    fn oversized_window_excludes_instead_of_panicking() {
        let today = ymd(2025, 6, 10);
        assert!(!DateView::Upcoming.includes(Some(today), today, 1_000_000_000_000));
        assert!(!DateView::Upcoming.includes(Some(today), today, i64::MAX));
        assert!(!DateView::Upcoming.includes(Some(today), today, -1));
        assert!(DateView::Upcoming.includes(Some(today), today, 0));
    }

    #[test]
    fn all_view_keeps_malformed_rows() {
        assert!(DateView::All.includes(None, ymd(2025, 6, 10), 8));
    }
}
