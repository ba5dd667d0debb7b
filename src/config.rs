use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use crate::state::PushConfig;

const DEFAULT_WINDOW_DAYS: i64 = 8;
const MAX_WINDOW_DAYS: i64 = 3650;
const DEFAULT_FEED_LIMIT: i64 = 10;
const MAX_FEED_LIMIT: i64 = 500;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub public_base_url: Option<String>,
    pub upcoming_window_days: i64,
    pub notification_feed_limit: i64,
    pub push: PushConfig,
}

impl Config {
    pub fn load() -> Self {
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());

        Self {
            port: try_load("PORT", 5001),
            database_url: try_load("DATABASE_URL", "sqlite://./data/sobhe.db".to_string()),
            upload_dir: PathBuf::from(try_load("UPLOAD_DIR", "./uploads".to_string())),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", 100 * 1024 * 1024),
            public_base_url,
            upcoming_window_days: bounded(
                "UPCOMING_WINDOW_DAYS",
                try_load("UPCOMING_WINDOW_DAYS", DEFAULT_WINDOW_DAYS),
                MAX_WINDOW_DAYS,
                DEFAULT_WINDOW_DAYS,
            ),
            notification_feed_limit: bounded(
                "NOTIFICATION_FEED_LIMIT",
                try_load("NOTIFICATION_FEED_LIMIT", DEFAULT_FEED_LIMIT),
                MAX_FEED_LIMIT,
                DEFAULT_FEED_LIMIT,
            ),
            push: PushConfig {
                public_key: env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
                private_key: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
                subject: env::var("VAPID_SUBJECT")
                    .unwrap_or_else(|_| "mailto:admin@localhost".to_string()),
            },
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|err| {
            log::warn!("Invalid {key} value {raw:?}: {err}. Using default: {default}");
            default
        }),
        Err(_) => {
            log::info!("{key} not set, using default: {default}");
            default
        }
    }
}

/// Keeps `value` within `0..=max`, falling back to `default` otherwise.
fn bounded(key: &str, value: i64, max: i64, default: i64) -> i64 {
    if (0..=max).contains(&value) {
        value
    } else {
        log::warn!("{key} value {value} is outside 0..={max}. Using default: {default}");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_unparsable_values() {
        env::set_var("SOBHE_TEST_WINDOW", "eight");
        assert_eq!(try_load("SOBHE_TEST_WINDOW", 8_i64), 8);
        env::set_var("SOBHE_TEST_WINDOW", " 12 ");
        assert_eq!(try_load("SOBHE_TEST_WINDOW", 8_i64), 12);
        env::remove_var("SOBHE_TEST_WINDOW");
        assert_eq!(try_load("SOBHE_TEST_WINDOW", 8_i64), 8);
    }

    #[test]
    fn out_of_range_windows_fall_back() {
        assert_eq!(bounded("UPCOMING_WINDOW_DAYS", 30, MAX_WINDOW_DAYS, 8), 30);
        assert_eq!(bounded("UPCOMING_WINDOW_DAYS", 1_000_000_000_000, MAX_WINDOW_DAYS, 8), 8);
        assert_eq!(bounded("UPCOMING_WINDOW_DAYS", -2, MAX_WINDOW_DAYS, 8), 8);
    }
}
