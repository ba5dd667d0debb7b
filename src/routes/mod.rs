pub mod admin;
pub mod events;
pub mod public;
pub mod uploads;

use std::path::PathBuf;

use actix_files::Files;
use actix_web::{web, HttpRequest};

use crate::state::AppState;

pub fn configure(upload_dir: PathBuf) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.service(Files::new("/static", "./static").prefer_utf8(true))
            .service(Files::new("/uploads", upload_dir))
            .configure(public::configure)
            .configure(uploads::configure)
            .configure(events::configure)
            .configure(admin::configure);
    }
}

/// Base for absolute URLs handed back to clients: the configured public
/// origin, or whatever host the request came in on.
pub fn public_base(state: &AppState, req: &HttpRequest) -> String {
    if let Some(base) = state.config.public_base_url.as_deref() {
        return base.to_string();
    }
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}

#[cfg(test)]
pub mod tests {
    use base64::{engine::general_purpose, Engine as _};
    use tempfile::TempDir;

    use crate::{
        config::Config,
        db::{insert_admin, test_pool},
        state::{AppState, PushConfig},
    };

    pub const ADMIN_USER: &str = "owner";
    pub const ADMIN_PASSWORD: &str = "wedding-2025";

    pub async fn test_state() -> (AppState, TempDir) {
        let pool = test_pool().await;
        insert_admin(&pool, ADMIN_USER, "Owner", ADMIN_PASSWORD)
            .await
            .expect("seed admin");
        let dir = tempfile::tempdir().expect("upload dir");
        let config = Config {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            upload_dir: dir.path().to_path_buf(),
            max_upload_bytes: 64,
            public_base_url: Some("http://media.test".to_string()),
            upcoming_window_days: 8,
            notification_feed_limit: 10,
            push: PushConfig {
                public_key: String::new(),
                private_key: String::new(),
                subject: String::new(),
            },
        };
        (AppState::new(pool, config), dir)
    }

    pub fn basic_auth(user: &str, password: &str) -> (&'static str, String) {
        let token = general_purpose::STANDARD.encode(format!("{user}:{password}"));
        ("Authorization", format!("Basic {token}"))
    }

    pub fn admin_auth() -> (&'static str, String) {
        basic_auth(ADMIN_USER, ADMIN_PASSWORD)
    }

    macro_rules! test_app {
        ($state:expr) => {
            actix_web::test::init_service(
                actix_web::App::new()
                    .app_data(actix_web::web::Data::new($state.clone()))
                    .configure($crate::routes::configure(
                        $state.config.upload_dir.clone(),
                    )),
            )
            .await
        };
    }

    pub(crate) use test_app;
}
