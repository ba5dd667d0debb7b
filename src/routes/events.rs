use actix_files::NamedFile;
use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{admin_validator, logout_guard},
    error::AppResult,
    notifications::{self, UnreadTracker},
    state::{AppState, NotificationSnapshot},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/admin/events")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(stream_events)),
    )
    .service(web::resource("/sw.js").route(web::get().to(service_worker)));
}

async fn service_worker() -> Result<NamedFile> {
    Ok(NamedFile::open("./static/sw.js")?)
}

/// One SSE frame for the dashboard bell.
#[derive(Serialize)]
struct FeedFrame<'a> {
    kind: &'a str,
    notification_id: Option<&'a str>,
    chime: bool,
    snapshot: &'a NotificationSnapshot,
}

struct FeedUpdate {
    kind: String,
    notification_id: Option<String>,
    snapshot: NotificationSnapshot,
}

async fn stream_events(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    // Subscribe before reading the table so nothing lands in between.
    let rx = state.events.subscribe();
    let initial = FeedUpdate {
        kind: "snapshot".to_string(),
        notification_id: None,
        snapshot: notifications::snapshot(&state.db, state.config.notification_feed_limit).await?,
    };

    let updates = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(FeedUpdate {
            kind: event.kind,
            notification_id: event.notification_id,
            snapshot: event.snapshot,
        }),
        Err(err) => {
            log::debug!("Dashboard stream skipped events: {err}");
            None
        }
    });

    let mut tracker = UnreadTracker::default();
    let stream = tokio_stream::once(initial).chain(updates).map(move |update| {
        let chime = tracker.observe(update.snapshot.unread);
        Ok::<web::Bytes, actix_web::Error>(frame_to_bytes(&update, chime))
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

fn frame_to_bytes(update: &FeedUpdate, chime: bool) -> web::Bytes {
    let frame = FeedFrame {
        kind: &update.kind,
        notification_id: update.notification_id.as_deref(),
        chime,
        snapshot: &update.snapshot,
    };
    let payload = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: notifications\ndata: {}\n\n", payload))
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use actix_web::{body::MessageBody, http::StatusCode, test};
    use futures_util::future::poll_fn;

    use crate::{
        appointments::{self, AppointmentInput},
        notifications,
        routes::tests::{admin_auth, test_app, test_state},
    };

    async fn next_frame<B: MessageBody>(body: &mut Pin<Box<B>>) -> serde_json::Value {
        let chunk = poll_fn(|cx| body.as_mut().poll_next(cx))
            .await
            .expect("stream ended")
            .ok()
            .expect("body error");
        let text = std::str::from_utf8(&chunk).unwrap().to_string();
        assert!(text.starts_with("event: notifications\ndata: "));
        let data = text
            .trim_start_matches("event: notifications\ndata: ")
            .trim_end();
        serde_json::from_str(data).unwrap()
    }

    #[actix_web::test]
    async fn stream_requires_admin() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);
        let req = test::TestRequest::get().uri("/admin/events").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn first_frame_is_baseline_and_new_booking_chimes() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::get()
            .uri("/admin/events")
            .insert_header(admin_auth())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let mut body = Box::pin(resp.into_body());

        let first = next_frame(&mut body).await;
        assert_eq!(first["kind"], "snapshot");
        assert_eq!(first["chime"], false);
        assert_eq!(first["snapshot"]["unread"], 0);

        let input = AppointmentInput {
            customer_name: "ليان".to_string(),
            region: "إربد".to_string(),
            date: "2025-10-02".to_string(),
            phone: "0790000000".to_string(),
        };
        let (_, notification) = appointments::create(&state.db, &input).await.unwrap();
        notifications::publish(&state, "appointment_created", Some(notification.id.clone())).await;

        let second = next_frame(&mut body).await;
        assert_eq!(second["chime"], true);
        assert_eq!(second["notification_id"], notification.id.as_str());
        assert_eq!(second["snapshot"]["unread"], 1);

        notifications::mark_all_read(&state.db).await.unwrap();
        notifications::publish(&state, "notifications_read", None).await;
        let third = next_frame(&mut body).await;
        assert_eq!(third["chime"], false);
        assert_eq!(third["snapshot"]["unread"], 0);
    }
}
