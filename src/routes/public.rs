use actix_web::http::header::Header;
use actix_web::{http::header, http::StatusCode, web, HttpRequest, HttpResponse, Result};
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use askama::Template;
use serde::Deserialize;
use serde_json::json;

use crate::{
    appointments::{self, AppointmentInput},
    auth::{authenticate_credentials, clear_logout_cookie, logout_cookie, AUTH_REALM},
    dates::{display_date, display_timestamp},
    error::AppError,
    feedback::{self, FeedbackInput},
    media,
    models::{FeedbackRow, MediaItemRow, MediaKind, ROLE_ADMIN},
    notifications, push,
    state::AppState,
    templates::{render, render_with_status},
};

#[derive(Clone, Debug)]
pub struct MediaView {
    pub id: String,
    pub src: String,
    pub name: String,
}

impl From<MediaItemRow> for MediaView {
    fn from(row: MediaItemRow) -> Self {
        Self {
            src: row.src().to_string(),
            name: row.original_name.clone().unwrap_or_default(),
            id: row.id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TestimonialView {
    pub id: String,
    pub name: String,
    pub body: String,
    pub likes: i64,
    pub created_at: String,
}

impl From<FeedbackRow> for TestimonialView {
    fn from(row: FeedbackRow) -> Self {
        Self {
            created_at: display_timestamp(&row.created_at),
            id: row.id,
            name: row.name,
            body: row.body,
            likes: row.likes,
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    videos: Vec<MediaView>,
    images: Vec<MediaView>,
    profile_images: Vec<MediaView>,
    testimonials: Vec<TestimonialView>,
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookingTemplate {
    form: AppointmentInput,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "book_success.html")]
struct BookingSuccessTemplate {
    customer_name: String,
    date: String,
}

#[derive(Template)]
#[template(path = "feedback.html")]
struct FeedbackTemplate {
    testimonials: Vec<TestimonialView>,
    form: FeedbackInput,
    error: String,
    success: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(
            web::resource("/book")
                .route(web::get().to(show_booking))
                .route(web::post().to(create_booking)),
        )
        .service(
            web::resource("/feedback")
                .route(web::get().to(show_feedback))
                .route(web::post().to(submit_feedback)),
        )
        .service(web::resource("/feedback/{id}/like").route(web::post().to(like_feedback)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state.db, credentials.user_id(), password).await {
        Some(user) if user.role == ROLE_ADMIN => user,
        _ => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let redirect = if requested.starts_with("/admin") {
        requested
    } else {
        "/admin/dashboard"
    };
    log::info!("{} logged in", user.username);

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn home(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let videos = media::list_items(&state.db, MediaKind::Video).await?;
    let images = media::list_items(&state.db, MediaKind::Image).await?;
    let profile_images = media::list_items(&state.db, MediaKind::ProfileImage).await?;
    let testimonials = feedback::list_published(&state.db).await?;

    Ok(render(HomeTemplate {
        videos: videos.into_iter().map(MediaView::from).collect(),
        images: images.into_iter().map(MediaView::from).collect(),
        profile_images: profile_images.into_iter().map(MediaView::from).collect(),
        testimonials: testimonials
            .into_iter()
            .take(6)
            .map(TestimonialView::from)
            .collect(),
    }))
}

async fn show_booking() -> HttpResponse {
    render(BookingTemplate {
        form: AppointmentInput::default(),
        errors: Vec::new(),
    })
}

async fn create_booking(
    state: web::Data<AppState>,
    form: web::Form<AppointmentInput>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok(render_with_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                BookingTemplate { form, errors },
            ))
        }
    };

    let (appointment, notification) = appointments::create(&state.db, &input).await?;
    notifications::publish(&state, "appointment_created", Some(notification.id)).await;
    push::notify_admins(
        &state,
        "موعد جديد",
        &notification.message,
        "/admin/dashboard",
    )
    .await;

    Ok(render(BookingSuccessTemplate {
        customer_name: appointment.customer_name,
        date: display_date(&appointment.date),
    }))
}

async fn feedback_page(
    state: &AppState,
    status: StatusCode,
    form: FeedbackInput,
    error: String,
    success: String,
) -> Result<HttpResponse, AppError> {
    let testimonials = feedback::list_published(&state.db)
        .await?
        .into_iter()
        .map(TestimonialView::from)
        .collect();
    Ok(render_with_status(
        status,
        FeedbackTemplate {
            testimonials,
            form,
            error,
            success,
        },
    ))
}

async fn show_feedback(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    feedback_page(
        &state,
        StatusCode::OK,
        FeedbackInput::default(),
        String::new(),
        String::new(),
    )
    .await
}

async fn submit_feedback(
    state: web::Data<AppState>,
    form: web::Form<FeedbackInput>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    match feedback::submit(&state.db, &form).await {
        Ok(_) => {
            feedback_page(
                &state,
                StatusCode::OK,
                FeedbackInput::default(),
                String::new(),
                "شكراً لك! سيتم نشر ملاحظاتك قريباً".to_string(),
            )
            .await
        }
        Err(AppError::Validation(message)) => {
            feedback_page(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                form,
                message,
                String::new(),
            )
            .await
        }
        Err(err) => Err(err),
    }
}

async fn like_feedback(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let likes = feedback::like(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "likes": likes })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{test_app, test_state};
    use actix_web::test;

    #[actix_web::test]
    async fn booking_writes_appointment_and_notification() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/book")
            .set_form([
                ("customer_name", "سلمى"),
                ("region", "عمان"),
                ("date", "2025-09-01"),
                ("phone", "0791111111"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let feed = notifications::snapshot(&state.db, 10).await.unwrap();
        assert_eq!(feed.unread, 1);
        assert_eq!(feed.items[0].message, "موعد جديد: سلمى - 01/09/2025");
        assert_eq!(appointments::list(&state.db).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn invalid_booking_is_rerendered_without_writes() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/book")
            .set_form([
                ("customer_name", "سلمى"),
                ("region", ""),
                ("date", "next week"),
                ("phone", "0791111111"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(appointments::list(&state.db).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn feedback_is_held_until_published_and_can_be_liked() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::post()
            .uri("/feedback")
            .set_form([
                ("name", "Dana"),
                ("email", "dana@example.com"),
                ("body", "خدمة ممتازة"),
            ])
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(feedback::list_published(&state.db).await.unwrap().is_empty());

        let entry = feedback::list_all(&state.db).await.unwrap().remove(0);
        let req = test::TestRequest::post()
            .uri(&format!("/feedback/{}/like", entry.id))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["likes"], 1);

        let req = test::TestRequest::post()
            .uri("/feedback/missing/like")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn health_and_home_render() {
        let (state, _dir) = test_state().await;
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "ok");

        let req = test::TestRequest::get().uri("/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
