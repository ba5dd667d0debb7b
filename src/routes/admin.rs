use actix_web::{http::header, http::StatusCode, middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    appointments,
    auth::{admin_validator, change_password, logout_guard, AuthUser, MIN_PASSWORD_LEN},
    dates::{display_date, display_timestamp, today, DateView},
    error::{AppError, AppResult},
    feedback, media,
    models::{AppointmentRow, FeedbackRow, MediaKind, NotificationRow, ReservationRow, ReservationStatus},
    notifications,
    push::{self, PushSubscriptionInput},
    reservations::{self, ReservationFilter, ReservationInput},
    routes::public::MediaView,
    state::AppState,
    templates::{render, render_with_status},
};

/// Base64 images arrive as JSON; the default extractor limit is too small.
const IMAGE_PAYLOAD_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
struct StatCard {
    label: &'static str,
    value: i64,
}

#[derive(Clone, Debug)]
struct ReservationView {
    id: String,
    customer_name: String,
    region: String,
    date: String,
    phone: String,
    status: String,
}

impl From<ReservationRow> for ReservationView {
    fn from(row: ReservationRow) -> Self {
        Self {
            date: display_date(&row.date),
            id: row.id,
            customer_name: row.customer_name,
            region: row.region,
            phone: row.phone,
            status: row.status,
        }
    }
}

#[derive(Clone, Debug)]
struct AppointmentView {
    id: String,
    customer_name: String,
    region: String,
    date: String,
    phone: String,
    created_at: String,
}

impl From<AppointmentRow> for AppointmentView {
    fn from(row: AppointmentRow) -> Self {
        Self {
            date: display_date(&row.date),
            created_at: display_timestamp(&row.created_at),
            id: row.id,
            customer_name: row.customer_name,
            region: row.region,
            phone: row.phone,
        }
    }
}

#[derive(Clone, Debug)]
struct NotificationView {
    id: String,
    message: String,
    read: bool,
    created_at: String,
}

impl From<NotificationRow> for NotificationView {
    fn from(row: NotificationRow) -> Self {
        Self {
            created_at: display_timestamp(&row.created_at),
            id: row.id,
            message: row.message,
            read: row.read,
        }
    }
}

#[derive(Clone, Debug)]
struct FeedbackView {
    id: String,
    name: String,
    email: String,
    body: String,
    likes: i64,
    published: bool,
    created_at: String,
}

impl From<FeedbackRow> for FeedbackView {
    fn from(row: FeedbackRow) -> Self {
        Self {
            published: row.is_published(),
            created_at: display_timestamp(&row.created_at),
            id: row.id,
            name: row.name,
            email: row.email,
            body: row.body,
            likes: row.likes,
        }
    }
}

#[derive(Clone, Debug)]
struct ViewTab {
    value: &'static str,
    label: &'static str,
    active: bool,
}

#[derive(Clone, Debug)]
struct StatusOption {
    value: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    admin_name: String,
    stats: Vec<StatCard>,
    upcoming: Vec<ReservationView>,
    notifications: Vec<NotificationView>,
    unread: i64,
    push_key: String,
}

#[derive(Template)]
#[template(path = "admin_reservations.html")]
struct AdminReservationsTemplate {
    reservations: Vec<ReservationView>,
    tabs: Vec<ViewTab>,
    view: &'static str,
    name: String,
    date: String,
}

#[derive(Template)]
#[template(path = "admin_reservation_form.html")]
struct AdminReservationFormTemplate {
    title: &'static str,
    action: String,
    form: ReservationInput,
    statuses: Vec<StatusOption>,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "admin_appointments.html")]
struct AdminAppointmentsTemplate {
    appointments: Vec<AppointmentView>,
}

#[derive(Template)]
#[template(path = "admin_feedback.html")]
struct AdminFeedbackTemplate {
    entries: Vec<FeedbackView>,
}

#[derive(Template)]
#[template(path = "admin_media.html")]
struct AdminMediaTemplate {
    videos: Vec<MediaView>,
    images: Vec<MediaView>,
    profile_images: Vec<MediaView>,
    profile_slots: i64,
    error: String,
}

#[derive(Template)]
#[template(path = "admin_settings.html")]
struct AdminSettingsTemplate {
    username: String,
    min_password_len: usize,
    error: String,
    success: String,
}

#[derive(Deserialize)]
struct HostedVideoForm {
    url: String,
}

#[derive(Deserialize)]
struct ImagePayload {
    #[serde(rename = "dataUrl")]
    data_url: String,
}

#[derive(Deserialize)]
struct ProfileImagesPayload {
    images: Vec<String>,
}

#[derive(Deserialize)]
struct PasswordForm {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .app_data(web::JsonConfig::default().limit(IMAGE_PAYLOAD_LIMIT))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/reservations")
                    .route(web::get().to(list_reservations))
                    .route(web::post().to(create_reservation)),
            )
            .service(web::resource("/reservations/export").route(web::get().to(export_reservations)))
            .service(web::resource("/reservations/new").route(web::get().to(new_reservation)))
            .service(web::resource("/reservations/{id}").route(web::post().to(update_reservation)))
            .service(web::resource("/reservations/{id}/edit").route(web::get().to(edit_reservation)))
            .service(
                web::resource("/reservations/{id}/delete").route(web::post().to(delete_reservation)),
            )
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}/delete").route(web::post().to(delete_appointment)),
            )
            .service(web::resource("/notifications").route(web::get().to(notification_feed)))
            .service(
                web::resource("/notifications/read-all").route(web::post().to(mark_all_notifications)),
            )
            .service(
                web::resource("/notifications/{id}/read").route(web::post().to(mark_notification)),
            )
            .service(web::resource("/push/subscribe").route(web::post().to(subscribe_push)))
            .service(web::resource("/feedback").route(web::get().to(list_feedback)))
            .service(web::resource("/feedback/{id}/publish").route(web::post().to(toggle_feedback)))
            .service(web::resource("/feedback/{id}/delete").route(web::post().to(delete_feedback)))
            .service(web::resource("/media").route(web::get().to(media_page)))
            .service(web::resource("/media/images").route(web::post().to(add_gallery_image)))
            .service(web::resource("/media/profile-images").route(web::post().to(add_profile_images)))
            .service(web::resource("/media/hosted-videos").route(web::post().to(add_hosted_video)))
            .service(web::resource("/media/{id}/delete").route(web::post().to(delete_media)))
            .service(
                web::resource("/settings")
                    .route(web::get().to(settings))
                    .route(web::post().to(update_password)),
            ),
    );
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/admin/dashboard"))
        .finish()
}

async fn count(pool: &SqlitePool, query: &str) -> AppResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(query).fetch_one(pool).await?)
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let window = state.config.upcoming_window_days;
    let upcoming = ReservationFilter {
        view: DateView::Upcoming,
        ..Default::default()
    }
    .apply(reservations::fetch_all(&state.db).await?, today(), window);
    let feed = notifications::snapshot(&state.db, state.config.notification_feed_limit).await?;

    let stats = vec![
        StatCard {
            label: "كل الحجوزات",
            value: count(&state.db, "SELECT COUNT(*) FROM reservations").await?,
        },
        StatCard {
            label: "الحجوزات القادمة",
            value: upcoming.len() as i64,
        },
        StatCard {
            label: "المواعيد",
            value: count(&state.db, "SELECT COUNT(*) FROM appointments").await?,
        },
        StatCard {
            label: "آراء بانتظار النشر",
            value: count(&state.db, "SELECT COUNT(*) FROM feedback WHERE publish <> 'yes'").await?,
        },
    ];

    let push_key = if state.push().enabled() {
        state.push().public_key.clone()
    } else {
        String::new()
    };

    Ok(render(AdminDashboardTemplate {
        admin_name: auth.display_name.clone(),
        stats,
        upcoming: upcoming.into_iter().map(ReservationView::from).collect(),
        unread: feed.unread,
        notifications: feed.items.into_iter().map(NotificationView::from).collect(),
        push_key,
    }))
}

async fn filtered_reservations(
    state: &AppState,
    filter: &ReservationFilter,
) -> AppResult<Vec<ReservationRow>> {
    let rows = reservations::fetch_all(&state.db).await?;
    Ok(filter.apply(rows, today(), state.config.upcoming_window_days))
}

async fn list_reservations(
    state: web::Data<AppState>,
    query: web::Query<ReservationFilter>,
) -> AppResult<HttpResponse> {
    let filter = query.into_inner();
    let rows = filtered_reservations(&state, &filter).await?;

    let tabs = [
        (DateView::All, "الكل"),
        (DateView::Old, "السابقة"),
        (DateView::Upcoming, "القادمة"),
    ]
    .into_iter()
    .map(|(view, label)| ViewTab {
        value: view.as_str(),
        label,
        active: view == filter.view,
    })
    .collect();

    Ok(render(AdminReservationsTemplate {
        reservations: rows.into_iter().map(ReservationView::from).collect(),
        tabs,
        view: filter.view.as_str(),
        name: filter.name.clone().unwrap_or_default(),
        date: filter.date.clone().unwrap_or_default(),
    }))
}

async fn export_reservations(
    state: web::Data<AppState>,
    query: web::Query<ReservationFilter>,
) -> AppResult<HttpResponse> {
    let filter = query.into_inner();
    let rows = filtered_reservations(&state, &filter).await?;
    let body = reservations::to_csv(&rows)?;
    log::info!("Exported {} reservations ({})", rows.len(), filter.view.as_str());

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"reservations-{}.csv\"",
                filter.view.as_str()
            ),
        ))
        .body(body))
}

fn status_options(selected: Option<&str>) -> Vec<StatusOption> {
    let selected = selected
        .and_then(|value| value.parse::<ReservationStatus>().ok())
        .unwrap_or_default();
    ReservationStatus::ALL
        .into_iter()
        .map(|status| StatusOption {
            value: status.label(),
            selected: status == selected,
        })
        .collect()
}

fn reservation_form(
    status: StatusCode,
    title: &'static str,
    action: String,
    form: ReservationInput,
    errors: Vec<String>,
) -> HttpResponse {
    let statuses = status_options(form.status.as_deref());
    render_with_status(
        status,
        AdminReservationFormTemplate {
            title,
            action,
            form,
            statuses,
            errors,
        },
    )
}

async fn new_reservation() -> HttpResponse {
    reservation_form(
        StatusCode::OK,
        "حجز جديد",
        "/admin/reservations".to_string(),
        ReservationInput::default(),
        Vec::new(),
    )
}

async fn create_reservation(
    state: web::Data<AppState>,
    form: web::Form<ReservationInput>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let reservation = match form.validate() {
        Ok(reservation) => reservation,
        Err(errors) => {
            return Ok(reservation_form(
                StatusCode::UNPROCESSABLE_ENTITY,
                "حجز جديد",
                "/admin/reservations".to_string(),
                form,
                errors,
            ))
        }
    };

    let row = reservations::create(&state.db, &reservation).await?;
    log::info!("Created reservation {} for {}", row.id, row.date);
    Ok(see_other("/admin/reservations"))
}

async fn edit_reservation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let row = reservations::fetch(&state.db, &path.into_inner()).await?;
    Ok(reservation_form(
        StatusCode::OK,
        "تعديل الحجز",
        format!("/admin/reservations/{}", row.id),
        ReservationInput::from(&row),
        Vec::new(),
    ))
}

async fn update_reservation(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ReservationInput>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let reservation = match form.validate() {
        Ok(reservation) => reservation,
        Err(errors) => {
            return Ok(reservation_form(
                StatusCode::UNPROCESSABLE_ENTITY,
                "تعديل الحجز",
                format!("/admin/reservations/{id}"),
                form,
                errors,
            ))
        }
    };

    reservations::update(&state.db, &id, &reservation).await?;
    Ok(see_other("/admin/reservations"))
}

async fn delete_reservation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    reservations::delete(&state.db, &path.into_inner()).await?;
    Ok(see_other("/admin/reservations"))
}

async fn list_appointments(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let appointments = appointments::list(&state.db).await?;
    Ok(render(AdminAppointmentsTemplate {
        appointments: appointments.into_iter().map(AppointmentView::from).collect(),
    }))
}

async fn delete_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let removed = appointments::delete(&state.db, &id).await?;
    log::info!("Deleted appointment {id} and {removed} notification(s)");
    notifications::publish(&state, "appointment_deleted", None).await;
    Ok(see_other("/admin/appointments"))
}

async fn notification_feed(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let feed = notifications::snapshot(&state.db, state.config.notification_feed_limit).await?;
    Ok(HttpResponse::Ok().json(feed))
}

async fn mark_notification(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    notifications::mark_read(&state.db, &id).await?;
    notifications::publish(&state, "notification_read", Some(id)).await;
    notification_feed(state).await
}

async fn mark_all_notifications(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let updated = notifications::mark_all_read(&state.db).await?;
    if updated > 0 {
        notifications::publish(&state, "notifications_read", None).await;
    }
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

async fn subscribe_push(
    state: web::Data<AppState>,
    payload: web::Json<PushSubscriptionInput>,
    auth: web::ReqData<AuthUser>,
) -> AppResult<HttpResponse> {
    let subscription = payload.into_inner();
    if subscription.endpoint.trim().is_empty() {
        return Err(AppError::validation("Missing push endpoint."));
    }
    push::store_subscription(&state.db, &auth.id, &subscription).await?;
    log::info!("Stored push subscription for {}", auth.username);
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn list_feedback(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let entries = feedback::list_all(&state.db).await?;
    Ok(render(AdminFeedbackTemplate {
        entries: entries.into_iter().map(FeedbackView::from).collect(),
    }))
}

async fn toggle_feedback(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let flag = feedback::toggle_publish(&state.db, &path.into_inner()).await?;
    log::info!("Feedback publish flag is now {}", flag.as_str());
    Ok(see_other("/admin/feedback"))
}

async fn delete_feedback(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    feedback::delete(&state.db, &path.into_inner()).await?;
    Ok(see_other("/admin/feedback"))
}

async fn media_page_with(
    state: &AppState,
    status: StatusCode,
    error: String,
) -> AppResult<HttpResponse> {
    let videos = media::list_items(&state.db, MediaKind::Video).await?;
    let images = media::list_items(&state.db, MediaKind::Image).await?;
    let profile_images = media::list_items(&state.db, MediaKind::ProfileImage).await?;
    let profile_slots = (media::PROFILE_IMAGE_LIMIT - profile_images.len() as i64).max(0);

    Ok(render_with_status(
        status,
        AdminMediaTemplate {
            videos: videos.into_iter().map(MediaView::from).collect(),
            images: images.into_iter().map(MediaView::from).collect(),
            profile_images: profile_images.into_iter().map(MediaView::from).collect(),
            profile_slots,
            error,
        },
    ))
}

async fn media_page(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    media_page_with(&state, StatusCode::OK, String::new()).await
}

async fn add_gallery_image(
    state: web::Data<AppState>,
    payload: web::Json<ImagePayload>,
) -> AppResult<HttpResponse> {
    let item = media::record_gallery_image(&state.db, &payload.data_url).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": item.id })))
}

async fn add_profile_images(
    state: web::Data<AppState>,
    payload: web::Json<ProfileImagesPayload>,
) -> AppResult<HttpResponse> {
    let items = media::record_profile_images(&state.db, &payload.images).await?;
    let ids: Vec<String> = items.into_iter().map(|item| item.id).collect();
    Ok(HttpResponse::Ok().json(json!({ "ids": ids })))
}

async fn add_hosted_video(
    state: web::Data<AppState>,
    form: web::Form<HostedVideoForm>,
) -> AppResult<HttpResponse> {
    match media::record_hosted_video(&state.db, &form.url).await {
        Ok(_) => Ok(see_other("/admin/media")),
        Err(AppError::Validation(message)) => {
            media_page_with(&state, StatusCode::UNPROCESSABLE_ENTITY, message).await
        }
        Err(err) => Err(err),
    }
}

async fn delete_media(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let item = media::delete_item(&state.db, &path.into_inner()).await?;
    if let Some(filename) = media::local_filename(&item) {
        match media::delete_file(&state.config.upload_dir, filename).await {
            Ok(()) | Err(AppError::NotFound(_)) => {}
            Err(err) => log::warn!("Could not remove {filename}: {err}"),
        }
    }
    Ok(see_other("/admin/media"))
}

fn settings_page(auth: &AuthUser, status: StatusCode, error: String, success: String) -> HttpResponse {
    render_with_status(
        status,
        AdminSettingsTemplate {
            username: auth.username.clone(),
            min_password_len: MIN_PASSWORD_LEN,
            error,
            success,
        },
    )
}

async fn settings(auth: web::ReqData<AuthUser>) -> HttpResponse {
    settings_page(&auth, StatusCode::OK, String::new(), String::new())
}

async fn update_password(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<PasswordForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    if form.new_password != form.confirm_password {
        return Ok(settings_page(
            &auth,
            StatusCode::UNPROCESSABLE_ENTITY,
            "كلمتا المرور غير متطابقتين".to_string(),
            String::new(),
        ));
    }

    match change_password(&state.db, &auth, &form.current_password, &form.new_password).await {
        Ok(()) => Ok(settings_page(
            &auth,
            StatusCode::OK,
            String::new(),
            "تم تغيير كلمة المرور".to_string(),
        )),
        Err(AppError::Validation(message)) => Ok(settings_page(
            &auth,
            StatusCode::UNPROCESSABLE_ENTITY,
            message,
            String::new(),
        )),
        Err(err) => Err(err),
    }
}
