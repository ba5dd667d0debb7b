use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{UserRow, ROLE_ADMIN},
    state::AppState,
};

pub const AUTH_REALM: &str = "Sobhe";
const LOGOUT_COOKIE: &str = "sobhe_logged_out";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn find_active_user(pool: &SqlitePool, username: &str) -> Option<UserRow> {
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .unwrap_or_else(|err| {
        log::error!("User lookup failed: {err}");
        None
    })
}

pub async fn authenticate_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Option<AuthUser> {
    let user = find_active_user(pool, username).await?;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(AuthUser {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        role: user.role,
    })
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return Err((ErrorUnauthorized("Unauthorized"), req));
    };
    let password = credentials.password().unwrap_or_default();

    match authenticate_credentials(&state.db, credentials.user_id(), password).await {
        Some(user) if user.role == ROLE_ADMIN => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Some(_) => Err((ErrorUnauthorized("Admin access required"), req)),
        None => Err((ErrorUnauthorized("Unauthorized"), req)),
    }
}

pub async fn change_password(
    pool: &SqlitePool,
    user: &AuthUser,
    current_password: &str,
    new_password: &str,
) -> AppResult<()> {
    if new_password.trim().len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    if authenticate_credentials(pool, &user.username, current_password)
        .await
        .is_none()
    {
        return Err(AppError::validation("Current password is incorrect."));
    }

    let password_hash =
        hash_password(new_password).map_err(|err| AppError::Internal(err.to_string()))?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(&user.id)
        .execute(pool)
        .await?;

    log::info!("Password changed for {}", user.username);
    Ok(())
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn build_logout_cookie(req: &HttpRequest, value: &'static str, max_age: Duration) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age);
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    build_logout_cookie(req, "1", Duration::days(365))
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    build_logout_cookie(req, "", Duration::seconds(0))
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let body = r#"<!doctype html>
<html lang="ar" dir="rtl">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>تم تسجيل الخروج</title>
    <link rel="stylesheet" href="/static/site.css" />
  </head>
  <body>
    <main class="card narrow">
      <h1>تم تسجيل الخروج</h1>
      <p><a href="/login?next=/admin/dashboard">تسجيل الدخول مرة أخرى</a> أو <a href="/">العودة إلى الموقع</a>.</p>
    </main>
  </body>
</html>"#;
        let response = HttpResponse::Unauthorized()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .content_type("text/html; charset=utf-8")
            .body(body);
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
