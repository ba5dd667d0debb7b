use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::json;

use crate::{
    auth::admin_validator,
    error::{AppError, AppResult},
    media::{self, UploadSink},
    models::MediaItemRow,
    routes::public_base,
    state::AppState,
};

const VIDEO_FIELD: &str = "video";

#[derive(Serialize)]
struct VideoFile {
    name: String,
    url: String,
}

#[derive(Serialize)]
struct ItemResponse {
    #[serde(flatten)]
    item: MediaItemRow,
    #[serde(rename = "videoUrl")]
    video_url: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/upload")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::post().to(upload)),
    )
    .service(web::resource("/videos").route(web::get().to(list_videos)))
    .service(
        web::resource("/videos/{filename}")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::delete().to(delete_video)),
    )
    .service(
        web::resource("/api/upload-video")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::post().to(upload_item)),
    )
    .service(web::resource("/api/items").route(web::get().to(list_items)))
    .service(
        web::resource("/api/items/{id}")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::delete().to(delete_item)),
    )
    .service(
        web::resource("/api/delete-video/{filename}")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::delete().to(delete_video)),
    );
}

fn malformed(err: MultipartError) -> AppError {
    AppError::validation(format!("Malformed upload: {err}"))
}

/// Stores the first `video` field and returns (stored name, client name).
/// Other fields are skipped.
async fn receive_video(state: &AppState, mut payload: Multipart) -> AppResult<(String, String)> {
    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let (name, original) = {
            let disposition = field.content_disposition();
            (
                disposition.get_name().map(str::to_string),
                disposition.get_filename().map(str::to_string),
            )
        };
        if name.as_deref() != Some(VIDEO_FIELD) {
            while field.try_next().await.map_err(malformed)?.is_some() {}
            continue;
        }

        let original = original.unwrap_or_else(|| "video".to_string());
        let mut sink = UploadSink::create(
            &state.config.upload_dir,
            &original,
            state.config.max_upload_bytes,
        )
        .await?;

        loop {
            match field.try_next().await {
                Ok(Some(chunk)) => {
                    if let Err(err) = sink.write(&chunk).await {
                        log::warn!("Rejected upload {original}: {err}");
                        sink.abort().await;
                        return Err(err);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    sink.abort().await;
                    return Err(malformed(err));
                }
            }
        }

        let filename = sink.finish().await?;
        return Ok((filename, original));
    }

    log::error!("No file uploaded");
    Err(AppError::validation("No file uploaded."))
}

async fn upload(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let (filename, _) = receive_video(&state, payload).await?;
    let url = media::file_url(&public_base(&state, &req), &filename);
    log::info!("File uploaded successfully: {url}");
    Ok(HttpResponse::Ok().json(json!({ "videoUrl": url })))
}

async fn upload_item(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let (filename, original) = receive_video(&state, payload).await?;
    let url = media::file_url(&public_base(&state, &req), &filename);
    let item = match media::record_local_video(&state.db, &url, &original).await {
        Ok(item) => item,
        Err(err) => {
            if let Err(cleanup) = media::delete_file(&state.config.upload_dir, &filename).await {
                log::warn!("Could not remove orphaned upload {filename}: {cleanup}");
            }
            return Err(err);
        }
    };
    Ok(HttpResponse::Ok().json(ItemResponse {
        item,
        video_url: url,
    }))
}

async fn list_videos(state: web::Data<AppState>, req: HttpRequest) -> AppResult<HttpResponse> {
    let base = public_base(&state, &req);
    let videos: Vec<VideoFile> = media::list_video_files(&state.config.upload_dir)
        .await?
        .into_iter()
        .map(|name| VideoFile {
            url: media::file_url(&base, &name),
            name,
        })
        .collect();
    Ok(HttpResponse::Ok().json(videos))
}

async fn delete_video(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    media::delete_file(&state.config.upload_dir, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "File deleted successfully" })))
}

async fn list_items(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let items: Vec<ItemResponse> = media::list_local_videos(&state.db)
        .await?
        .into_iter()
        .map(|item| ItemResponse {
            video_url: item.url.clone().unwrap_or_default(),
            item,
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

async fn delete_item(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let item = media::delete_item(&state.db, &path.into_inner()).await?;
    log::info!("Deleted media item {}", item.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Item deleted successfully" })))
}
