use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use sqlx::SqlitePool;
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    auth::new_id,
    db::now_timestamp,
    error::{AppError, AppResult},
    models::{MediaItemRow, MediaKind, MediaStorage},
};

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "wmv"];
pub const PROFILE_IMAGE_LIMIT: i64 = 3;
const MAX_NAME_ATTEMPTS: u32 = 16;

pub fn is_video_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Keeps only the final path component of a client-supplied name and
/// replaces anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn stored_filename(original: &str, millis: i64) -> String {
    format!("{millis}-{}", sanitize_filename(original))
}

/// Path parameters must name a single file inside the upload directory.
pub fn validate_path_filename(name: &str) -> AppResult<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(AppError::validation("Invalid filename."));
    }
    Ok(name)
}

pub fn file_url(base: &str, filename: &str) -> String {
    format!("{}/uploads/{}", base.trim_end_matches('/'), filename)
}

/// Streams one upload to disk, enforcing the byte cap as chunks arrive.
pub struct UploadSink {
    path: PathBuf,
    filename: String,
    file: fs::File,
    written: usize,
    max_bytes: usize,
}

impl UploadSink {
    pub async fn create(dir: &Path, original_name: &str, max_bytes: usize) -> AppResult<Self> {
        let millis = chrono::Utc::now().timestamp_millis();
        Self::create_at(dir, original_name, max_bytes, millis).await
    }

    /// Never truncates an existing upload: a name that is already taken
    /// gets a numeric suffix after the timestamp.
    async fn create_at(
        dir: &Path,
        original_name: &str,
        max_bytes: usize,
        millis: i64,
    ) -> AppResult<Self> {
        fs::create_dir_all(dir).await?;
        let base = stored_filename(original_name, millis);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = if attempt == 0 {
                base.clone()
            } else {
                format!("{millis}-{attempt}-{}", sanitize_filename(original_name))
            };
            let path = dir.join(&filename);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(Self {
                        path,
                        filename,
                        file,
                        written: 0,
                        max_bytes,
                    })
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Internal(format!(
            "No free upload name for {base} after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    pub async fn write(&mut self, chunk: &[u8]) -> AppResult<()> {
        self.written += chunk.len();
        if self.written > self.max_bytes {
            return Err(AppError::PayloadTooLarge(self.max_bytes));
        }
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> AppResult<String> {
        self.file.flush().await?;
        log::info!("Stored upload {} ({} bytes)", self.filename, self.written);
        Ok(self.filename)
    }

    pub async fn abort(self) {
        drop(self.file);
        if let Err(err) = fs::remove_file(&self.path).await {
            log::warn!("Could not remove partial upload {}: {err}", self.path.display());
        }
    }
}

pub async fn list_video_files(dir: &Path) -> AppResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_video_file(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub async fn delete_file(dir: &Path, filename: &str) -> AppResult<()> {
    let filename = validate_path_filename(filename)?;
    match fs::remove_file(dir.join(filename)).await {
        Ok(()) => {
            log::info!("Deleted upload {filename}");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::not_found("File not found"))
        }
        Err(err) => Err(err.into()),
    }
}

/// Accepts `data:image/<type>;base64,<payload>` and checks the payload decodes.
pub fn validate_image_data_url(data_url: &str) -> AppResult<()> {
    let invalid = || AppError::validation("Expected a base64 image data URL.");
    let rest = data_url.trim().strip_prefix("data:image/").ok_or_else(invalid)?;
    let (media_type, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;
    if media_type.is_empty() || payload.is_empty() {
        return Err(invalid());
    }
    general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| invalid())?;
    Ok(())
}

pub fn validate_hosted_url(url: &str) -> AppResult<&str> {
    let url = url.trim();
    match url.strip_prefix("https://") {
        Some(rest) if !rest.is_empty() && !rest.contains(char::is_whitespace) => Ok(url),
        _ => Err(AppError::validation("Hosted media must use an https:// URL.")),
    }
}

const SELECT_MEDIA: &str =
    "SELECT id, kind, storage, url, original_name, inline_data, created_at FROM media_items";

async fn insert_item<'c, E>(
    executor: E,
    kind: MediaKind,
    storage: MediaStorage,
    url: Option<&str>,
    original_name: Option<&str>,
    inline_data: Option<&str>,
) -> AppResult<MediaItemRow>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    let row = MediaItemRow {
        id: new_id(),
        kind: kind.as_str().to_string(),
        storage: storage.as_str().to_string(),
        url: url.map(str::to_string),
        original_name: original_name.map(str::to_string),
        inline_data: inline_data.map(str::to_string),
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"INSERT INTO media_items (id, kind, storage, url, original_name, inline_data, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.kind)
    .bind(&row.storage)
    .bind(&row.url)
    .bind(&row.original_name)
    .bind(&row.inline_data)
    .bind(&row.created_at)
    .execute(executor)
    .await?;

    Ok(row)
}

pub async fn record_local_video(
    pool: &SqlitePool,
    url: &str,
    original_name: &str,
) -> AppResult<MediaItemRow> {
    insert_item(
        pool,
        MediaKind::Video,
        MediaStorage::Local,
        Some(url),
        Some(original_name),
        None,
    )
    .await
}

pub async fn record_hosted_video(pool: &SqlitePool, url: &str) -> AppResult<MediaItemRow> {
    let url = validate_hosted_url(url)?;
    insert_item(pool, MediaKind::Video, MediaStorage::Hosted, Some(url), None, None).await
}

pub async fn record_gallery_image(pool: &SqlitePool, data_url: &str) -> AppResult<MediaItemRow> {
    validate_image_data_url(data_url)?;
    insert_item(
        pool,
        MediaKind::Image,
        MediaStorage::Inline,
        None,
        None,
        Some(data_url.trim()),
    )
    .await
}

/// Adds all images or none; the total may not exceed the profile cap.
pub async fn record_profile_images(
    pool: &SqlitePool,
    data_urls: &[String],
) -> AppResult<Vec<MediaItemRow>> {
    if data_urls.is_empty() {
        return Err(AppError::validation("No images selected."));
    }
    for data_url in data_urls {
        validate_image_data_url(data_url)?;
    }

    let mut tx = pool.begin().await?;
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM media_items WHERE kind = ?")
        .bind(MediaKind::ProfileImage.as_str())
        .fetch_one(&mut *tx)
        .await?;
    if existing + data_urls.len() as i64 > PROFILE_IMAGE_LIMIT {
        return Err(AppError::validation(format!(
            "لا يمكن رفع أكثر من {PROFILE_IMAGE_LIMIT} صور"
        )));
    }

    let mut rows = Vec::with_capacity(data_urls.len());
    for data_url in data_urls {
        rows.push(
            insert_item(
                &mut *tx,
                MediaKind::ProfileImage,
                MediaStorage::Inline,
                None,
                None,
                Some(data_url.trim()),
            )
            .await?,
        );
    }
    tx.commit().await?;
    Ok(rows)
}

pub async fn list_items(pool: &SqlitePool, kind: MediaKind) -> AppResult<Vec<MediaItemRow>> {
    Ok(sqlx::query_as::<_, MediaItemRow>(&format!(
        "{SELECT_MEDIA} WHERE kind = ? ORDER BY created_at DESC"
    ))
    .bind(kind.as_str())
    .fetch_all(pool)
    .await?)
}

pub async fn list_local_videos(pool: &SqlitePool) -> AppResult<Vec<MediaItemRow>> {
    Ok(sqlx::query_as::<_, MediaItemRow>(&format!(
        "{SELECT_MEDIA} WHERE kind = ? AND storage = ? ORDER BY created_at DESC"
    ))
    .bind(MediaKind::Video.as_str())
    .bind(MediaStorage::Local.as_str())
    .fetch_all(pool)
    .await?)
}

pub async fn delete_item(pool: &SqlitePool, id: &str) -> AppResult<MediaItemRow> {
    sqlx::query_as::<_, MediaItemRow>(
        r#"DELETE FROM media_items WHERE id = ?
           RETURNING id, kind, storage, url, original_name, inline_data, created_at"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Item not found"))
}

/// File name behind a locally stored item, if it has one.
pub fn local_filename(item: &MediaItemRow) -> Option<&str> {
    if item.storage != MediaStorage::Local.as_str() {
        return None;
    }
    item.url
        .as_deref()
        .and_then(|url| url.rsplit('/').next())
        .filter(|name| validate_path_filename(name).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn recognizes_video_extensions() {
        assert!(is_video_file("clip.MP4"));
        assert!(is_video_file("1700000000000-first dance.mov"));
        assert!(!is_video_file("poster.jpg"));
        assert!(!is_video_file("mp4"));
    }

    #[test]
    fn sanitizes_client_names() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\clips\\first dance.mp4"), "first_dance.mp4");
        assert_eq!(sanitize_filename(".hidden.mp4"), "hidden.mp4");
        assert_eq!(sanitize_filename(""), "video");
        assert_eq!(stored_filename("a b.mp4", 42), "42-a_b.mp4");
    }

    #[test]
    fn rejects_traversal_in_path_parameters() {
        assert!(validate_path_filename("42-clip.mp4").is_ok());
        for bad in ["", ".", "..", "../x.mp4", "a/b.mp4", "a\\b.mp4"] {
            assert!(validate_path_filename(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn validates_data_urls_and_hosted_urls() {
        assert!(validate_image_data_url(PIXEL).is_ok());
        assert!(validate_image_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(validate_image_data_url("data:image/png;base64,@@@").is_err());
        assert!(validate_hosted_url("https://res.example.com/v/clip.mp4").is_ok());
        assert!(validate_hosted_url("http://res.example.com/v/clip.mp4").is_err());
        assert!(validate_hosted_url("https://").is_err());
    }

    #[actix_web::test]
    async fn sink_enforces_cap_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();

        let mut sink = UploadSink::create(dir.path(), "ok.mp4", 8).await.unwrap();
        sink.write(b"1234").await.unwrap();
        sink.write(b"5678").await.unwrap();
        let name = sink.finish().await.unwrap();
        assert!(name.ends_with("-ok.mp4"));
        assert_eq!(list_video_files(dir.path()).await.unwrap(), vec![name.clone()]);

        let mut big = UploadSink::create(dir.path(), "big.mp4", 4).await.unwrap();
        let err = big.write(b"12345").await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(4)));
        big.abort().await;
        assert_eq!(list_video_files(dir.path()).await.unwrap().len(), 1);

        delete_file(dir.path(), &name).await.unwrap();
        assert!(matches!(
            delete_file(dir.path(), &name).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn same_name_in_same_millisecond_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = UploadSink::create_at(dir.path(), "vows.mp4", 64, 7).await.unwrap();
        first.write(b"first").await.unwrap();
        let first_name = first.finish().await.unwrap();

        let mut second = UploadSink::create_at(dir.path(), "vows.mp4", 64, 7).await.unwrap();
        second.write(b"second").await.unwrap();
        let second_name = second.finish().await.unwrap();

        assert_eq!(first_name, "7-vows.mp4");
        assert_eq!(second_name, "7-1-vows.mp4");
        assert_eq!(std::fs::read(dir.path().join(&first_name)).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join(&second_name)).unwrap(), b"second");
    }

    #[actix_web::test]
    async fn missing_upload_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let names = list_video_files(&dir.path().join("absent")).await.unwrap();
        assert!(names.is_empty());
    }

    #[actix_web::test]
    async fn profile_images_are_capped_at_three() {
        let pool = test_pool().await;
        let two = vec![PIXEL.to_string(), PIXEL.to_string()];
        assert_eq!(record_profile_images(&pool, &two).await.unwrap().len(), 2);

        let err = record_profile_images(&pool, &two).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(list_items(&pool, MediaKind::ProfileImage).await.unwrap().len(), 2);

        record_profile_images(&pool, &[PIXEL.to_string()]).await.unwrap();
        assert_eq!(list_items(&pool, MediaKind::ProfileImage).await.unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn items_keep_their_storage_strategy() {
        let pool = test_pool().await;
        let local = record_local_video(&pool, "http://host/uploads/1-a.mp4", "a.mp4")
            .await
            .unwrap();
        record_hosted_video(&pool, "https://cdn.example.com/b.mp4")
            .await
            .unwrap();
        let image = record_gallery_image(&pool, PIXEL).await.unwrap();

        assert_eq!(list_items(&pool, MediaKind::Video).await.unwrap().len(), 2);
        assert_eq!(list_local_videos(&pool).await.unwrap().len(), 1);
        assert_eq!(image.src(), PIXEL);
        assert_eq!(local_filename(&local), Some("1-a.mp4"));
        assert_eq!(local_filename(&image), None);

        let removed = delete_item(&pool, &local.id).await.unwrap();
        assert_eq!(removed.id, local.id);
        assert!(matches!(
            delete_item(&pool, &local.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
