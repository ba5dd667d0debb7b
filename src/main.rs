mod appointments;
mod auth;
mod config;
mod dates;
mod db;
mod error;
mod feedback;
mod media;
mod models;
mod notifications;
mod push;
mod reservations;
mod routes;
mod state;
mod templates;

use actix_web::{middleware, web, App, HttpServer};

use crate::{config::Config, state::AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = Config::load();
    db::ensure_sqlite_dir(&config.database_url)?;
    let pool = db::connect(&config.database_url).await?;

    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool).await?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    if !config.push.enabled() {
        log::info!("VAPID keys not set, web push disabled");
    }

    let address = format!("0.0.0.0:{}", config.port);
    let upload_dir = config.upload_dir.clone();
    let state = AppState::new(pool, config);

    log::info!("Starting Sobhe on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::configure(upload_dir.clone()))
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
