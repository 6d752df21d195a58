use actix_web::{web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use volley::api::{self, AppState};
use volley::events::ProgressPublisher;
use volley::session::SessionRegistry;
use volley::storage::Storage;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("VOLLEY_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let data_dir = std::env::var("VOLLEY_DATA_DIR").unwrap_or_else(|_| ".".to_string());

    let state = web::Data::new(AppState {
        registry: SessionRegistry::new(),
        publisher: ProgressPublisher::default(),
        storage: Storage::new(data_dir),
    });

    tracing::info!("volley listening on http://{addr} (progress stream at ws://{addr}/ws)");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::routes)
    })
    .bind(&addr)?
    .run()
    .await
}
