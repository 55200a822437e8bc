mod error;
mod relay;
mod routes;
mod state;
mod utils {
    pub mod sweep;
}

use axum::{Extension, Router};
use tower_http::services::ServeDir;

use crate::state::RoomMap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let rooms = RoomMap::default();
    tokio::spawn(utils::sweep::task(rooms.clone()));

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".into());
    let app = Router::new()
        .merge(routes::router())
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(rooms));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "relay listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
