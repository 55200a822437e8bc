use axum::Router;

pub mod api;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .nest("/api", api::router())
        .nest("/ws", ws::router())
}
