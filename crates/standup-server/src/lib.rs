pub mod error;
pub mod routes;
pub mod state;

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Submissions
        .route("/irc", post(routes::submit::submit_form))
        .route("/api/submissions", post(routes::submit::submit_json))
        // Members
        .route(
            "/api/user",
            get(routes::members::list_members).post(routes::history::member_history),
        )
        .route("/api/missing", get(routes::members::missing_members))
        // History
        .route("/api/historical", get(routes::history::full_history))
        .route(
            "/api/status/{id}",
            get(routes::history::submission_statuses),
        );

    if let Some(dir) = &app_state.config.server.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve on a pre-bound listener until `shutdown` resolves.
///
/// Taking a bound listener lets the caller read the actual port first (useful
/// when binding port 0).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("standup intake listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
