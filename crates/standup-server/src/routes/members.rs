use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/user: configured members.
pub async fn list_members(State(app): State<AppState>) -> Json<Vec<String>> {
    Json(app.config.members.clone())
}

#[derive(Debug, Serialize)]
pub struct MissingResponse {
    pub members: Vec<String>,
    pub submitted: Vec<String>,
    pub missing: Vec<String>,
}

/// GET /api/missing: who has and has not submitted this cycle.
pub async fn missing_members(
    State(app): State<AppState>,
) -> Result<Json<MissingResponse>, AppError> {
    let store = app.store.clone();
    let members = app.config.members.clone();
    let response = tokio::task::spawn_blocking(move || {
        let submitted = store.submitted()?;
        let missing = store.missing_members(&members)?;
        Ok::<_, standup_core::StandupError>(MissingResponse {
            members,
            submitted: submitted.into_iter().collect(),
            missing,
        })
    })
    .await
    .map_err(AppError::join)??;
    Ok(Json(response))
}
