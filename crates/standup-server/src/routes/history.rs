use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use standup_core::archive::{History, StatsRow, StatusRow};
use standup_core::types::StatusCategory;

use crate::error::AppError;
use crate::state::{lock_archive, AppState};

/// History payload shared by the per-member and full history endpoints.
/// `states` maps the archived `state` column to its category key.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(rename = "statsID")]
    pub stats_id: Vec<StatsRow>,
    pub statuses: Vec<StatusRow>,
    pub states: BTreeMap<i64, &'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

impl HistoryResponse {
    fn new(history: History, members: Option<Vec<String>>) -> Self {
        Self {
            stats_id: history.stats,
            statuses: history.statuses,
            states: StatusCategory::all()
                .iter()
                .map(|c| (c.index(), c.as_str()))
                .collect(),
            members,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub irc_nick: String,
}

async fn load_history(app: &AppState, member: Option<String>) -> Result<History, AppError> {
    let archive = app.archive.clone();
    let history = tokio::task::spawn_blocking(move || {
        lock_archive(&archive).history(member.as_deref())
    })
    .await
    .map_err(AppError::join)??;
    Ok(history)
}

/// POST /api/user: one member's submission history.
pub async fn member_history(
    State(app): State<AppState>,
    Json(query): Json<MemberQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let member = query.irc_nick.trim().to_string();
    standup_core::paths::validate_member(&member)?;
    let history = load_history(&app, Some(member)).await?;
    Ok(Json(HistoryResponse::new(history, None)))
}

/// GET /api/historical: every archived submission plus the member list.
pub async fn full_history(
    State(app): State<AppState>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = load_history(&app, None).await?;
    Ok(Json(HistoryResponse::new(
        history,
        Some(app.config.members.clone()),
    )))
}

/// GET /api/status/{id}: status lines of one submission.
pub async fn submission_statuses(
    State(app): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StatusRow>>, AppError> {
    let archive = app.archive.clone();
    let rows = tokio::task::spawn_blocking(move || lock_archive(&archive).statuses_for(id))
        .await
        .map_err(AppError::join)??;
    if rows.is_empty() {
        return Err(AppError::not_found(format!("no status lines for submission {id}")));
    }
    Ok(Json(rows))
}
