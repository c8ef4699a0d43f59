use axum::extract::State;
use axum::response::Html;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use standup_bot::DeliveryFailure;
use standup_core::report::Submission;

use crate::error::AppError;
use crate::state::{lock_archive, AppState};

/// Fields posted by the standup web form. The JSON endpoint accepts the same
/// names.
#[derive(Debug, Deserialize)]
pub struct SubmissionForm {
    #[serde(alias = "member")]
    pub irc_nick: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub completed: String,
    #[serde(default, alias = "in_progress")]
    pub inprogress: String,
    #[serde(default)]
    pub impediments: String,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub member: String,
    pub stats_id: i64,
    pub message: String,
    pub delivered: Vec<String>,
    pub failed: Vec<DeliveryFailure>,
}

/// Render the standup, publish it, then record the presence marker and the
/// archive rows. Delivery failures are reported, not fatal: the member has
/// still submitted.
async fn accept(app: &AppState, form: SubmissionForm) -> Result<Accepted, AppError> {
    let submission = Submission::from_text(
        &form.irc_nick,
        Some(&form.area),
        &form.completed,
        &form.inprogress,
        &form.impediments,
    )?;
    let message = submission.render(app.config.report.line_width);

    let delivery = app.notifier.publish(&message).await;

    let store = app.store.clone();
    let archive = app.archive.clone();
    let rendered = message.clone();
    let (member, stats_id) = tokio::task::spawn_blocking(move || {
        store.record_submission(&submission.member, &rendered)?;
        let stats_id = lock_archive(&archive).record(&submission)?;
        Ok::<_, standup_core::StandupError>((submission.member, stats_id))
    })
    .await
    .map_err(AppError::join)??;

    tracing::info!(
        %member,
        stats_id,
        failed = delivery.failed.len(),
        "standup recorded"
    );

    Ok(Accepted {
        member,
        stats_id,
        message,
        delivered: delivery.delivered,
        failed: delivery.failed,
    })
}

/// POST /irc: web form submission; answers with the relayed text.
pub async fn submit_form(
    State(app): State<AppState>,
    Form(form): Form<SubmissionForm>,
) -> Result<Html<String>, AppError> {
    let accepted = accept(&app, form).await?;
    Ok(Html(format!(
        "<pre>\n{}\n</pre>",
        escape_html(&accepted.message)
    )))
}

/// POST /api/submissions: JSON submission.
pub async fn submit_json(
    State(app): State<AppState>,
    Json(form): Json<SubmissionForm>,
) -> Result<Json<Accepted>, AppError> {
    Ok(Json(accept(&app, form).await?))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
