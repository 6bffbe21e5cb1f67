//! Request handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::api::{ApiResponse, AppState};
use crate::domain::{CampaignId, IssueId, SubjectId};
use crate::errors::Error;
use crate::repository::SubscriptionWriter;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// GET /api/health
pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok("ok"))
}

/// GET /api/cron/daily/{subject_id}
pub async fn run_daily(
    State(state): State<AppState>,
    path: Result<Path<SubjectId>, PathRejection>,
) -> Result<Json<ApiResponse>, Error> {
    let Path(subject_id) = path?;
    let report = state.dispatcher.run_daily(subject_id).await?;
    let message = format!(
        "Sent sequence {} of subject {} to {} subscriber(s)",
        report.sequence, subject_id, report.summary.total_sent
    );
    Ok(Json(ApiResponse::with_data(message, &report)))
}

/// GET /api/cron/issues/{issue_id}/send
pub async fn send_issue(
    State(state): State<AppState>,
    path: Result<Path<IssueId>, PathRejection>,
) -> Result<Json<ApiResponse>, Error> {
    let Path(issue_id) = path?;
    let summary = state.dispatcher.send_issue(issue_id).await?;
    let message = format!(
        "Issue {issue_id}: {} sent, {} failed",
        summary.total_sent, summary.total_failed
    );
    Ok(Json(ApiResponse::with_data(message, &summary)))
}

/// GET /api/cron/campaigns/{campaign_id}/send
pub async fn send_campaign(
    State(state): State<AppState>,
    path: Result<Path<CampaignId>, PathRejection>,
) -> Result<Json<ApiResponse>, Error> {
    let Path(campaign_id) = path?;
    let summary = state.dispatcher.send_campaign(campaign_id).await?;
    let message = format!(
        "Campaign {campaign_id}: {} sent, {} failed",
        summary.total_sent, summary.total_failed
    );
    Ok(Json(ApiResponse::with_data(message, &summary)))
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub token: String,
}

/// GET and POST /api/unsubscribe?token=..
///
/// POST is the RFC 8058 one-click variant mail clients call directly.
pub async fn unsubscribe(
    State(state): State<AppState>,
    query: Result<Query<UnsubscribeQuery>, QueryRejection>,
) -> Result<Json<ApiResponse>, Error> {
    let Query(query) = query?;
    let (user_id, scope) = state.links.verify(&query.token)?;
    let deactivated = state
        .dispatcher
        .repo()
        .deactivate_subscriptions(user_id, scope.subject_id())?;

    log::info!("user#{user_id} unsubscribed ({scope:?}), {deactivated} subscription(s) changed");

    Ok(Json(ApiResponse::with_data(
        "You have been unsubscribed",
        &json!({ "userId": user_id, "deactivated": deactivated }),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub email: String,
    pub subject_id: SubjectId,
    pub name: Option<String>,
}

/// POST /api/subscriptions
pub async fn subscribe(
    State(state): State<AppState>,
    request: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse>), Error> {
    let Json(request) = request?;
    let email = request.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(Error::BadRequest(format!("invalid email address: {email}")));
    }
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let user_id = state
        .dispatcher
        .repo()
        .subscribe(&email, name, request.subject_id)?;

    log::info!("user#{user_id} subscribed to subject#{}", request.subject_id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data(
            "Subscribed",
            &json!({ "userId": user_id, "subjectId": request.subject_id }),
        )),
    ))
}
