use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;

use crate::application::error::ErrorReport;
use crate::application::repos::RecentQuery;
use crate::domain::entities::{GroupRecord, ListEntry};

use super::ApiState;
use super::error::ApiError;
use super::models::{
    DEFAULT_LIST_LIMIT, DEFAULT_SIMILAR_LIMIT, LimitQuery, ListResponse, MaxIdResponse,
    PingResponse, RealtimeQueryParams, RecentQueryParams, resolve_cursor, resolve_limit,
    resolve_realtime, split_search_terms,
};

fn parse_group_id(raw: &str) -> Result<u64, ApiError> {
    raw.trim().parse::<u64>().map_err(|err| {
        ApiError::bad_request(
            "Invalid group id",
            Some(format!("`{raw}` is not a valid group id: {err}")),
        )
    })
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

pub async fn max_id(State(state): State<ApiState>) -> Result<Json<MaxIdResponse>, ApiError> {
    let max = state.groups.max_id().await?;
    Ok(Json(MaxIdResponse { max }))
}

pub async fn list_recent(
    State(state): State<ApiState>,
    Query(params): Query<RecentQueryParams>,
) -> Result<Json<ListResponse<ListEntry>>, ApiError> {
    let before = resolve_cursor(params.date.as_deref(), OffsetDateTime::now_utc());
    let limit = resolve_limit(params.limit.as_deref(), DEFAULT_LIST_LIMIT);
    let query = RecentQuery::new(before, limit).with_search(split_search_terms(params.q.as_deref()));

    let items = state.groups.list_recent(&query).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn list_top(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<ListResponse<ListEntry>>, ApiError> {
    let limit = resolve_limit(params.limit.as_deref(), DEFAULT_LIST_LIMIT);
    let items = state.groups.list_top_by_engagement(limit).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn list_realtime(
    State(state): State<ApiState>,
    Query(params): Query<RealtimeQueryParams>,
) -> Result<Json<ListResponse<ListEntry>>, ApiError> {
    let limit = resolve_limit(params.limit.as_deref(), DEFAULT_LIST_LIMIT);
    let realtime = resolve_realtime(params.rt.as_deref());
    let items = state.groups.list_by_realtime_flag(limit, realtime).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn list_similar(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<ListResponse<ListEntry>>, ApiError> {
    let id = parse_group_id(&raw_id)?;
    let limit = resolve_limit(params.limit.as_deref(), DEFAULT_SIMILAR_LIMIT);
    let items = state.groups.list_similar(id, limit).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn get_detail(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
) -> Result<Json<GroupRecord>, ApiError> {
    let id = parse_group_id(&raw_id)?;
    let group = state.groups.get_detail(id).await?;
    Ok(Json(group))
}

pub async fn db_health(State(state): State<ApiState>) -> Response {
    match state.groups.health().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
