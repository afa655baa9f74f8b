use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::{restrict_to, CurrentUser},
    error::{ApiError, ApiResult, Envelope},
    query::{project_default, QuerySpec},
    state::AppState,
    tours::{
        dto::{NewTour, TourPatch, TOUR_FIELDS},
        repo::Tour,
    },
    users::repo::Role,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route("/tours/top-5-cheap", get(top_tours))
        .route(
            "/tours/:id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

async fn run_list(state: &AppState, params: &HashMap<String, String>) -> ApiResult<Vec<Value>> {
    let spec = QuerySpec::parse(params, &TOUR_FIELDS, "price")?;
    let tours = Tour::list(&state.db, &spec).await?;
    spec.project_rows(&tours, &TOUR_FIELDS)
}

#[instrument(skip(state))]
pub async fn list_tours(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Envelope<Vec<Value>>>> {
    let data = run_list(&state, &params).await?;
    Ok(Json(Envelope::data(data)))
}

/// Alias listing: the preset overrides whatever the caller sent.
#[instrument(skip(state))]
pub async fn top_tours(
    State(state): State<AppState>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Envelope<Vec<Value>>>> {
    params.insert("limit".into(), "5".into());
    params.insert("sort".into(), "price,-ratingAverage".into());
    params.insert("fields".into(), "name,price,ratingAverage,summary".into());
    let data = run_list(&state, &params).await?;
    Ok(Json(Envelope::data(data)))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Value>>> {
    let tour = Tour::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    Ok(Json(Envelope::data(project_default(&tour, &TOUR_FIELDS)?)))
}

#[instrument(skip(state, user, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<NewTour>,
) -> ApiResult<(StatusCode, Json<Envelope<Value>>)> {
    restrict_to(&user, &[Role::Admin, Role::LeadGuide])?;
    let tour = Tour::create(&state.db, &payload).await?;
    info!(tour_id = %tour.id, name = %tour.name, "tour created");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(project_default(&tour, &TOUR_FIELDS)?)),
    ))
}

#[instrument(skip(state, user, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TourPatch>,
) -> ApiResult<Json<Envelope<Value>>> {
    restrict_to(&user, &[Role::Admin, Role::LeadGuide])?;
    let tour = Tour::update(&state.db, id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("No tour found with that ID".into()))?;
    info!(tour_id = %tour.id, "tour updated");
    Ok(Json(Envelope::data(project_default(&tour, &TOUR_FIELDS)?)))
}

#[instrument(skip(state, user))]
pub async fn delete_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    restrict_to(&user, &[Role::Admin, Role::LeadGuide])?;
    if !Tour::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("No tour found with that ID".into()));
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
