use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::{restrict_to, CurrentUser},
        handlers::is_valid_email,
    },
    error::{ApiError, ApiResult, Envelope},
    query::{project_default, QuerySpec},
    state::AppState,
    users::{
        dto::{AdminUpdateUserRequest, UpdateMeRequest, USER_FIELDS},
        repo::{Role, User},
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
        .route(
            "/users/:id",
            get(get_user).patch(admin_update_user).delete(admin_delete_user),
        )
}

#[instrument(skip(state, user))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Envelope<Vec<Value>>>> {
    restrict_to(&user, &[Role::Admin])?;
    let spec = QuerySpec::parse(&params, &USER_FIELDS, "name")?;
    let users = User::list(&state.db, &spec).await?;
    let data = spec.project_rows(&users, &USER_FIELDS)?;
    Ok(Json(Envelope::data(data)))
}

/// Account creation goes through signup so the credential rules apply.
pub async fn create_user() -> ApiError {
    ApiError::BadRequest("This route is not defined. Please use /signup instead.".into())
}

#[instrument(skip(state, user))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Value>>> {
    restrict_to(&user, &[Role::Admin])?;
    let found = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;
    Ok(Json(Envelope::data(project_default(&found, &USER_FIELDS)?)))
}

#[instrument(skip(state, user, payload))]
pub async fn admin_update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> ApiResult<Json<Envelope<Value>>> {
    restrict_to(&user, &[Role::Admin])?;

    let email = match payload.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(ApiError::BadRequest("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let updated = User::update_by_admin(
        &state.db,
        id,
        payload.name.as_deref(),
        email.as_deref(),
        payload.role,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(user_id = %id, "user updated by admin");
    Ok(Json(Envelope::data(project_default(&updated, &USER_FIELDS)?)))
}

#[instrument(skip(state, user))]
pub async fn admin_delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    restrict_to(&user, &[Role::Admin])?;
    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("No user found with that ID".into()));
    }
    info!(user_id = %id, "user deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user, body))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<Value>,
) -> ApiResult<Json<Envelope<Value>>> {
    if body.get("password").is_some() || body.get("passwordConfirm").is_some() {
        warn!(user_id = %user.id, "password change attempted through updateMe");
        return Err(ApiError::BadRequest(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }
    let payload: UpdateMeRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;

    let email = match payload.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(ApiError::BadRequest("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let updated = User::update_profile(&state.db, user.id, payload.name.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(Envelope::data(project_default(&updated, &USER_FIELDS)?)))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<StatusCode> {
    User::deactivate(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}
