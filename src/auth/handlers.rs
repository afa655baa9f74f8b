use axum::{
    extract::{FromRef, Path, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
            UpdatePasswordRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
    },
    error::{ApiError, ApiResult, Envelope},
    query::project_default,
    state::AppState,
    users::{dto::USER_FIELDS, repo::User},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> ApiResult<()> {
    if password.len() < 8 {
        return Err(ApiError::BadRequest("Password too short".into()));
    }
    if password != confirm {
        return Err(ApiError::BadRequest("Passwords do not match".into()));
    }
    Ok(())
}

fn auth_cookie(token: &str, ttl: std::time::Duration) -> ApiResult<HeaderValue> {
    let cookie = format!(
        "jwt={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        token,
        ttl.as_secs()
    );
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("cookie header: {}", e)))
}

/// Login-equivalent response: token in the body and mirrored as an
/// HTTP-only cookie, plus the password-free user representation.
fn send_token(keys: &JwtKeys, user: &User, status: StatusCode) -> ApiResult<Response> {
    let token = keys.sign(user.id)?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, auth_cookie(&token, keys.cookie_ttl)?);
    let data = project_default(user, &USER_FIELDS)?;
    Ok((status, headers, Json(Envelope::data(data).with_token(token))).into_response())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> ApiResult<Response> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    // Answering 409 here reveals which addresses have accounts; documented
    // behavior inherited from the reference API.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let user = User::create(
        &state.db,
        state.hasher.as_ref(),
        payload.name.trim(),
        &payload.email,
        &payload.password,
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    send_token(&JwtKeys::from_ref(&state), &user, StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Response> {
    let (email, password) = match (payload.email, payload.password) {
        (Some(email), Some(password)) => (email.trim().to_lowercase(), password),
        _ => {
            return Err(ApiError::BadRequest(
                "Please provide email and password".into(),
            ))
        }
    };

    // Same message for unknown email and wrong password.
    let user = User::find_by_email(&state.db, &email).await?.ok_or_else(|| {
        warn!(email = %email, "login unknown email");
        ApiError::Unauthorized("Incorrect email or password".into())
    })?;

    let ok = state
        .hasher
        .verify_password(&password, &user.password_hash)?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Incorrect email or password".into()));
    }

    info!(user_id = %user.id, "user logged in");
    send_token(&JwtKeys::from_ref(&state), &user, StatusCode::OK)
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<Envelope<()>>> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email).await?.ok_or_else(|| {
        ApiError::NotFound("There is no user with that email address.".into())
    })?;

    let token = state.hasher.reset_token();
    let expires =
        OffsetDateTime::now_utc() + TimeDuration::minutes(state.config.reset_token_ttl_minutes);
    User::set_reset_token(&state.db, user.id, &token.digest, expires).await?;

    let reset_url = format!(
        "{}/api/v1/users/resetPassword/{}",
        state.config.email.public_base_url, token.raw
    );
    let subject = format!(
        "Your password reset token (valid for {} min)",
        state.config.reset_token_ttl_minutes
    );
    let body = format!(
        "Forgot your password? Submit a PATCH request with your new password and \
         passwordConfirm to: {}.\nIf you didn't forget your password, please ignore this email!",
        reset_url
    );

    if let Err(e) = state.mailer.send(&user.email, &subject, &body).await {
        // The token was already persisted; roll it back before failing.
        error!(error = %e, user_id = %user.id, "reset email failed, clearing token");
        User::clear_reset_token(&state.db, user.id).await?;
        return Err(ApiError::ServiceFailure(
            "There was an error sending the email. Please try again later.".into(),
        ));
    }

    info!(user_id = %user.id, "reset token issued");
    Ok(Json(Envelope::message("Token sent to email!")))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Response> {
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let digest = state.hasher.digest(&token);
    let user = User::find_by_reset_digest(&state.db, &digest)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Token is invalid or has expired".into()))?;

    // Consumes the token: the digest is cleared in the same statement that
    // sets the new password.
    let user =
        User::update_password(&state.db, state.hasher.as_ref(), user.id, &payload.password).await?;

    info!(user_id = %user.id, "password reset");
    send_token(&JwtKeys::from_ref(&state), &user, StatusCode::OK)
}

#[instrument(skip(state, user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> ApiResult<Response> {
    let ok = state
        .hasher
        .verify_password(&payload.password_current, &user.password_hash)?;
    if !ok {
        warn!(user_id = %user.id, "wrong current password");
        return Err(ApiError::Unauthorized("Your current password is wrong.".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let user =
        User::update_password(&state.db, state.hasher.as_ref(), user.id, &payload.password).await?;

    info!(user_id = %user.id, "password updated");
    send_token(&JwtKeys::from_ref(&state), &user, StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn new_password_must_be_long_enough_and_match() {
        assert!(validate_new_password("secret123", "secret123").is_ok());
        let err = validate_new_password("short", "short").unwrap_err();
        assert!(err.to_string().contains("Password too short"));
        let err = validate_new_password("secret123", "secret124").unwrap_err();
        assert!(err.to_string().contains("Passwords do not match"));
    }

    #[test]
    fn auth_cookie_is_http_only_with_mirrored_expiry() {
        let value = auth_cookie("tok", std::time::Duration::from_secs(600)).unwrap();
        let cookie = value.to_str().unwrap();
        assert!(cookie.starts_with("jwt=tok;"));
        assert!(cookie.contains("Max-Age=600"));
        assert!(cookie.contains("HttpOnly"));
    }
}
