use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::{
    auth::jwt::JwtKeys,
    error::{ApiError, ApiResult},
    state::AppState,
    users::repo::{Role, User},
};

/// Authenticated identity for protected routes. Extraction runs the full
/// access-control sequence: bearer token, signature and expiry, the user
/// still exists, and the token is not older than the last password change.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "You are not logged in. Please log in to get access.".into(),
                )
            })?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "You are not logged in. Please log in to get access.".into(),
                )
            })?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthorized("Invalid or expired token.".into())
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized("The user belonging to this token no longer exists.".into())
            })?;

        if let Some(changed_at) = user.password_changed_at {
            if claims.issued_before(changed_at) {
                return Err(ApiError::Unauthorized(
                    "Password was changed recently. Please log in again.".into(),
                ));
            }
        }

        Ok(CurrentUser(user))
    }
}

/// Authorization stage, applied after authentication on role-gated routes.
pub fn restrict_to(user: &User, allowed: &[Role]) -> ApiResult<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You do not have permission to perform this action".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_with_role(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            role,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn restrict_to_grants_listed_roles() {
        let admin = user_with_role(Role::Admin);
        assert!(restrict_to(&admin, &[Role::Admin, Role::LeadGuide]).is_ok());
    }

    #[test]
    fn restrict_to_rejects_other_roles_with_forbidden() {
        let user = user_with_role(Role::User);
        let err = restrict_to(&user, &[Role::Admin, Role::LeadGuide]).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
