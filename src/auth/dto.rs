use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Both fields optional so a missing one can be answered with the login
/// flow's own message instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password_current: String,
    pub password: String,
    pub password_confirm: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_request_accepts_camel_case_confirm_field() {
        let req: SignupRequest = serde_json::from_value(serde_json::json!({
            "name": "A",
            "email": "a@x.com",
            "password": "secret123",
            "passwordConfirm": "secret123"
        }))
        .unwrap();
        assert_eq!(req.password_confirm, "secret123");
    }

    #[test]
    fn login_request_tolerates_missing_fields() {
        let req: LoginRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.email.is_none());
        assert!(req.password.is_none());
    }
}
