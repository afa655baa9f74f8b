use serde::Deserialize;

use crate::query::{FieldDef, FieldKind};
use crate::users::repo::Role;

/// Externally visible user fields for the list pipeline.
pub static USER_FIELDS: [FieldDef; 4] = [
    FieldDef { name: "name", column: "name", kind: FieldKind::Text, internal: false },
    FieldDef { name: "email", column: "email", kind: FieldKind::Text, internal: false },
    FieldDef { name: "role", column: "role", kind: FieldKind::Text, internal: false },
    FieldDef { name: "createdAt", column: "created_at", kind: FieldKind::Timestamp, internal: false },
];

/// Self-service profile update. Unknown keys are ignored, so a `role` in
/// the body cannot escalate anything.
#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_update_parses_kebab_case_roles() {
        let req: AdminUpdateUserRequest = serde_json::from_value(serde_json::json!({
            "role": "lead-guide"
        }))
        .unwrap();
        assert_eq!(req.role, Some(Role::LeadGuide));
        assert!(req.name.is_none());
    }
}
