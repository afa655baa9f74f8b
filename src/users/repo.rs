use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::Hasher;
use crate::query::QuerySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

/// User record. Password material and the soft-delete flag never appear in
/// JSON output.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, password_changed_at, \
     password_reset_token, password_reset_expires, active, created_at";

impl User {
    /// Create a user. The store owns the hashing step: callers hand over
    /// the plain password and never see the hash.
    pub async fn create(
        db: &PgPool,
        hasher: &dyn Hasher,
        name: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<User> {
        let hash = hasher.hash_password(password)?;
        let sql = format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .bind(email)
            .bind(hash)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    /// Find an active user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active = TRUE");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Find an active user by id.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Find the active user holding an unexpired reset token with this
    /// digest. Expiry is checked here so expired tokens never match.
    pub async fn find_by_reset_digest(db: &PgPool, digest: &str) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE password_reset_token = $1 AND password_reset_expires > now() \
               AND active = TRUE"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(digest)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Store the reset-token digest and its expiry. Both fields move
    /// together; they are cleared together by `clear_reset_token` and
    /// `update_password`.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = $2, password_reset_expires = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = NULL, password_reset_expires = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Set a new password. One statement keeps the invariants: the hash is
    /// replaced, `password_changed_at` bumps (invalidating older tokens),
    /// and any outstanding reset token is consumed.
    pub async fn update_password(
        db: &PgPool,
        hasher: &dyn Hasher,
        id: Uuid,
        new_password: &str,
    ) -> anyhow::Result<User> {
        let hash = hasher.hash_password(new_password)?;
        let sql = format!(
            "UPDATE users SET password_hash = $2, password_changed_at = now(), \
             password_reset_token = NULL, password_reset_expires = NULL \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(hash)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    /// Profile fields only; password changes go through `update_password`.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email) \
             WHERE id = $1 AND active = TRUE RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn update_by_admin(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        role: Option<Role>,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email), \
             role = COALESCE($4, role) WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(email)
            .bind(role)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Soft delete: the record stays, every lookup stops seeing it.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(db: &PgPool, spec: &QuerySpec) -> anyhow::Result<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {USER_COLUMNS} FROM users WHERE active = TRUE"
        ));
        spec.apply(&mut qb, true);
        let users = qb.build_query_as::<User>().fetch_all(db).await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "$argon2id$not-a-real-hash".into(),
            role: Role::User,
            password_changed_at: None,
            password_reset_token: Some("digest".into()),
            password_reset_expires: Some(OffsetDateTime::now_utc()),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn password_material_never_serializes() {
        let value = serde_json::to_value(sample_user()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("email"));
        assert!(obj.contains_key("role"));
        assert!(!obj.contains_key("passwordHash"));
        assert!(!obj.contains_key("passwordResetToken"));
        assert!(!obj.contains_key("passwordResetExpires"));
        assert!(!obj.contains_key("passwordChangedAt"));
        assert!(!obj.contains_key("active"));
    }

    #[test]
    fn role_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(Role::LeadGuide).unwrap(), "lead-guide");
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
        let role: Role = serde_json::from_value(serde_json::json!("admin")).unwrap();
        assert_eq!(role, Role::Admin);
    }
}
