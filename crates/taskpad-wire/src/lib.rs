//! Wire shapes of the task backend's JSON API.
//!
//! Field names follow the backend exactly; nothing here knows about
//! dates, validation, or sessions.

use serde::{
  Deserialize,
  Deserializer,
  Serialize
};

pub mod endpoints {
  pub const TOKEN: &str = "/token/";
  pub const DEFAULT_REFRESH: &str =
    "/auth/refresh/";
  pub const USER: &str = "/users/user/";
  pub const REGISTER: &str =
    "/users/register/";
  pub const GOOGLE: &str =
    "/users/google/";
  pub const PASSWORD_RESET: &str =
    "/password-reset/";
  pub const TODOS: &str = "/todos/";
  pub const CREATE_TASK: &str =
    "/todos/create_task/";

  pub fn password_reset_confirm(
    uid: &str,
    token: &str
  ) -> String {
    format!(
      "/password-reset-confirm/{uid}/{token}/"
    )
  }

  pub fn verify_email(
    uid: &str,
    token: &str
  ) -> String {
    format!(
      "/users/verify-email/{uid}/{token}/"
    )
  }

  pub fn update_task(id: &str) -> String {
    format!("/todos/update_task/{id}/")
  }

  pub fn delete_task(id: &str) -> String {
    format!("/todos/delete_task/{id}/")
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskDto {
  #[serde(
    deserialize_with = "opaque_id"
  )]
  pub id:           String,
  #[serde(default)]
  pub title:        String,
  #[serde(default)]
  pub description:  Option<String>,
  #[serde(default)]
  pub deadline:     Option<String>,
  #[serde(default)]
  pub is_important: bool,
  #[serde(default)]
  pub is_completed: bool,
  #[serde(
    default,
    deserialize_with = "opaque_id_opt"
  )]
  pub user:         Option<String>
}

/// Body of create and full-update calls.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskPayload {
  pub title:        String,
  pub description:  Option<String>,
  pub deadline:     Option<String>,
  pub is_important: bool,
  pub is_completed: bool,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub user:         Option<String>
}

/// Body of partial updates; absent
/// fields are left alone server-side.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
  Eq,
)]
pub struct TaskPatchPayload {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub is_important: Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub is_completed: Option<bool>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct LoginRequest {
  pub username: String,
  pub password: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TokenUser {
  #[serde(
    default,
    deserialize_with = "opaque_id_opt"
  )]
  pub id:       Option<String>,
  #[serde(default)]
  pub email:    Option<String>,
  #[serde(default)]
  pub username: Option<String>
}

/// Login and Google exchange both
/// answer with this shape. The user id
/// arrives either flat or nested under
/// `user`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TokenResponse {
  pub access:   String,
  #[serde(default)]
  pub refresh:  Option<String>,
  #[serde(
    default,
    deserialize_with = "opaque_id_opt"
  )]
  pub id:       Option<String>,
  #[serde(default)]
  pub email:    Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub user:     Option<TokenUser>
}

impl TokenResponse {
  pub fn user_id(
    &self
  ) -> Option<String> {
    self.id.clone().or_else(|| {
      self
        .user
        .as_ref()
        .and_then(|user| user.id.clone())
    })
  }

  pub fn user_email(
    &self
  ) -> Option<String> {
    self.email.clone().or_else(|| {
      self.user.as_ref().and_then(
        |user| user.email.clone()
      )
    })
  }

  pub fn user_name(
    &self
  ) -> Option<String> {
    self.username.clone().or_else(|| {
      self.user.as_ref().and_then(
        |user| user.username.clone()
      )
    })
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RefreshRequest {
  pub refresh: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RefreshResponse {
  pub access:  String,
  #[serde(default)]
  pub refresh: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ProfileDto {
  #[serde(
    deserialize_with = "opaque_id"
  )]
  pub id:              String,
  #[serde(default)]
  pub username:        String,
  #[serde(default)]
  pub email:           String,
  #[serde(default)]
  pub profile_picture: Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct ProfileUpdate {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub username: Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub password: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RegisterRequest {
  pub full_name:        String,
  pub username:         String,
  pub email:            String,
  pub password:         String,
  pub confirm_password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct PasswordResetRequest {
  pub email: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct PasswordResetConfirm {
  pub new_password:     String,
  pub confirm_password: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct GoogleCredential {
  pub credential: String
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
  Text(String),
  Number(i64)
}

impl From<RawId> for String {
  fn from(raw: RawId) -> Self {
    match raw {
      | RawId::Text(text) => text,
      | RawId::Number(n) => n.to_string()
    }
  }
}

fn opaque_id<'de, D>(
  deserializer: D
) -> Result<String, D::Error>
where
  D: Deserializer<'de>
{
  RawId::deserialize(deserializer)
    .map(String::from)
}

fn opaque_id_opt<'de, D>(
  deserializer: D
) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>
{
  Option::<RawId>::deserialize(
    deserializer
  )
  .map(|raw| raw.map(String::from))
}
