use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Public view of a user account. The stored credential never appears here.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Shared lookup table entry. Categories are global: not owned by any user.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// A to-do item. `user` is the owner id, fixed at creation; `created_at`
/// is assigned by the store on insert and never changes.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub user: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Request payloads. Required fields are defaulted rather than strict so a
// missing field surfaces as our own validation error, not a decode failure.

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Create payload. Any `user` field a client sends is ignored: ownership
/// always comes from the authenticated caller.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
}

/// Partial update. `category` distinguishes "absent" (leave unchanged)
/// from an explicit null (clear the reference).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_completed: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
}

fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: String,
}

/// Query parameters on the generic task listing.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
}

/// Query parameters on the date-filtered task listing.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub data_inicial: Option<String>,
    pub data_final: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}
