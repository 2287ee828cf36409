use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::db::{TaskFilter, TaskOrdering, UserRecord};
use crate::error::ApiError;
use crate::models::{
    Category, CategoryRequest, CreateTaskRequest, DateRangeQuery, LoginRequest, RegisterRequest,
    Task, TaskListQuery, TokenResponse, UpdateTaskRequest, User,
};
use crate::router::AppState;

// --- registration & login (the only unauthenticated operations) ---

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = input.username.trim();
    if username.is_empty() || input.password.is_empty() {
        return Err(ApiError::Validation(
            "Both 'username' and 'password' are required".to_string(),
        ));
    }

    let salt = auth::generate_salt();
    let record = UserRecord {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: auth::hash_password(&input.password, &salt),
        salt,
    };
    state.store.insert_user(&record)?;

    tracing::info!(user = %record.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(User {
            id: record.id,
            username: record.username,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_username(input.username.trim())?
        .ok_or(ApiError::Unauthorized)?;

    if auth::hash_password(&input.password, &user.salt) != user.password_hash {
        return Err(ApiError::Unauthorized);
    }

    let token = auth::generate_token();
    state.store.insert_token(&auth::hash_token(&token), &user.id)?;
    Ok(Json(TokenResponse { token }))
}

// --- tasks ---

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let filter = TaskFilter {
        search: query.search,
        ordering: query.ordering.as_deref().and_then(TaskOrdering::parse),
        range: None,
    };
    let tasks = state.store.list_tasks(&user.id, &filter)?;
    Ok(Json(tasks))
}

/// Task listing with an optional creation-date window. `data_inicial` and
/// `data_final` travel together: exactly one of them, or an unparsable
/// value, is a validation error rather than a silently skipped filter.
pub async fn list_tasks_by_date(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let range = match (&query.data_inicial, &query.data_final) {
        (None, None) => None,
        (Some(start), Some(end)) => Some((parse_date(start)?, parse_date(end)?)),
        _ => {
            return Err(ApiError::Validation(
                "'data_inicial' and 'data_final' must be provided together".to_string(),
            ))
        }
    };

    let filter = TaskFilter {
        search: query.search,
        ordering: query.ordering.as_deref().and_then(TaskOrdering::parse),
        range,
    };
    let tasks = state.store.list_tasks(&user.id, &filter)?;
    Ok(Json(tasks))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::Validation(
                "Invalid date format. Use ISO 8601 (e.g. 2024-01-01T00:00:00Z)".to_string(),
            )
        })
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::Validation("'title' is required".to_string()));
    }

    // Ownership comes from the authenticated caller, never from the payload.
    let task = Task {
        id: Uuid::new_v4().to_string(),
        user: user.id,
        title: input.title,
        description: input.description,
        is_completed: false,
        category: input.category,
        created_at: Utc::now(),
    };
    state.store.insert_task(&task)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .store
        .get_task(&user.id, &id)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let mut task = state
        .store
        .get_task(&user.id, &id)?
        .ok_or(ApiError::NotFound)?;

    if let Some(title) = input.title {
        if title.trim().is_empty() {
            return Err(ApiError::Validation("'title' cannot be empty".to_string()));
        }
        task.title = title;
    }
    if let Some(description) = input.description {
        task.description = description;
    }
    if let Some(is_completed) = input.is_completed {
        task.is_completed = is_completed;
    }
    if let Some(category) = input.category {
        task.category = category;
    }

    if !state.store.update_task(&task)? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_task(&user.id, &id)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- categories (authenticated, but shared across users) ---

pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.store.list_categories()?))
}

pub async fn create_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(input): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::Validation("'name' is required".to_string()));
    }
    let category = Category {
        id: Uuid::new_v4().to_string(),
        name: input.name,
    };
    state.store.insert_category(&category)?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let category = state.store.get_category(&id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<CategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::Validation("'name' is required".to_string()));
    }
    if !state.store.update_category(&id, &input.name)? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(Category {
        id,
        name: input.name,
    }))
}

pub async fn delete_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_category(&id)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
