use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::ApiError;
use crate::models::{Category, Task};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            TEXT NOT NULL PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt          TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tokens (
    hash       TEXT NOT NULL PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS categories (
    id   TEXT NOT NULL PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT NOT NULL PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    is_completed INTEGER NOT NULL DEFAULT 0,
    category_id  TEXT NULL REFERENCES categories(id) ON DELETE RESTRICT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category_id);
";

const SELECT_TASK: &str =
    "SELECT id, user_id, title, description, is_completed, category_id, created_at FROM tasks";

// SQLite extended result codes for constraint failures.
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Stored user row, credential material included. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
}

/// How a task listing is narrowed and ordered, on top of the mandatory
/// owner predicate. Built by handlers from query parameters.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub search: Option<String>,
    pub ordering: Option<TaskOrdering>,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrdering {
    CreatedAtAsc,
    CreatedAtDesc,
}

impl TaskOrdering {
    /// Parses an `ordering` query value, `-` prefix meaning descending.
    /// Unknown field names are ignored (store-default order applies).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created_at" => Some(TaskOrdering::CreatedAtAsc),
            "-created_at" => Some(TaskOrdering::CreatedAtDesc),
            _ => None,
        }
    }
}

/// SQLite-backed store. All access goes through one connection behind a
/// mutex; every statement that touches tasks carries the owner predicate
/// so visibility is enforced at the query, not after the fetch.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, ApiError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, ApiError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, ApiError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.conn
            .lock()
            .map_err(|_| ApiError::Internal("store lock poisoned".to_string()))
    }

    // --- users & tokens ---

    pub fn insert_user(&self, user: &UserRecord) -> Result<(), ApiError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.salt,
                timestamp(&Utc::now()),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e, SQLITE_CONSTRAINT_UNIQUE) {
                ApiError::Validation(format!("Username '{}' is already taken", user.username))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, ApiError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, username, password_hash, salt FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        salt: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn insert_token(&self, token_hash: &str, user_id: &str) -> Result<(), ApiError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tokens (hash, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token_hash, user_id, timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    /// Resolves a token hash to the owning user id, if the token exists.
    pub fn user_for_token(&self, token_hash: &str) -> Result<Option<String>, ApiError> {
        let conn = self.conn()?;
        let user_id = conn
            .query_row(
                "SELECT user_id FROM tokens WHERE hash = ?1",
                params![token_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    // --- categories (global, not owner-scoped) ---

    pub fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    pub fn insert_category(&self, category: &Category) -> Result<(), ApiError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (id, name) VALUES (?1, ?2)",
            params![category.id, category.name],
        )?;
        Ok(())
    }

    pub fn get_category(&self, id: &str) -> Result<Option<Category>, ApiError> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    pub fn update_category(&self, id: &str, name: &str) -> Result<bool, ApiError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE categories SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes a category. The store rejects the delete while any task
    /// still references it; that surfaces as a conflict, not a cascade.
    pub fn delete_category(&self, id: &str) -> Result<bool, ApiError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| {
                if is_constraint(&e, SQLITE_CONSTRAINT_FOREIGNKEY) {
                    ApiError::Conflict(
                        "Category is referenced by existing tasks and cannot be deleted"
                            .to_string(),
                    )
                } else {
                    e.into()
                }
            })?;
        Ok(deleted > 0)
    }

    // --- tasks (always owner-scoped) ---

    pub fn insert_task(&self, task: &Task) -> Result<(), ApiError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, user_id, title, description, is_completed, category_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.user,
                task.title,
                task.description,
                task.is_completed,
                task.category,
                timestamp(&task.created_at),
            ],
        )
        .map_err(map_category_fk)?;
        Ok(())
    }

    pub fn list_tasks(&self, owner: &str, filter: &TaskFilter) -> Result<Vec<Task>, ApiError> {
        let conn = self.conn()?;

        let mut sql = format!("{SELECT_TASK} WHERE user_id = ?");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner.to_string())];

        if let Some(q) = &filter.search {
            sql.push_str(" AND (instr(lower(title), lower(?)) > 0 OR instr(lower(description), lower(?)) > 0)");
            values.push(Box::new(q.clone()));
            values.push(Box::new(q.clone()));
        }
        if let Some((start, end)) = &filter.range {
            sql.push_str(" AND created_at >= ? AND created_at <= ?");
            values.push(Box::new(timestamp(start)));
            values.push(Box::new(timestamp(end)));
        }
        match filter.ordering {
            Some(TaskOrdering::CreatedAtAsc) => sql.push_str(" ORDER BY created_at ASC"),
            Some(TaskOrdering::CreatedAtDesc) => sql.push_str(" ORDER BY created_at DESC"),
            None => {}
        }

        let mut stmt = conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(bound.as_slice(), row_to_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Fetches a single task. A task owned by someone else comes back as
    /// `None`, same as a missing id.
    pub fn get_task(&self, owner: &str, id: &str) -> Result<Option<Task>, ApiError> {
        let conn = self.conn()?;
        let task = conn
            .query_row(
                &format!("{SELECT_TASK} WHERE id = ?1 AND user_id = ?2"),
                params![id, owner],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Writes the mutable fields of a task. Owner and `created_at` are
    /// never part of the SET clause.
    pub fn update_task(&self, task: &Task) -> Result<bool, ApiError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE tasks SET title = ?1, description = ?2, is_completed = ?3, category_id = ?4
                 WHERE id = ?5 AND user_id = ?6",
                params![
                    task.title,
                    task.description,
                    task.is_completed,
                    task.category,
                    task.id,
                    task.user,
                ],
            )
            .map_err(map_category_fk)?;
        Ok(changed > 0)
    }

    pub fn delete_task(&self, owner: &str, id: &str) -> Result<bool, ApiError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![id, owner],
        )?;
        Ok(deleted > 0)
    }
}

/// Canonical timestamp encoding: RFC 3339 UTC with fixed-width microsecond
/// precision, so lexicographic comparison in SQL matches chronological order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let raw: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(Task {
        id: row.get(0)?,
        user: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        is_completed: row.get(4)?,
        category: row.get(5)?,
        created_at,
    })
}

fn is_constraint(e: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.extended_code == extended_code)
}

/// A foreign-key failure on task insert/update means the payload named a
/// category that does not exist.
fn map_category_fk(e: rusqlite::Error) -> ApiError {
    if is_constraint(&e, SQLITE_CONSTRAINT_FOREIGNKEY) {
        ApiError::Validation("Category does not exist".to_string())
    } else {
        e.into()
    }
}
