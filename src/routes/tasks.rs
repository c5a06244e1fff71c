//! Task CRUD, scoped to the authenticated user.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime as ChronoDateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::model::Task;
use crate::routes::parse_object_id;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", axum::routing::put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
struct CreateTask {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_date: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UpdateTask {
    title: Option<String>,
    description: Option<String>,
    completed: Option<bool>,
    due_date: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    id: String,
    title: String,
    description: Option<String>,
    completed: bool,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.to_hex(),
            title: task.title,
            description: task.description,
            completed: task.completed,
            due_date: task.due_date.map(|d| d.to_chrono().to_rfc3339()),
            created_at: task.created_at.to_chrono().to_rfc3339(),
            updated_at: task.updated_at.to_chrono().to_rfc3339(),
        }
    }
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<TaskResponse>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let mut cursor = state
        .db
        .collection::<Task>("tasks")
        .find(doc! { "user_id": user.id }, options)
        .await?;

    let mut tasks = Vec::new();
    while let Some(task) = cursor.try_next().await? {
        tasks.push(TaskResponse::from(task));
    }

    Ok(Json(tasks))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateTask>,
) -> Result<impl IntoResponse, AppError> {
    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let now = DateTime::now();
    let task = Task {
        id: ObjectId::new(),
        user_id: user.id,
        title,
        description: body.description,
        completed: false,
        due_date: body.due_date.map(DateTime::from_chrono),
        created_at: now,
        updated_at: now,
    };
    state
        .db
        .collection::<Task>("tasks")
        .insert_one(&task, None)
        .await?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTask>,
) -> Result<Json<TaskResponse>, AppError> {
    let id = parse_object_id(&id)?;

    let mut set = Document::new();
    if let Some(title) = body.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".to_string()));
        }
        set.insert("title", title);
    }
    if let Some(description) = body.description {
        set.insert("description", description);
    }
    if let Some(completed) = body.completed {
        set.insert("completed", completed);
    }
    if let Some(due_date) = body.due_date {
        set.insert("due_date", DateTime::from_chrono(due_date));
    }
    if set.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    set.insert("updated_at", DateTime::now());

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let task = state
        .db
        .collection::<Task>("tasks")
        .find_one_and_update(
            doc! { "_id": id, "user_id": user.id },
            doc! { "$set": set },
            options,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    Ok(Json(task.into()))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_object_id(&id)?;

    let result = state
        .db
        .collection::<Task>("tasks")
        .delete_one(doc! { "_id": id, "user_id": user.id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Task not found".to_string()));
    }

    Ok(Json(json!({ "message": "Task deleted" })))
}
