//! Goal CRUD with percent-complete progress.

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
use crate::model::Goal;
use crate::routes::parse_object_id;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", axum::routing::put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
struct CreateGoal {
    title: String,
    #[serde(default)]
    target_date: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UpdateGoal {
    title: Option<String>,
    progress: Option<i32>,
    target_date: Option<ChronoDateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct GoalResponse {
    id: String,
    title: String,
    progress: i32,
    target_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<Goal> for GoalResponse {
    fn from(goal: Goal) -> Self {
        Self {
            id: goal.id.to_hex(),
            title: goal.title,
            progress: goal.progress,
            target_date: goal.target_date.map(|d| d.to_chrono().to_rfc3339()),
            created_at: goal.created_at.to_chrono().to_rfc3339(),
            updated_at: goal.updated_at.to_chrono().to_rfc3339(),
        }
    }
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<GoalResponse>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let mut cursor = state
        .db
        .collection::<Goal>("goals")
        .find(doc! { "user_id": user.id }, options)
        .await?;

    let mut goals = Vec::new();
    while let Some(goal) = cursor.try_next().await? {
        goals.push(GoalResponse::from(goal));
    }

    Ok(Json(goals))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateGoal>,
) -> Result<impl IntoResponse, AppError> {
    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".to_string()));
    }

    let now = DateTime::now();
    let goal = Goal {
        id: ObjectId::new(),
        user_id: user.id,
        title,
        progress: 0,
        target_date: body.target_date.map(DateTime::from_chrono),
        created_at: now,
        updated_at: now,
    };
    state
        .db
        .collection::<Goal>("goals")
        .insert_one(&goal, None)
        .await?;

    Ok((StatusCode::CREATED, Json(GoalResponse::from(goal))))
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateGoal>,
) -> Result<Json<GoalResponse>, AppError> {
    let id = parse_object_id(&id)?;

    let mut set = Document::new();
    if let Some(title) = body.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".to_string()));
        }
        set.insert("title", title);
    }
    if let Some(progress) = body.progress {
        if !(0..=100).contains(&progress) {
            return Err(AppError::BadRequest(
                "Progress must be between 0 and 100".to_string(),
            ));
        }
        set.insert("progress", progress);
    }
    if let Some(target_date) = body.target_date {
        set.insert("target_date", DateTime::from_chrono(target_date));
    }
    if set.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    set.insert("updated_at", DateTime::now());

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let goal = state
        .db
        .collection::<Goal>("goals")
        .find_one_and_update(
            doc! { "_id": id, "user_id": user.id },
            doc! { "$set": set },
            options,
        )
        .await?
        .ok_or_else(|| AppError::NotFound("Goal not found".to_string()))?;

    Ok(Json(goal.into()))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_object_id(&id)?;

    let result = state
        .db
        .collection::<Goal>("goals")
        .delete_one(doc! { "_id": id, "user_id": user.id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Goal not found".to_string()));
    }

    Ok(Json(json!({ "message": "Goal deleted" })))
}
