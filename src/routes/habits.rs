//! Habit tracking: daily check-ins with a consecutive-day streak.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime as ChronoDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::model::Habit;
use crate::routes::parse_object_id;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id/checkin", post(check_in))
        .route("/:id", axum::routing::delete(remove))
}

#[derive(Debug, Deserialize)]
struct CreateHabit {
    name: String,
}

#[derive(Debug, Serialize)]
struct HabitResponse {
    id: String,
    name: String,
    streak: i32,
    total_check_ins: i64,
    last_checked_in: Option<String>,
    created_at: String,
}

impl From<Habit> for HabitResponse {
    fn from(habit: Habit) -> Self {
        Self {
            id: habit.id.to_hex(),
            name: habit.name,
            streak: habit.streak,
            total_check_ins: habit.total_check_ins,
            last_checked_in: habit.last_checked_in.map(|d| d.to_chrono().to_rfc3339()),
            created_at: habit.created_at.to_chrono().to_rfc3339(),
        }
    }
}

/// Streak value after a check-in at `now`, or `None` when today's check-in
/// already happened. Days are compared in UTC.
fn advance_streak(
    streak: i32,
    last_checked_in: Option<DateTime>,
    now: ChronoDateTime<Utc>,
) -> Option<i32> {
    let last = match last_checked_in {
        Some(last) => last.to_chrono().date_naive(),
        None => return Some(1),
    };
    let today = now.date_naive();

    if last == today {
        None
    } else if today.pred_opt() == Some(last) {
        Some(streak + 1)
    } else {
        Some(1)
    }
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<HabitResponse>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let mut cursor = state
        .db
        .collection::<Habit>("habits")
        .find(doc! { "user_id": user.id }, options)
        .await?;

    let mut habits = Vec::new();
    while let Some(habit) = cursor.try_next().await? {
        habits.push(HabitResponse::from(habit));
    }

    Ok(Json(habits))
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateHabit>,
) -> Result<impl IntoResponse, AppError> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    let habit = Habit {
        id: ObjectId::new(),
        user_id: user.id,
        name,
        streak: 0,
        total_check_ins: 0,
        last_checked_in: None,
        created_at: DateTime::now(),
    };
    state
        .db
        .collection::<Habit>("habits")
        .insert_one(&habit, None)
        .await?;

    Ok((StatusCode::CREATED, Json(HabitResponse::from(habit))))
}

/// UTC midnight of the day containing `now`.
fn day_start(now: ChronoDateTime<Utc>) -> DateTime {
    DateTime::from_chrono(now.date_naive().and_time(NaiveTime::MIN).and_utc())
}

/// Matches the habit only while today's check-in has not happened yet, so
/// concurrent check-ins cannot both apply.
fn check_in_filter(id: ObjectId, user_id: ObjectId, day_start: DateTime) -> Document {
    doc! {
        "_id": id,
        "user_id": user_id,
        "$or": [
            { "last_checked_in": Bson::Null },
            { "last_checked_in": { "$lt": day_start } },
        ],
    }
}

async fn check_in(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<HabitResponse>, AppError> {
    let id = parse_object_id(&id)?;
    let habits = state.db.collection::<Habit>("habits");

    let habit = habits
        .find_one(doc! { "_id": id, "user_id": user.id }, None)
        .await?
        .ok_or_else(|| AppError::NotFound("Habit not found".to_string()))?;

    let now = Utc::now();
    let streak = advance_streak(habit.streak, habit.last_checked_in, now)
        .ok_or_else(|| AppError::BadRequest("Already checked in today".to_string()))?;

    // The same-day guard is repeated in the update filter; a concurrent
    // check-in that lands between the read above and this write makes the
    // filter miss instead of double-applying.
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let habit = habits
        .find_one_and_update(
            check_in_filter(id, user.id, day_start(now)),
            doc! {
                "$set": {
                    "streak": streak,
                    "last_checked_in": DateTime::from_chrono(now),
                },
                "$inc": { "total_check_ins": 1i64 },
            },
            options,
        )
        .await?
        .ok_or_else(|| AppError::BadRequest("Already checked in today".to_string()))?;

    Ok(Json(habit.into()))
}

async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_object_id(&id)?;

    let result = state
        .db
        .collection::<Habit>("habits")
        .delete_one(doc! { "_id": id, "user_id": user.id }, None)
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Habit not found".to_string()));
    }

    Ok(Json(json!({ "message": "Habit deleted" })))
}
