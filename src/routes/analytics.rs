//! Read-only aggregates over the caller's tasks, habits, and goals.

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/summary", get(summary))
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(v) => i64::from(*v),
        Bson::Int64(v) => *v,
        Bson::Double(v) => *v as i64,
        _ => 0,
    }
}

async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let owned = doc! { "user_id": user.id };

    let tasks = state.db.collection::<Document>("tasks");
    let total_tasks = tasks.count_documents(owned.clone(), None).await?;
    let completed_tasks = tasks
        .count_documents(doc! { "user_id": user.id, "completed": true }, None)
        .await?;
    let completion_rate = if total_tasks == 0 {
        0.0
    } else {
        completed_tasks as f64 / total_tasks as f64
    };

    let habits = state.db.collection::<Document>("habits");
    let total_habits = habits.count_documents(owned.clone(), None).await?;

    // One pass for the check-in total; counts above stay as cheap
    // count_documents calls.
    let mut cursor = state
        .db
        .collection::<Document>("habits")
        .aggregate(
            vec![
                doc! { "$match": owned.clone() },
                doc! { "$group": { "_id": null, "total": { "$sum": "$total_check_ins" } } },
            ],
            None,
        )
        .await?;
    let total_check_ins = cursor
        .try_next()
        .await?
        .and_then(|d| d.get("total").map(as_i64))
        .unwrap_or(0);

    let goals = state.db.collection::<Document>("goals");
    let total_goals = goals.count_documents(owned, None).await?;
    let achieved_goals = goals
        .count_documents(doc! { "user_id": user.id, "progress": { "$gte": 100 } }, None)
        .await?;

    Ok(Json(json!({
        "tasks": {
            "total": total_tasks,
            "completed": completed_tasks,
            "completion_rate": completion_rate,
        },
        "habits": {
            "total": total_habits,
            "total_check_ins": total_check_ins,
        },
        "goals": {
            "total": total_goals,
            "achieved": achieved_goals,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64_accepts_numeric_bson() {
        assert_eq!(as_i64(&Bson::Int32(7)), 7);
        assert_eq!(as_i64(&Bson::Int64(42)), 42);
        assert_eq!(as_i64(&Bson::Double(3.9)), 3);
        assert_eq!(as_i64(&Bson::Null), 0);
    }
}
