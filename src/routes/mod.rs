//! Route groups mounted under `/api`.

pub mod analytics;
pub mod auth;
pub mod goals;
pub mod habits;
pub mod tasks;

use mongodb::bson::oid::ObjectId;

use crate::error::AppError;

/// Parse a path segment as a document id.
pub(crate) fn parse_object_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::BadRequest(format!("Invalid id: {id}")))
}
