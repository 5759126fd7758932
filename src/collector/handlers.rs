use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::overlay::prepare_stored_jpeg;
use super::server::ServerState;
use crate::collector::store::ImageStore;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ImageEntry {
    #[serde(rename = "Name")]
    pub name: String,
}

/// `POST /Images/UploadImage`: stamp, persist and acknowledge one image.
///
/// The file name comes from the server clock, not from anything the agent
/// sent. The acknowledgement carries the collector's configured cadence,
/// which agents adopt as their upload interval.
pub async fn upload_image_handler(State(state): State<ServerState>, body: Bytes) -> Response {
    let received_at = Utc::now();

    let stored = match prepare_stored_jpeg(&body, received_at, &state.config) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Rejected upload ({} bytes): {}", body.len(), e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let name = ImageStore::file_name_for(received_at);
    if let Err(e) = state.store.save(&name, &stored).await {
        error!("Failed to persist {}: {}", name, e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    info!("Stored upload as {} ({} bytes)", name, stored.len());
    Json(serde_json::json!({ "Duration": state.config.duration_seconds })).into_response()
}

/// `GET /Images?date=YYYY-MM-DD`: names of that day's images, newest first
pub async fn list_images_handler(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let date = match NaiveDate::parse_from_str(&query.date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid date: {:?}", query.date),
            )
                .into_response();
        }
    };

    match state.store.list_by_date(date).await {
        Ok(names) => {
            let entries: Vec<ImageEntry> = names
                .into_iter()
                .map(|name| ImageEntry { name })
                .collect();
            Json(entries).into_response()
        }
        Err(e) => {
            error!("Failed to list images for {}: {}", date, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// `POST /Images/DeleteImage?fileName=F`: remove one image.
///
/// Idempotent: deleting a name that is already gone is a success, the caller
/// asked for an end state that now holds either way.
pub async fn delete_image_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    if ImageStore::sanitize_name(&query.file_name).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            format!("invalid file name: {:?}", query.file_name),
        )
            .into_response();
    }

    match state.store.delete(&query.file_name).await {
        Ok(()) => {
            info!("Deleted {}", query.file_name);
            Json("").into_response()
        }
        Err(e) => {
            error!("Failed to delete {}: {}", query.file_name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
