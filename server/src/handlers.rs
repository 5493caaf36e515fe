#![allow(clippy::unused_async)]
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::response::{Html, IntoResponse};
use axum::Json;
use kernel::{CheckRoomRequest, RoomList, RoomStatus};

use crate::error::AppError;
use crate::file_reply::ZipReply;
use crate::jobs::SearchOutcome;
use crate::orchestrator::{Orchestrator, ReferencePhoto, MAX_UPLOAD_PHOTOS};
use crate::pages;

const ROOM_FIELD: &str = "roomId";
const PHOTOS_FIELD: &str = "photos";
const PHOTO_FIELD: &str = "photo";

/// Uploads photos into a room and clusters the room.
#[utoipa::path(
    post,
    path = "/upload",
    responses(
        (status = 200, description = "Photos clustered", body = String, content_type = "text/html"),
        (status = 400, description = "Room id or files missing", body = String),
        (status = 500, description = "Clustering engine failed with this output", body = String),
        (status = 504, description = "Clustering engine timed out", body = String)
    ),
    tag = "rooms",
)]
pub async fn upload(
    State(genie): State<Arc<Orchestrator>>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut room_id = None;
    let mut photos = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(ROOM_FIELD) => room_id = Some(field.text().await?),
            Some(PHOTOS_FIELD) => {
                if photos.len() == MAX_UPLOAD_PHOTOS {
                    return Err(AppError::Validation(format!(
                        "Too many files, at most {MAX_UPLOAD_PHOTOS} photos per upload"
                    )));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let staged = genie.store().stage(&file_name, field).await?;
                tracing::debug!("file: {} read: {}", staged.original_name(), staged.size());
                photos.push(staged);
            }
            other => tracing::debug!("ignoring form field {other:?}"),
        }
    }

    let raw_output = genie.upload(room_id.clone(), photos).await?;
    Ok(Html(pages::clustering_complete(
        room_id.as_deref().unwrap_or_default(),
        &raw_output,
    )))
}

/// Finds the cluster matching a reference photo.
#[utoipa::path(
    post,
    path = "/search",
    responses(
        (status = 200, description = "Match gallery", body = String, content_type = "text/html"),
        (status = 400, description = "Room id or photo missing", body = String),
        (status = 404, description = "Room unknown", body = String),
        (status = 413, description = "Photo larger than the search limit", body = String),
        (status = 500, description = "Clustering engine failed", body = String),
        (status = 502, description = "Clustering engine answer unreadable", body = String),
        (status = 504, description = "Clustering engine timed out", body = String)
    ),
    tag = "rooms",
)]
pub async fn search(
    State(genie): State<Arc<Orchestrator>>,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut room_id = None;
    let mut photo = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(ROOM_FIELD) => room_id = Some(field.text().await?),
            Some(PHOTO_FIELD) => {
                if photo.is_some() {
                    return Err(AppError::Validation(
                        "Exactly one photo is expected for search!".into(),
                    ));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let limit = genie.max_reference_bytes();
                let Some(data) = read_limited(field, limit).await? else {
                    let reason = format!("Search photo is larger than {limit} bytes");
                    return Err(AppError::TooLarge(reason));
                };
                photo = Some(ReferencePhoto {
                    name: file_name,
                    data,
                });
            }
            other => tracing::debug!("ignoring form field {other:?}"),
        }
    }

    let page = match genie.search(room_id, photo).await? {
        (room_id, SearchOutcome::Match { cluster, images }) => {
            pages::search_results(&room_id, &cluster, &images)
        }
        (_, SearchOutcome::NoMatch) => pages::no_match(),
    };
    Ok(Html(page))
}

/// Buffers a form field holding at most `limit` bytes. A larger field is
/// still read to its end so the reply reaches the client, but nothing of it is kept.
async fn read_limited(mut field: Field<'_>, limit: usize) -> Result<Option<Bytes>, AppError> {
    let mut data = Vec::new();
    let mut oversized = false;
    while let Some(chunk) = field.chunk().await? {
        if oversized || data.len() + chunk.len() > limit {
            oversized = true;
            data = Vec::new();
        } else {
            data.extend_from_slice(&chunk);
        }
    }
    Ok((!oversized).then(|| Bytes::from(data)))
}

/// Lists all known rooms
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses(
        (status = 200, description = "List all rooms successfully", body = RoomList),
    ),
)]
pub async fn get_rooms(State(genie): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(RoomList {
        rooms: genie.rooms(),
    })
}

/// Checks whether a room exists
#[utoipa::path(
    post,
    path = "/check-room",
    tag = "rooms",
    request_body = CheckRoomRequest,
    responses(
        (status = 200, description = "Room membership", body = RoomStatus),
    ),
)]
pub async fn check_room(
    State(genie): State<Arc<Orchestrator>>,
    Json(request): Json<CheckRoomRequest>,
) -> impl IntoResponse {
    let exists = genie.check_room(request.room_id.as_deref());
    tracing::debug!("check room {:?}: {exists}", request.room_id);
    Json(RoomStatus { exists })
}

/// Downloads every photo of a cluster as a zip archive
#[utoipa::path(
    get,
    path = "/download/{room_id}/{cluster}",
    responses(
        (status = 200, response = crate::file_reply::ZipDoc),
        (status = 404, description = "Cluster not found", body = String)
    ),
    tag = "clusters",
    params(
        ("room_id" = String, Path, description = "Room id"),
        ("cluster" = String, Path, description = "Cluster name produced by the engine")
    ),
)]
pub async fn download(
    Path((room_id, cluster)): Path<(String, String)>,
    State(genie): State<Arc<Orchestrator>>,
) -> Result<impl IntoResponse, AppError> {
    let stream = genie.archive(&room_id, &cluster).await?;
    Ok(ZipReply::new(&cluster, stream))
}
