//! Share HTTP Routes
//!
//! Upload, link management, revocation and link resolution. Owner-scoped
//! endpoints authenticate the bearer token into an [`Actor`] and hand it to
//! the share service; link resolution needs no identity at all.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::ratelimit::{RateLimitLayer, RateLimiter};
use crate::auth::{Actor, AuthError, JwtManager};
use crate::config::DeliveryMode;
use crate::observability::{audit, AuditAction};
use crate::sharing::{Rejection, ShareError, ShareService, StoredObject, DEFAULT_CONTENT_TYPE};
use crate::store::{LocalObjectStore, StoreError};

/// Allowance for multipart framing on top of the file itself
pub(crate) const MULTIPART_OVERHEAD: u64 = 64 * 1024;

// ==================
// Shared State
// ==================

/// Share state shared across handlers
#[derive(Debug)]
pub struct ShareState {
    pub service: ShareService,
    pub jwt: JwtManager,
    /// Serves `/blobs` when the local store backs the service
    pub blobs: Option<Arc<LocalObjectStore>>,
    pub public_base_url: String,
    pub delivery: DeliveryMode,
    pub redirect_ttl_seconds: u64,
    /// Applied to `POST /upload`; `None` disables limiting
    pub upload_limiter: Option<Arc<RateLimiter>>,
}

impl ShareState {
    fn download_url(&self, token: &str) -> String {
        format!("{}/files/{}", self.public_base_url.trim_end_matches('/'), token)
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub download_url: String,
    pub expires_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub object_key: String,
    pub download_url: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct ObjectResponse {
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub revoked: bool,
    pub revoked_at: Option<String>,
}

impl From<&StoredObject> for ObjectResponse {
    fn from(object: &StoredObject) -> Self {
        Self {
            object_key: object.object_key.clone(),
            filename: object.original_filename.clone(),
            content_type: object.content_type.clone(),
            size_bytes: object.size_bytes,
            created_at: object.created_at.to_rfc3339(),
            revoked: object.revoked,
            revoked_at: object.revoked_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ObjectsListResponse {
    pub objects: Vec<ObjectResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ObjectDetailsResponse {
    #[serde(flatten)]
    pub object: ObjectResponse,
    /// The store still holds the bytes
    pub stored: bool,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub object_key: String,
    pub revoked: bool,
    pub revoked_at: Option<String>,
    pub already_revoked: bool,
    pub acl_tightened: bool,
}

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub expires: i64,
    pub signature: String,
}

// ==================
// Share Routes
// ==================

/// Create share routes
pub fn share_routes(state: Arc<ShareState>) -> Router {
    let upload_limit = RateLimitLayer::new(state.upload_limiter.clone());

    Router::new()
        .route("/upload", post(upload_handler).route_layer(upload_limit))
        .route("/objects", get(list_objects_handler))
        .route("/objects/:object_key", get(describe_object_handler))
        .route("/objects/:object_key/links", post(create_link_handler))
        .route("/revoke/:object_key", post(revoke_handler))
        .route("/files/:token", get(fetch_handler))
        .route("/blobs/*key", get(blob_handler))
        .with_state(state)
}

// ==================
// Helper Functions
// ==================

fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: status.as_u16(),
        }),
    )
}

fn share_error(e: ShareError) -> ApiError {
    let code = e.status_code();
    let object_key = e.object_key().unwrap_or("-");
    if code >= 500 {
        tracing::error!(error = %e, object_key, "share request failed");
    } else {
        tracing::debug!(error = %e, object_key, "share request refused");
    }
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, e.public_message())
}

fn auth_error(e: AuthError) -> ApiError {
    tracing::debug!(error = %e, "authentication failed");
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::UNAUTHORIZED);
    error_response(status, e.to_string())
}

fn multipart_error(e: MultipartError) -> ApiError {
    error_response(e.status(), e.body_text())
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::PermissionDenied(_) => {
            error_response(StatusCode::FORBIDDEN, "Link is invalid or has expired")
        }
        StoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Object not found"),
        StoreError::InvalidKey(_) => error_response(StatusCode::BAD_REQUEST, "Invalid object key"),
        other => {
            tracing::error!(error = %other, "presigned read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Object store unavailable")
        }
    }
}

fn authenticate(state: &ShareState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state.jwt.authenticate(authorization).map_err(auth_error)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// `attachment` disposition with a header-safe filename
fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ==================
// Upload Handler
// ==================

async fn upload_handler(
    State(state): State<Arc<ShareState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    let max_size = state.service.policy().max_size;

    // Refuse oversized requests before reading the body
    if let Err(e) = state
        .service
        .policy()
        .check_declared_size(declared_length(&headers).map(|n| n.saturating_sub(MULTIPART_OVERHEAD)))
    {
        audit(AuditAction::UploadRejected, None, Some(&actor.id), &e.to_string());
        return Err(share_error(e));
    }

    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut ttl_seconds: Option<i64> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);

                let mut buf = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    let size = (buf.len() + chunk.len()) as u64;
                    if size > max_size {
                        let e = ShareError::from(Rejection::TooLarge {
                            size,
                            max: max_size,
                        });
                        audit(AuditAction::UploadRejected, None, Some(&actor.id), &e.to_string());
                        return Err(share_error(e));
                    }
                    buf.extend_from_slice(&chunk);
                }
                file = Some((filename, content_type, buf.freeze()));
            }
            "ttl_seconds" | "expiry" => {
                let raw = field.text().await.map_err(multipart_error)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    ttl_seconds = Some(raw.parse().map_err(|_| {
                        error_response(StatusCode::BAD_REQUEST, format!("{} must be an integer", name))
                    })?);
                }
            }
            _ => {}
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No file provided"))?;

    let receipt = state
        .service
        .upload(&actor.id, &filename, content_type.as_deref(), data, ttl_seconds)
        .await
        .map_err(share_error)?;

    tracing::info!(
        object_key = %receipt.object.object_key,
        owner = %actor.id,
        size_bytes = receipt.object.size_bytes,
        "upload stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            download_url: state.download_url(&receipt.token),
            expires_at: receipt.capability.expires_at.to_rfc3339(),
            object_key: receipt.object.object_key,
            filename: receipt.object.original_filename,
            content_type: receipt.object.content_type,
            size_bytes: receipt.object.size_bytes,
        }),
    ))
}

// ==================
// Object Handlers
// ==================

async fn list_objects_handler(
    State(state): State<Arc<ShareState>>,
    headers: HeaderMap,
) -> Result<Json<ObjectsListResponse>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let objects = state.service.list(&actor.id).map_err(share_error)?;
    let response: Vec<ObjectResponse> = objects.iter().map(ObjectResponse::from).collect();

    Ok(Json(ObjectsListResponse {
        total: response.len(),
        objects: response,
    }))
}

async fn describe_object_handler(
    State(state): State<Arc<ShareState>>,
    headers: HeaderMap,
    Path(object_key): Path<String>,
) -> Result<Json<ObjectDetailsResponse>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let details = state
        .service
        .describe(&actor.id, &object_key)
        .await
        .map_err(share_error)?;

    let head = details.head.as_ref();
    Ok(Json(ObjectDetailsResponse {
        object: ObjectResponse::from(&details.object),
        stored: head.is_some(),
        acl: head.map(|h| h.acl.as_str().to_string()),
        storage_class: head.map(|h| h.storage_class.clone()),
        last_modified: head.map(|h| h.last_modified.to_rfc3339()),
    }))
}

async fn create_link_handler(
    State(state): State<Arc<ShareState>>,
    headers: HeaderMap,
    Path(object_key): Path<String>,
    request: Option<Json<CreateLinkRequest>>,
) -> Result<(StatusCode, Json<LinkResponse>), ApiError> {
    let actor = authenticate(&state, &headers)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let issued = state
        .service
        .share(&actor.id, &object_key, request.ttl_seconds)
        .map_err(share_error)?;

    Ok((
        StatusCode::CREATED,
        Json(LinkResponse {
            download_url: state.download_url(&issued.token),
            expires_at: issued.capability.expires_at.to_rfc3339(),
            object_key,
        }),
    ))
}

async fn revoke_handler(
    State(state): State<Arc<ShareState>>,
    headers: HeaderMap,
    Path(object_key): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let actor = authenticate(&state, &headers)?;
    let receipt = state
        .service
        .revoke(&actor.id, &object_key)
        .await
        .map_err(share_error)?;

    Ok(Json(RevokeResponse {
        object_key: receipt.object.object_key,
        revoked: receipt.object.revoked,
        revoked_at: receipt.object.revoked_at.map(|at| at.to_rfc3339()),
        already_revoked: receipt.already_revoked,
        acl_tightened: receipt.acl_tightened,
    }))
}

// ==================
// Download Handlers
// ==================

async fn fetch_handler(
    State(state): State<Arc<ShareState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    if state.delivery == DeliveryMode::Redirect {
        let url = state
            .service
            .resolve_redirect(&token, state.redirect_ttl_seconds)
            .await
            .map_err(share_error)?;
        return Ok(Redirect::temporary(&url.url).into_response());
    }

    let resolved = state.service.resolve(&token).await.map_err(share_error)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&resolved.object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(resolved.data.len()));
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&resolved.object.original_filename),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((StatusCode::OK, response_headers, resolved.data).into_response())
}

async fn blob_handler(
    State(state): State<Arc<ShareState>>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
) -> Result<Response, ApiError> {
    let store = state
        .blobs
        .as_ref()
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Not found"))?;

    // The URL proves who minted it; the ledger decides whether it still counts
    store
        .verify_presigned(&key, query.expires, &query.signature)
        .map_err(store_error)?;
    state.service.ensure_live(&key).map_err(share_error)?;

    let (head, data) = store
        .get_presigned(&key, query.expires, &query.signature)
        .await
        .map_err(store_error)?;

    // Last gate before data leaves
    state.service.ensure_live(&key).map_err(share_error)?;
    audit(AuditAction::FetchServed, Some(&key), None, "presigned");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&head.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(data.len()));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((StatusCode::OK, response_headers, data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_is_header_safe() {
        let value = content_disposition("q\"uarterly report é.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"q_uarterly report _.pdf\""
        );
    }

    #[test]
    fn test_share_error_hides_backend_detail() {
        let (status, Json(body)) = share_error(ShareError::Ledger("disk full at /var/x".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.error.contains("/var/x"));
    }

    #[test]
    fn test_store_error_mapping() {
        let (status, _) = store_error(StoreError::PermissionDenied("k".into()));
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = store_error(StoreError::NotFound("k".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1024"));
        assert_eq!(declared_length(&headers), Some(1024));
    }
}
