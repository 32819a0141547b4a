//! Signed object transfer endpoints.
//! Streams bodies in both directions so payloads are never buffered in
//! memory. Access is granted solely by the `expires`/`signature` pair minted
//! by `LocalObjectStore::signed_url`.

use crate::{
    errors::AppError,
    services::object_store::{SignedMethod, StoreError},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Query params carried by every signed URL.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// `PUT /objects/{*path}`: store the request body. Single use: a second PUT
/// to the same path is refused.
pub async fn put_object(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<SignedQuery>, QueryRejection>,
    body: Body,
) -> Result<StatusCode, AppError> {
    let (Path(path), Query(query)) = (path?, query?);
    state
        .objects
        .verify(SignedMethod::Put, &path, query.expires, &query.signature)
        .map_err(store_error)?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let size = state
        .objects
        .put_object_stream(&path, stream)
        .await
        .map_err(store_error)?;
    debug!(%path, size, "stored object");
    Ok(StatusCode::OK)
}

/// `GET /objects/{*path}`: stream the stored object back.
pub async fn get_object(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let (Path(path), Query(query)) = (path?, query?);
    state
        .objects
        .verify(SignedMethod::Get, &path, query.expires, &query.signature)
        .map_err(store_error)?;

    let (file, len) = state.objects.open_object(&path).await.map_err(store_error)?;
    debug!(%path, len, "serving object");

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// Transfer-edge mapping: signature, reuse and path problems are the
/// caller's, only I/O is internal.
fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::BadSignature => AppError::Forbidden(err.to_string()),
        StoreError::AlreadyExists(_) => {
            AppError::Forbidden(format!("{err}; upload URLs are single-use"))
        }
        StoreError::NotFound(_) => AppError::not_found(err.to_string()),
        StoreError::InvalidPath | StoreError::TooLarge(_) => AppError::invalid(err.to_string()),
        StoreError::Url(_) | StoreError::Io(_) => AppError::from(err),
    }
}
