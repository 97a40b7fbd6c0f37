//! Handlers for the batch store REST surface.
//!
//! Handlers are stateless apart from [`AppState`]: every request that needs
//! validation builds its own transient validator over the shared store.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cairn_chunks::{ChunkStore, LocalBatchStore, StoreError};
use cairn_protocol::{
    decode_chunks, decode_ref_form, decode_write_body, encode_chunks, encode_has_response,
    encode_hash_list, gunzip, gzip, names_gzip, ProtocolError, GZIP,
};
use cairn_sync::{reachable_chunks, ChunkStoreSource};
use cairn_types::{Chunk, Hash};
use cairn_values::ValueStore;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChunkStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn ChunkStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RootParams {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub last: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefParams {
    pub all: Option<String>,
    pub exclude: Option<String>,
}

fn header_names_gzip(headers: &HeaderMap, name: HeaderName) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(names_gzip)
}

/// The request body, decompressed if it was sent gzipped.
fn request_body(headers: &HeaderMap, body: Bytes) -> ServerResult<Bytes> {
    if header_names_gzip(headers, CONTENT_ENCODING) {
        Ok(Bytes::from(gunzip(&body)?))
    } else {
        Ok(body)
    }
}

/// A chunk-stream response, gzipped if the client accepts it.
fn chunk_response(headers: &HeaderMap, body: Bytes) -> ServerResult<Response> {
    if header_names_gzip(headers, ACCEPT_ENCODING) {
        let packed = gzip(&body)?;
        Ok((
            StatusCode::OK,
            [(CONTENT_TYPE, "application/octet-stream"), (CONTENT_ENCODING, GZIP)],
            packed,
        )
            .into_response())
    } else {
        Ok((StatusCode::OK, [(CONTENT_TYPE, "application/octet-stream")], body).into_response())
    }
}

fn parse_hash(s: &str) -> ServerResult<Hash> {
    Hash::parse_or_empty(s).map_err(|e| ProtocolError::from(e).into())
}

/// Store validated chunks, answering 201, or 429 naming the chunks the
/// store could not take yet.
async fn store_chunks(state: &AppState, chunks: Vec<Chunk>) -> ServerResult<Response> {
    let count = chunks.len();
    match state.store.put_many(chunks).await {
        Ok(()) => {
            debug!(count, "chunks stored");
            Ok(StatusCode::CREATED.into_response())
        }
        Err(StoreError::Backpressure(hashes)) => {
            warn!(count, rejected = hashes.len(), "backpressure, asking client to resend");
            Ok((StatusCode::TOO_MANY_REQUESTS, encode_hash_list(hashes.iter())).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /getRefs`: stream back the requested chunks that exist.
pub async fn get_refs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let body = request_body(&headers, body)?;
    let hashes = decode_ref_form(&body)?;
    let mut found = Vec::with_capacity(hashes.len());
    for h in &hashes {
        if let Some(chunk) = state.store.get(h).await? {
            found.push(chunk);
        }
    }
    debug!(requested = hashes.len(), found = found.len(), "getRefs");
    chunk_response(&headers, encode_chunks(&found))
}

/// `POST /hasRefs`: one `"<hash> <true|false>"` line per requested hash.
pub async fn has_refs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let body = request_body(&headers, body)?;
    let hashes = decode_ref_form(&body)?;
    let mut answers = Vec::with_capacity(hashes.len());
    for h in hashes {
        answers.push((h, state.store.has(&h).await?));
    }
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain")],
        encode_has_response(&answers),
    )
        .into_response())
}

/// `POST /writeValue`: validate each incoming chunk against the store, then
/// store them all at once.
///
/// The validator is primed by reading every hint, so refs into hinted
/// subtrees are accepted without further I/O. Chunks must arrive children
/// first.
pub async fn write_value(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let body = request_body(&headers, body)?;
    let (hints, reader) = decode_write_body(body)?;
    let validator = ValueStore::new(Arc::new(LocalBatchStore::new(state.store.clone())));
    for hint in &hints {
        if validator.read_value(hint).await?.is_none() {
            debug!(hint = %hint, "hint names an unknown chunk");
        }
    }

    let mut chunks = Vec::new();
    for chunk in reader {
        let chunk = chunk?;
        validator.validate_chunk(&chunk).await?;
        chunks.push(chunk);
    }
    debug!(chunks = chunks.len(), hints = hints.len(), "writeValue validated");
    store_chunks(&state, chunks).await
}

/// `GET /root`: the current root hash as text.
pub async fn get_root(State(state): State<AppState>) -> ServerResult<String> {
    Ok(state.store.root().await?.to_string())
}

/// `POST /root?current=&last=`: compare-and-swap. 200 on success, 409 with
/// the actual root otherwise.
pub async fn post_root(
    State(state): State<AppState>,
    Query(params): Query<RootParams>,
) -> ServerResult<Response> {
    let current = parse_hash(&params.current)?;
    let last = parse_hash(&params.last)?;
    if state.store.update_root(current, last).await? {
        info!(root = %current, "root updated");
        Ok(StatusCode::OK.into_response())
    } else {
        let actual = state.store.root().await?;
        debug!(expected = %last, actual = %actual, "root CAS failed");
        Ok((StatusCode::CONFLICT, actual.to_string()).into_response())
    }
}

/// `POST /postRefs`: unvalidated bulk import, for trusted servers only.
pub async fn post_refs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    if !state.config.trusted_bulk_import {
        return Err(ServerError::Forbidden(
            "bulk import is disabled on this server".into(),
        ));
    }
    let body = request_body(&headers, body)?;
    let chunks = decode_chunks(body)?;
    warn!(count = chunks.len(), "storing chunks without validation");
    store_chunks(&state, chunks).await
}

/// `GET /ref/:hash`: the chunk itself, or with `all=true` every chunk
/// reachable from it and not from `exclude`, children first.
pub async fn get_ref(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(params): Query<RefParams>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let hash = parse_hash(&hash)?;
    if params.all.as_deref() != Some("true") {
        let chunk = state
            .store
            .get(&hash)
            .await?
            .ok_or_else(|| ServerError::NotFound(hash.to_string()))?;
        return Ok((
            StatusCode::OK,
            [(CONTENT_TYPE, "application/octet-stream")],
            chunk.data().clone(),
        )
            .into_response());
    }

    let exclude = parse_hash(params.exclude.as_deref().unwrap_or(""))?;
    let source = Arc::new(ChunkStoreSource::new(state.store.clone()));
    let chunks =
        reachable_chunks(source, hash, exclude, state.config.walk_concurrency).await?;
    debug!(root = %hash, exclude = %exclude, count = chunks.len(), "streaming reachable chunks");
    chunk_response(&headers, encode_chunks(&chunks))
}
