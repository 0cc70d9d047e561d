//! `GET /v1/feeds/{partner}/{destination}.{ext}?token=...` (C9 public
//! surface). Grounded on
//! `original_source/app/api/v1/endpoints/public_feeds.py`: token-gated,
//! conditional-GET aware, gzip-capable, rate-limited static file serving
//! over the latest `FeedSnapshot`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use hub_common::HubError;

use crate::error::ApiError;
use crate::state::AppState;

const RATE_LIMIT_PER_MINUTE: u32 = 60;
const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub token: Option<String>,
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "xml" => "application/xml",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

/// `{destination}.{ext}` path segments arrive pre-joined; split on the
/// last dot since destination names never contain one.
fn split_destination_ext(raw: &str) -> Option<(&str, &str)> {
    let idx = raw.rfind('.')?;
    if idx == 0 || idx == raw.len() - 1 {
        return None;
    }
    Some((&raw[..idx], &raw[idx + 1..]))
}

fn matches_if_none_match(header_value: &str, etag: &str) -> bool {
    if header_value.trim() == "*" {
        return true;
    }
    header_value.split(',').any(|candidate| {
        let candidate = candidate.trim().trim_start_matches("W/");
        candidate == etag
    })
}

pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    axum::extract::Path((partner_id, destination_ext)): axum::extract::Path<(Uuid, String)>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (destination, ext) = split_destination_ext(&destination_ext)
        .ok_or_else(|| HubError::validation("feed path must end in .<ext>"))?;

    let plugin = state.feed_plugins.get(destination)?;
    if !plugin.format().eq_ignore_ascii_case(ext) {
        return Err(HubError::not_found(format!("no hosted feed available as .{ext}")).into());
    }

    let token = query
        .token
        .ok_or_else(|| HubError::validation("token query parameter is required"))?;

    let setting = state
        .destination_settings
        .get_by_partner(partner_id, destination)
        .await?
        .ok_or_else(|| HubError::not_found("feed not found"))?;

    if !setting.is_enabled {
        return Err(HubError::not_found("feed not found").into());
    }

    let expected_token = setting.config.get("feed_token").and_then(|v| v.as_str());
    if expected_token != Some(token.as_str()) {
        return Err(HubError::forbidden("invalid feed token").into());
    }

    if let Some(limiter) = &state.rate_limiter {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let token_fp = hex::encode(hasher.finalize());
        let bucket = format!("public_feed:{partner_id}:{destination}:{}", &token_fp[..16]);

        let result = limiter
            .allow(&bucket, RATE_LIMIT_PER_MINUTE, RATE_LIMIT_WINDOW_SECONDS)
            .await
            .map_err(|e| HubError::Other(anyhow::anyhow!("rate limiter unavailable: {e}")))?;

        if !result.allowed {
            let mut resp = StatusCode::TOO_MANY_REQUESTS.into_response();
            let h = resp.headers_mut();
            insert_header(h, "retry-after", &result.reset_seconds.to_string());
            insert_header(h, "x-ratelimit-limit", &RATE_LIMIT_PER_MINUTE.to_string());
            insert_header(h, "x-ratelimit-remaining", &result.remaining.to_string());
            insert_header(h, "x-ratelimit-reset", &result.reset_seconds.to_string());
            return Ok(resp);
        }
    }

    let snapshot = state
        .feed_snapshots
        .latest(partner_id, destination)
        .await?
        .ok_or_else(|| HubError::not_found("feed has not been built yet"))?;

    let etag = format!("\"{}\"", snapshot.content_hash);

    if let Some(inm) = headers.get("if-none-match").and_then(|v| v.to_str().ok()) {
        if matches_if_none_match(inm, &etag) {
            let mut resp = StatusCode::NOT_MODIFIED.into_response();
            insert_header(resp.headers_mut(), "etag", &etag);
            return Ok(resp);
        }
    }

    let accepts_gzip = headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    let (uri, gzipped) = match (&snapshot.gzip_storage_uri, accepts_gzip) {
        (Some(gz), true) => (gz.clone(), true),
        _ => (snapshot.storage_uri.clone(), false),
    };

    let path = state.object_store.resolve_path(&uri)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| HubError::Other(anyhow::anyhow!("cannot read feed snapshot at {}: {e}", path.display())))?;

    let mut resp = (StatusCode::OK, bytes).into_response();
    let h = resp.headers_mut();
    insert_header(h, "content-type", content_type_for(&snapshot.format));
    insert_header(h, "etag", &etag);
    insert_header(h, "cache-control", "public, max-age=60");
    insert_header(h, "last-modified", &snapshot.created_at.to_rfc2822());
    insert_header(h, "vary", "Accept-Encoding");
    if gzipped {
        insert_header(h, "content-encoding", "gzip");
    }

    Ok(resp)
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), v);
    }
}
