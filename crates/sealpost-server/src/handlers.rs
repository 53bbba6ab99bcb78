//! HTTP handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;

use crate::{
    AppState, auth,
    config::FUNCTION_KEY,
    flow::RequestFlow,
};

/// Query parameters accepted by the encrypt endpoint.
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    /// Function key, the query-parameter form
    code: Option<String>,
}

/// Optional JSON envelope some clients send as the body.
///
/// The `passPhrase` field is parsed through an explicit schema and
/// deliberately NOT applied to the signing key: the configured passphrase
/// is authoritative. Applying a per-request passphrase would silently
/// change which key material a deployment trusts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestEnvelope {
    pass_phrase: Option<String>,
}

/// `POST /encrypt`: body in, encrypted-and-signed OpenPGP message out.
pub async fn handle_encrypt(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let function_key = state.secrets.get(FUNCTION_KEY);
    if let Err(err) = auth::authorize(&headers, query.code.as_deref(), function_key.as_deref()) {
        return err.into_response();
    }

    if let Ok(envelope) = serde_json::from_slice::<RequestEnvelope>(&body) {
        if envelope.pass_phrase.is_some() {
            tracing::debug!(
                "request body carries a passPhrase field; signing uses the configured passphrase"
            );
        }
    }

    let mut flow = RequestFlow::new(state.secrets.as_ref(), state.options);
    match flow.run(&body, wall_clock_secs()) {
        Ok(message) => {
            let content_type = if state.options.armor {
                HeaderValue::from_static("text/plain; charset=utf-8")
            } else {
                HeaderValue::from_static("application/octet-stream")
            };
            let mut response = message.into_response();
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
            response
        },
        Err(err) => err.into_response(),
    }
}

/// `GET /health`: liveness probe.
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
    }))
}

/// Wall-clock seconds since the Unix epoch, stamped into signatures.
#[allow(clippy::disallowed_methods)]
#[allow(clippy::expect_used)]
fn wall_clock_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("invariant: system clock is after Unix epoch (1970-01-01)")
        .as_secs()
}
