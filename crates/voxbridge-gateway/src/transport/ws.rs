//! Carrier WebSocket ingress.
//!
//! The URL carries only the carrier-level call id; the tenant arrives later
//! inside the `start` frame. Non-upgrade requests are rejected by the
//! extractor itself, rate-limited IPs get a 429 with Retry-After, and a
//! second upgrade for a live call id gets a 409 before any upgrade happens.

use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::{app_state::AppState, call::session};

pub async fn media_upgrade(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(retry_after) = state.guard().check(addr.ip()).await {
        state
            .metrics()
            .upgrade_rejections
            .inc(&[("reason", "rate_limited")]);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "try again later",
        )
            .into_response();
    }

    if !state.registry().try_claim(&call_sid) {
        state
            .metrics()
            .upgrade_rejections
            .inc(&[("reason", "duplicate_call")]);
        return (StatusCode::CONFLICT, "call already active").into_response();
    }

    let st = state.clone();
    ws.on_upgrade(move |socket| async move {
        let span = tracing::info_span!("call", call = %call_sid);
        st.metrics().calls_active.inc(&[]);
        session::run(st.clone(), &call_sid, socket).instrument(span).await;
        st.metrics().calls_active.dec(&[]);
        st.registry().release(&call_sid);
    })
}
