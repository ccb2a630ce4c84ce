//! Status and health routes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppContext;

#[derive(Debug, Serialize)]
pub struct IdentityLoad {
    pub identity: String,
    pub load: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub server_status: &'static str,
    pub uptime: String,
    pub connected_identities: usize,
    /// Sorted by load, busiest first.
    pub loads: Vec<IdentityLoad>,
    pub version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let mut loads: Vec<IdentityLoad> = ctx
        .dispatcher
        .identity_loads()
        .into_iter()
        .map(|(identity, load)| IdentityLoad { identity, load })
        .collect();
    loads.sort_by(|a, b| b.load.cmp(&a.load));

    Json(StatusResponse {
        server_status: "running",
        uptime: readable_duration(ctx.started_at.elapsed().as_secs()),
        connected_identities: ctx.dispatcher.len(),
        loads,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `1d, 2h:3m:4s`, leaving out leading zero units.
pub fn readable_duration(secs: u64) -> String {
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    let clock = if hours > 0 || days > 0 {
        format!("{hours}h:{minutes}m:{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m:{seconds}s")
    } else {
        format!("{seconds}s")
    };

    if days > 0 {
        format!("{days}d, {clock}")
    } else {
        clock
    }
}
