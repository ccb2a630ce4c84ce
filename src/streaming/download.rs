//! Download handler.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Response,
};
use streamgate_common::{Error, Result};

use super::range::{download_name, plan_range};
use crate::server::{AppContext, AppError};

/// Stream the object behind an opaque link, honouring `Range`.
pub async fn download(
    State(ctx): State<AppContext>,
    Path((opaque_id, _display_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> std::result::Result<Response, AppError> {
    serve(&ctx, opaque_id, &headers).await.map_err(AppError::from)
}

async fn serve(ctx: &AppContext, opaque_id: String, headers: &HeaderMap) -> Result<Response> {
    let tuple = streamgate_codec::decode_async(opaque_id).await?;
    if !tuple.is_complete() {
        return Err(Error::validation("link is missing the message id or hash"));
    }

    let index = ctx.dispatcher.pick();
    let engine = ctx
        .dispatcher
        .engine(index)
        .ok_or_else(|| Error::internal(format!("no engine for identity {index}")))?;

    let descriptor = engine.resolve(tuple.store_id, tuple.message_id).await?;
    if !descriptor.matches_hash(&tuple.verification_hash) {
        tracing::warn!(
            store_id = tuple.store_id,
            message_id = tuple.message_id,
            hash = %tuple.verification_hash,
            "Invalid hash, possible tampering"
        );
        return Err(Error::InvalidHash {
            message_id: tuple.message_id,
        });
    }

    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default());
    let plan = plan_range(descriptor.size, range, ctx.dispatcher.settings().chunk_size)?;
    let (file_name, mime) = download_name(&descriptor);

    // Session failures surface as a status code, not a broken body.
    if plan.chunks.part_count > 0 {
        engine.sessions().session_for(descriptor.dc_id).await?;
    }

    tracing::debug!(
        identity_index = index,
        message_id = tuple.message_id,
        from = plan.from,
        until = plan.until,
        size = plan.size,
        "Serving download"
    );

    let stream = engine.stream(descriptor, index, plan.chunks);
    plan.response(&mime, &file_name)
        .body(Body::from_stream(stream))
        .map_err(|e| Error::internal(e.to_string()))
}
