//! Relay stream to SSE response conversion.

use std::convert::Infallible;

use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::relay::RelayStream;

/// Encode every relay frame as one unnamed SSE `data:` event.
///
/// `X-Accel-Buffering: no` keeps reverse proxies from holding tokens back.
pub fn to_sse_response(stream: RelayStream) -> Response {
    let events = stream.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_json())));

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
