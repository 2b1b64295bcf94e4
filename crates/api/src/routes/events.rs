//! Server-sent event stream of one order.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use order_store::OrderStore;

use super::orders::{AppState, parse_order_id};
use crate::error::ApiError;

/// GET /orders/:id/events — status, route, position and arrival events.
///
/// A new subscriber first receives the current status and, if a drone is
/// flying, its route and last position.
#[tracing::instrument(skip(state))]
pub async fn stream<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let subscription = state.delivery.subscribe(order_id).await?;

    let events = subscription.map(|event| {
        let sse = Event::default().event(event.name());
        Ok(match sse.json_data(&event) {
            Ok(sse) => sse,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode order event");
                Event::default().comment("encoding error")
            }
        })
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
