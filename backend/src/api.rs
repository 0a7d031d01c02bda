//! HTTP surface: ingest, snapshot reads, the SSE stream and static files.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span, debug, info, warn};

use common::logger::{TraceId, child_span, root_span};
use pricing::{PriceStore, ProductId, Snapshot};
use scheduler::{CoalescingScheduler, SchedulerConfig, SnapshotSource};

use crate::error::{ApiError, ValidationError};
use crate::events::EventBus;
use crate::ingest::IncomingPrice;
use crate::source::StoreSnapshotSource;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PriceStore>,
    pub source: Arc<StoreSnapshotSource>,
    pub scheduler: CoalescingScheduler,
    pub events: EventBus,
}

impl AppState {
    /// Wires the store, snapshot source, event bus and scheduler together.
    ///
    /// The force ticker is not started here; callers own its task.
    pub fn new(store: Arc<dyn PriceStore>, cfg: SchedulerConfig, event_capacity: usize) -> Self {
        let source = Arc::new(StoreSnapshotSource::new(Arc::clone(&store)));
        let events = EventBus::new(event_capacity);
        let scheduler = CoalescingScheduler::new(cfg, source.clone(), Arc::new(events.clone()));

        Self {
            store,
            source,
            scheduler,
            events,
        }
    }
}

pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/incoming", post(ingest))
        .route("/prices", get(prices))
        .route("/spot", get(spot))
        .route("/events", get(events))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IncomingPrice>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let trace_id = TraceId::new();

    async move {
        let Json(body) = payload.map_err(|e| ValidationError::MalformedBody(e.body_text()))?;
        let observation = body.into_observation()?;

        let span = Span::current();
        span.record("product_id", observation.product_id);
        span.record("store_id", observation.store_id);

        state
            .store
            .record_observation(&observation)
            .instrument(child_span("persist"))
            .await
            .map_err(ApiError::Database)?;

        info!(
            source_id = observation.source_id,
            price = observation.price,
            observed_at = %observation.observed_at,
            "observation recorded"
        );

        state.scheduler.notify_update();

        Ok::<_, ApiError>(Json(json!({ "message": "Item added successfully" })))
    }
    .instrument(root_span("ingest", &trace_id))
    .await
}

#[derive(Debug, Deserialize)]
struct PricesQuery {
    product_id: Option<ProductId>,
}

async fn prices(
    State(state): State<AppState>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<Snapshot>, ApiError> {
    let snapshot = state.source.fetch(query.product_id).await?;
    Ok(Json(snapshot))
}

async fn spot(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let spot = state.store.latest_spot().await.map_err(ApiError::Database)?;
    Ok(Json(json!({ "spot": spot })))
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    debug!(subscribers = state.events.subscriber_count(), "event subscriber connected");

    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => Some(Ok(Event::default().event(event.name).data(&*event.data))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "event subscriber lagged; older snapshots dropped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}
