use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use slotboard::error::AppError;
use slotboard::workflows::booking::{
    booking_router, AdminContact, BlockId, Candidate, ChatUserId, ControllerRating, Event,
    EventId, EventStatus, Position, PositionId, Slot,
};
use slotboard::workflows::directory::{generate_blocks, IdentityError, IdentityResolver};
use slotboard::workflows::notify::JobQueue;

use crate::infra::{AppState, BoardPublisher, Service, StoreIdentityResolver};
use crate::session::{expand_selection, SessionError, SessionRegistry};

/// Everything the service-layer handlers need beyond the core router.
#[derive(Clone)]
pub(crate) struct ApiContext {
    pub(crate) service: Arc<Service>,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) boards: Arc<BoardPublisher>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) resolver: Arc<StoreIdentityResolver>,
}

pub(crate) fn with_booking_routes(context: ApiContext) -> Router {
    let service_routes = Router::new()
        .route("/api/v1/events", post(register_event))
        .route("/api/v1/events/:event/open", post(open_bookings))
        .route("/api/v1/events/:event/close", post(close_event))
        .route("/api/v1/events/:event/board", get(board))
        .route("/api/v1/candidates", post(register_candidate))
        .route("/api/v1/admins", post(register_admin))
        .route("/api/v1/notifications/failed", get(failed_notifications))
        .route("/api/v1/events/:event/session", post(begin_session))
        .route(
            "/api/v1/events/:event/session/:cid/blocks",
            post(session_blocks),
        )
        .route(
            "/api/v1/events/:event/session/:cid/positions",
            post(session_submit),
        )
        .with_state(context.clone());

    booking_router(context.service)
        .merge(service_routes)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn booking_error(error: slotboard::workflows::booking::BookingError) -> Response {
    AppError::Booking(error).into_response()
}

fn session_error(error: SessionError) -> Response {
    let status = match error {
        SessionError::NoSession => StatusCode::NOT_FOUND,
        SessionError::Expired => StatusCode::GONE,
        SessionError::WrongStage => StatusCode::CONFLICT,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

#[derive(Debug, Deserialize)]
struct PositionDefinition {
    id: u64,
    icao: String,
    designator: String,
    min_rating: String,
}

#[derive(Debug, Deserialize)]
struct RegisterEventRequest {
    id: u64,
    name: String,
    #[serde(default)]
    banner_url: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    block_minutes: u32,
    positions: Vec<PositionDefinition>,
}

async fn register_event(
    State(context): State<ApiContext>,
    Json(request): Json<RegisterEventRequest>,
) -> Response {
    let mut positions = Vec::with_capacity(request.positions.len());
    for definition in request.positions {
        let Some(min_rating) = ControllerRating::from_label(&definition.min_rating) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown rating '{}'", definition.min_rating) })),
            )
                .into_response();
        };
        positions.push(Position {
            id: PositionId(definition.id),
            icao: definition.icao.to_ascii_uppercase(),
            designator: definition.designator.to_ascii_uppercase(),
            min_rating,
        });
    }

    let blocks = generate_blocks(request.starts_at, request.ends_at, request.block_minutes);
    let event = Event {
        id: EventId(request.id),
        name: request.name,
        banner_url: request.banner_url,
        starts_at: request.starts_at,
        ends_at: request.ends_at,
        status: EventStatus::Draft,
        block_minutes: request.block_minutes,
    };

    match context.service.register_event(event, positions, blocks) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "event": request.id })),
        )
            .into_response(),
        Err(error) => booking_error(error),
    }
}

async fn open_bookings(State(context): State<ApiContext>, Path(event): Path<u64>) -> Response {
    match context.service.open_bookings(EventId(event)) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "open" }))).into_response(),
        Err(error) => booking_error(error),
    }
}

async fn close_event(State(context): State<ApiContext>, Path(event): Path<u64>) -> Response {
    match context.service.close_event(EventId(event)) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "closed" }))).into_response(),
        Err(error) => booking_error(error),
    }
}

async fn board(State(context): State<ApiContext>, Path(event): Path<u64>) -> Response {
    match context.boards.board(EventId(event)) {
        Some(text) => (StatusCode::OK, text).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "event has not been announced" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterCandidateRequest {
    cid: u32,
    chat_user: String,
    display_name: String,
    rating: String,
}

async fn register_candidate(
    State(context): State<ApiContext>,
    Json(request): Json<RegisterCandidateRequest>,
) -> Response {
    let Some(rating) = ControllerRating::from_label(&request.rating) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown rating '{}'", request.rating) })),
        )
            .into_response();
    };
    let candidate = Candidate::new(
        slotboard::workflows::booking::CandidateId(request.cid),
        ChatUserId(request.chat_user),
        request.display_name,
        rating,
    );
    match context.service.register_candidate(candidate) {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "cid": request.cid }))).into_response(),
        Err(error) => booking_error(error),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterAdminRequest {
    chat_user: String,
    display_name: String,
}

async fn register_admin(
    State(context): State<ApiContext>,
    Json(request): Json<RegisterAdminRequest>,
) -> Response {
    let admin = AdminContact {
        chat_user: ChatUserId(request.chat_user),
        display_name: request.display_name,
    };
    match context.service.register_admin(admin) {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "status": "registered" }))).into_response(),
        Err(error) => booking_error(error),
    }
}

async fn failed_notifications(State(context): State<ApiContext>) -> Response {
    (StatusCode::OK, Json(context.queue.failed())).into_response()
}

#[derive(Debug, Deserialize)]
struct BeginSessionRequest {
    chat_user: String,
}

async fn begin_session(
    State(context): State<ApiContext>,
    Path(event): Path<u64>,
    Json(request): Json<BeginSessionRequest>,
) -> Response {
    let identity = match context.resolver.resolve(&ChatUserId(request.chat_user)) {
        Ok(identity) => identity,
        Err(error @ IdentityError::UnlinkedAccount(_)) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response();
        }
        Err(error) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response();
        }
    };

    let now = Utc::now();
    context.sessions.purge_expired(now);
    context.sessions.begin(identity.cid, EventId(event), now);
    info!(event, cid = identity.cid.0, "selection session started");
    (
        StatusCode::CREATED,
        Json(json!({
            "cid": identity.cid.0,
            "display_name": identity.display_name,
            "rating": identity.rating.label(),
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SessionBlocksRequest {
    blocks: Vec<u64>,
}

async fn session_blocks(
    State(context): State<ApiContext>,
    Path((event, cid)): Path<(u64, u32)>,
    Json(request): Json<SessionBlocksRequest>,
) -> Response {
    let blocks: Vec<BlockId> = request.blocks.into_iter().map(BlockId).collect();
    if blocks.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "at least one block is required" })),
        )
            .into_response();
    }
    match context.sessions.choose_blocks(
        slotboard::workflows::booking::CandidateId(cid),
        EventId(event),
        blocks,
        Utc::now(),
    ) {
        Ok(()) => (StatusCode::OK, Json(json!({ "stage": "choose_positions" }))).into_response(),
        Err(error) => session_error(error),
    }
}

#[derive(Debug, Deserialize)]
struct SessionPositionsRequest {
    positions: Vec<u64>,
}

async fn session_submit(
    State(context): State<ApiContext>,
    Path((event, cid)): Path<(u64, u32)>,
    Json(request): Json<SessionPositionsRequest>,
) -> Response {
    let cid = slotboard::workflows::booking::CandidateId(cid);
    let event = EventId(event);
    let positions: Vec<PositionId> = request.positions.into_iter().map(PositionId).collect();
    if positions.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "at least one position is required" })),
        )
            .into_response();
    }

    let blocks = match context.sessions.take_selection(cid, event, Utc::now()) {
        Ok(blocks) => blocks,
        Err(error) => return session_error(error),
    };

    // Mirror the interactive flow: unavailable combinations are skipped
    // rather than failing the whole submission.
    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for (position, block) in expand_selection(&blocks, &positions) {
        let slot = Slot { position, block };
        match context.service.create_application(cid, event, slot) {
            Ok(view) => created.push(view),
            Err(error) if error.is_eligibility() || error.is_conflict() => {
                skipped.push(error.to_string());
            }
            Err(error) => return booking_error(error),
        }
    }

    (
        StatusCode::CREATED,
        Json(json!({ "created": created, "skipped": skipped })),
    )
        .into_response()
}
