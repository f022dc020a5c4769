use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::workflows::notify::NotificationGateway;

use super::announcement::AnnouncementSurface;
use super::domain::{ApplicationId, BlockId, CandidateId, EventId, PositionId, Slot};
use super::service::{BookingError, BookingService};
use super::store::{BookingStore, StoreError};

/// Router builder exposing the booking operations and query surface.
pub fn booking_router<S, N, P>(service: Arc<BookingService<S, N, P>>) -> Router
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    Router::new()
        .route("/api/v1/events", get(list_events_handler::<S, N, P>))
        .route(
            "/api/v1/events/:event",
            get(event_summary_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications",
            post(create_application_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications/:application/select",
            post(select_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications/:application/confirm",
            post(confirm_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications/:application/final-confirm",
            post(final_confirm_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications/:application/remind",
            post(remind_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/applications/:application/revoke",
            post(revoke_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/revoke-all",
            post(revoke_all_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/close-bookings",
            post(close_bookings_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/reject-unselected",
            post(reject_unselected_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/announce",
            post(announce_handler::<S, N, P>),
        )
        .route(
            "/api/v1/events/:event/backfill",
            get(backfill_candidates_handler::<S, N, P>).post(select_backfill_handler::<S, N, P>),
        )
        .route(
            "/api/v1/candidates/:cid/history",
            get(history_handler::<S, N, P>),
        )
        .with_state(service)
}

/// Candidate-facing concurrency conflicts collapse to a generic retry
/// message; everything else reports the specific typed error.
fn error_response(error: &BookingError, candidate_facing: bool) -> Response {
    let status = match error {
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::Store(StoreError::EventNotFound | StoreError::CandidateNotFound) => {
            StatusCode::NOT_FOUND
        }
        BookingError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BookingError::Announcement(_) => StatusCode::BAD_GATEWAY,
        error if error.is_conflict() => StatusCode::CONFLICT,
        error if error.is_eligibility() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if candidate_facing && error.is_conflict() {
        "slot state changed, please try again".to_string()
    } else {
        error.to_string()
    };
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateApplicationRequest {
    cid: u32,
    position: u64,
    block: u64,
}

#[derive(Debug, Deserialize)]
struct CandidateRequest {
    cid: u32,
}

#[derive(Debug, Deserialize)]
struct SlotQuery {
    position: u64,
    block: u64,
}

#[derive(Debug, Deserialize)]
struct BackfillRequest {
    cid: u32,
    position: u64,
    block: u64,
}

async fn list_events_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.list_events() {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn event_summary_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.event_summary(EventId(event)) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn create_application_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
    Json(request): Json<CreateApplicationRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    let slot = Slot {
        position: PositionId(request.position),
        block: BlockId(request.block),
    };
    match service.create_application(CandidateId(request.cid), EventId(event), slot) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error_response(&error, true),
    }
}

async fn select_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path((event, application)): Path<(u64, u64)>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.select_candidate(EventId(event), ApplicationId(application)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn confirm_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path((event, application)): Path<(u64, u64)>,
    Json(request): Json<CandidateRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.confirm(
        CandidateId(request.cid),
        EventId(event),
        ApplicationId(application),
    ) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(&error, true),
    }
}

async fn final_confirm_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path((event, application)): Path<(u64, u64)>,
    Json(request): Json<CandidateRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.final_confirm(
        CandidateId(request.cid),
        EventId(event),
        ApplicationId(application),
    ) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(&error, true),
    }
}

async fn remind_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path((event, application)): Path<(u64, u64)>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.remind(EventId(event), ApplicationId(application)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn revoke_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path((event, application)): Path<(u64, u64)>,
    Json(request): Json<CandidateRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.revoke(
        CandidateId(request.cid),
        EventId(event),
        ApplicationId(application),
    ) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(&error, true),
    }
}

async fn revoke_all_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
    Json(request): Json<CandidateRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.revoke_all(CandidateId(request.cid), EventId(event)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(&error, true),
    }
}

async fn close_bookings_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.close_bookings(EventId(event)) {
        Ok(rejected) => (StatusCode::OK, Json(json!({ "rejected": rejected }))).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn reject_unselected_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.reject_unselected(EventId(event)) {
        Ok(notified) => (StatusCode::OK, Json(json!({ "notified": notified }))).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn announce_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.announce(EventId(event)) {
        Ok(handle) => (StatusCode::OK, Json(handle)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn backfill_candidates_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
    Query(query): Query<SlotQuery>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    let slot = Slot {
        position: PositionId(query.position),
        block: BlockId(query.block),
    };
    match service.backfill_candidates(EventId(event), slot) {
        Ok(candidates) => (StatusCode::OK, Json(candidates)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn select_backfill_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(event): Path<u64>,
    Json(request): Json<BackfillRequest>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    let slot = Slot {
        position: PositionId(request.position),
        block: BlockId(request.block),
    };
    match service.select_backfill(EventId(event), CandidateId(request.cid), slot) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(&error, false),
    }
}

async fn history_handler<S, N, P>(
    State(service): State<Arc<BookingService<S, N, P>>>,
    Path(cid): Path<u32>,
) -> Response
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    match service.candidate_history(CandidateId(cid)) {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(error) => error_response(&error, false),
    }
}
