use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Duration;
use tracing::info;

use slotboard::config::AppConfig;
use slotboard::error::AppError;
use slotboard::telemetry;
use slotboard::workflows::booking::{BookingService, MemoryBookingStore};
use slotboard::workflows::notify::{
    DeliveryPolicy, DeliveryWorker, FallbackRegistry, JobQueue, Notifier,
};

use crate::cli::ServeArgs;
use crate::infra::{AppState, BoardPublisher, LoggingChannels, LoggingMessenger, StoreIdentityResolver};
use crate::routes::{with_booking_routes, ApiContext};
use crate::session::SessionRegistry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryBookingStore::new());
    let queue = Arc::new(JobQueue::new());
    let registry = Arc::new(FallbackRegistry::new());
    let policy = DeliveryPolicy::from(&config.booking.delivery);
    let notifier = Arc::new(Notifier::new(queue.clone(), registry.clone(), policy.clone()));
    let boards = Arc::new(BoardPublisher::default());
    let service = Arc::new(BookingService::new(
        store.clone(),
        notifier,
        boards.clone(),
    ));

    let worker = DeliveryWorker::new(
        queue.clone(),
        registry,
        Arc::new(LoggingMessenger),
        Arc::new(LoggingChannels::default()),
        store.clone(),
        policy,
    );
    let poll = std::time::Duration::from_secs(config.booking.delivery.poll_interval_secs);
    tokio::spawn(worker.run(poll));

    let context = ApiContext {
        service,
        queue,
        boards,
        sessions: Arc::new(SessionRegistry::new(Duration::seconds(
            config.booking.session_ttl_secs as i64,
        ))),
        resolver: Arc::new(StoreIdentityResolver::new(store)),
    };

    let app = with_booking_routes(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "booking allocation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
