pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod record;
pub mod router;

use binstore::DocumentStore;
use errors::InspectionsError;
use router::Router;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const READINESS_PROBE_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(config: config::Config) -> Result<(), InspectionsError> {
    let store = config.store.build()?;
    let ready = Arc::new(AtomicBool::new(false));

    tokio::spawn(probe_store(
        store.clone(),
        config.documents.records.clone(),
        ready.clone(),
        READINESS_PROBE_INTERVAL,
    ));

    let router = Router::new(&config, store);
    let admin = AdminService::<_, InspectionsError>::new(move || ready.load(Ordering::Relaxed));

    let router_task = run_http_service(&config.listener.host, config.listener.port, router);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin,
    );

    tokio::try_join!(router_task, admin_task)?;
    Ok(())
}

/// Marks the service ready once the records document can be read.
async fn probe_store(
    store: Arc<dyn DocumentStore>,
    document: String,
    ready: Arc<AtomicBool>,
    interval: Duration,
) {
    loop {
        match store.fetch_latest(&document).await {
            Ok(_) => {
                tracing::info!(document = %document, "Store reachable, service ready");
                ready.store(true, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                tracing::warn!(document = %document, error = %e, "Store not reachable yet");
                tokio::time::sleep(interval).await;
            }
        }
    }
}
