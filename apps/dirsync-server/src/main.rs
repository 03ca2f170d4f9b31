use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use dirsync_connector_feishu::FeishuClient;
use dirsync_connector_ldap::LdapDirectory;
use dirsync_db::PgStore;
use dirsync_events::WebhookDispatcher;
use dirsync_server::{logging, router, scheduler, AppState, Config};
use dirsync_sync::{ConsistencyAuditor, Deprovisioner, DualStoreWriter, SyncEngine};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        source = %config.sync.source,
        "Starting dirsync"
    );

    let store = match PgStore::connect(&config.database_url, config.db_max_connections).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = store.run_migrations().await {
        error!("Failed to run migrations: {e}");
        std::process::exit(1);
    }

    let bind_addr = config.bind_addr();
    let directory = match LdapDirectory::new(config.ldap) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Invalid LDAP configuration: {e}");
            std::process::exit(1);
        }
    };
    // The directory may come up after us; the first write reconnects.
    if let Err(e) = directory.test_connection(&config.sync.base_dn).await {
        warn!(error = %e, "LDAP not reachable at startup");
    }

    let remote = match FeishuClient::new(config.feishu) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create Feishu client: {e}");
            std::process::exit(1);
        }
    };

    let sync_config = Arc::new(config.sync);
    let store = Arc::new(store);
    let writer = Arc::new(DualStoreWriter::new(
        directory.clone(),
        store.clone(),
        sync_config.clone(),
    ));
    let engine = Arc::new(SyncEngine::new(remote, writer.clone()));
    let auditor = Arc::new(ConsistencyAuditor::new(
        directory.clone(),
        store,
        sync_config,
    ));
    let deprovisioner = Arc::new(Deprovisioner::new(writer));

    let mut webhook = WebhookDispatcher::new(deprovisioner.clone());
    match config.webhook_verification_token {
        Some(token) => webhook = webhook.with_verification_token(token),
        None => warn!("FEISHU_VERIFICATION_TOKEN not set, webhook payloads are not verified"),
    }

    let state = AppState::new(engine, auditor, Arc::new(webhook));

    if let Some(period) = config.sync_interval {
        scheduler::spawn_sync_schedule(state.clone(), period);
    }
    if let Some(period) = config.audit_interval {
        scheduler::spawn_audit_schedule(state.clone(), period);
    }

    #[cfg(feature = "kafka")]
    if let Some(kafka) = &config.kafka {
        start_bus_consumer(kafka, deprovisioner.clone());
    }
    #[cfg(not(feature = "kafka"))]
    drop(deprovisioner);

    let app = router(state);

    let addr: SocketAddr = match bind_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid bind address '{}': {e}", bind_addr);
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    directory.dispose().await;
    info!("Server shutdown complete");
}

#[cfg(feature = "kafka")]
fn start_bus_consumer(config: &dirsync_events::KafkaConfig, deprovisioner: Arc<Deprovisioner>) {
    use dirsync_events::{BusConsumer, KafkaSubscription};

    match KafkaSubscription::new(config) {
        Ok(subscription) => {
            let consumer = BusConsumer::new(deprovisioner);
            tokio::spawn(async move {
                consumer.run(subscription).await;
                warn!("Bus consumer stopped");
            });
            info!(topic = %config.topic, "Bus consumer started");
        }
        Err(e) => error!(error = %e, "Failed to start bus consumer"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
