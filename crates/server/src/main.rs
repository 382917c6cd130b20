use std::sync::Arc;
use std::time::Duration;

use swiftclaim_chain::{ClaimsLedger, RpcLedgerClient, RpcLedgerConfig};
use swiftclaim_server::orchestrator::ClaimOrchestrator;
use swiftclaim_server::reconcile::Reconciler;
use swiftclaim_server::{config, http};
use swiftclaim_store::ClaimStore;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match config::ServerConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let store = match ClaimStore::connect_and_migrate(
        &config.db_url,
        config.db_max_connections,
        config.db_query_timeout(),
    )
    .await
    {
        Ok(store) => store,
        Err(err) => {
            eprintln!("STARTUP_ERROR ERR_DB_UNAVAILABLE {}", err);
            std::process::exit(1);
        }
    };

    let ledger = match RpcLedgerClient::new(RpcLedgerConfig {
        rpc_url: config.ledger_rpc_url.clone(),
        contract_address: config.ledger_contract_address.clone(),
        signer: config.ledger_signer.clone(),
        rpc_timeout: Duration::from_millis(config.ledger_rpc_timeout_ms),
        confirmation_timeout: Duration::from_millis(config.ledger_confirmation_timeout_ms),
        poll_interval: Duration::from_millis(config.ledger_poll_interval_ms),
    }) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("STARTUP_ERROR ERR_LEDGER_UNAVAILABLE {}", err);
            std::process::exit(1);
        }
    };
    match ledger.signer_address() {
        Some(address) => tracing::info!(signer = address, "ledger signer configured"),
        None => tracing::warn!("no ledger signing key configured; claim writes will fail"),
    }
    let ledger: Arc<dyn ClaimsLedger> = Arc::new(ledger);

    let orchestrator =
        ClaimOrchestrator::new(store.clone(), ledger.clone(), config.initial_claim_status);

    let app = match http::router(config.clone(), orchestrator) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(_) => {
            eprintln!("STARTUP_ERROR ERR_BIND_FAILED failed to bind swiftclaim listener");
            std::process::exit(1);
        }
    };

    let (reconcile_shutdown, reconcile_rx) = oneshot::channel();
    let reconciler = config.reconcile_interval().map(|interval| {
        tracing::info!(interval_secs = interval.as_secs(), "reconciler enabled");
        Reconciler::new(store.clone(), ledger.clone(), config.reconcile_batch_size)
            .spawn(interval, reconcile_rx)
    });

    tracing::info!(bind_addr = %config.bind_addr, "swiftclaim-server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    let _ = reconcile_shutdown.send(());
    if let Some(handle) = reconciler {
        let _ = handle.await;
    }
    store.close().await;

    if let Err(err) = served {
        eprintln!("STARTUP_ERROR ERR_SERVER_FAILED {}", err);
        std::process::exit(1);
    }
}
