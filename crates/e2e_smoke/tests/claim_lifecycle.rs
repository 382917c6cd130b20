use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use swiftclaim_chain::{ClaimsLedger, RpcLedgerClient, RpcLedgerConfig, TransactionSigner};
use swiftclaim_server::orchestrator::ClaimOrchestrator;
use swiftclaim_store::ClaimStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const SIGNING_KEY: &str = "6b3b91c2a7b44a9f29a1e0d7a03d4d8c1f2d8c6f87f84b766c6f4f07c04f4f8f";
const PAID_BASE_UNITS: &str = "30000000000000000000000";

fn test_db_url() -> Option<String> {
    std::env::var("SWIFTCLAIM_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn smoke_claim_is_submitted_verified_and_processed_over_http() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping e2e smoke test; set SWIFTCLAIM_TEST_DB_URL to enable");
        return;
    };

    let log_buf = init_test_tracing();
    log_buf
        .lock()
        .expect("log lock should be available")
        .clear();

    let schema = format!("swiftclaim_e2e_{}", ulid::Ulid::new()).to_lowercase();
    let admin = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("DB connect should succeed");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .expect("create schema should succeed");
    let schema_url = schema_db_url(&db_url, &schema);

    let node = MockNode::default();
    let (node_addr, node_shutdown, node_task) =
        spawn_server(Router::new().route("/", post(rpc)).with_state(node.clone())).await;

    let config = swiftclaim_server::config::ServerConfig::from_kv(&HashMap::from([
        ("SWIFTCLAIM_BIND_ADDR".to_string(), "127.0.0.1:0".to_string()),
        ("SWIFTCLAIM_DB_URL".to_string(), schema_url.clone()),
        (
            "SWIFTCLAIM_LEDGER_RPC_URL".to_string(),
            format!("http://{}/", node_addr),
        ),
        (
            "SWIFTCLAIM_LEDGER_CONTRACT_ADDRESS".to_string(),
            "0xclaims".to_string(),
        ),
        ("SWIFTCLAIM_LEDGER_SIGNING_KEY".to_string(), SIGNING_KEY.to_string()),
        (
            "SWIFTCLAIM_LEDGER_POLL_INTERVAL_MS".to_string(),
            "10".to_string(),
        ),
        (
            "SWIFTCLAIM_INITIAL_CLAIM_STATUS".to_string(),
            "pending".to_string(),
        ),
        ("SWIFTCLAIM_METRICS_REQUIRE_AUTH".to_string(), "true".to_string()),
    ]))
    .expect("server config should be valid");

    let store = ClaimStore::connect_and_migrate(
        &config.db_url,
        config.db_max_connections,
        config.db_query_timeout(),
    )
    .await
    .expect("store should connect and migrate");
    let pool = seed(&schema_url).await;

    let ledger = RpcLedgerClient::new(RpcLedgerConfig {
        rpc_url: config.ledger_rpc_url.clone(),
        contract_address: config.ledger_contract_address.clone(),
        signer: config.ledger_signer.clone(),
        rpc_timeout: Duration::from_millis(config.ledger_rpc_timeout_ms),
        confirmation_timeout: Duration::from_millis(config.ledger_confirmation_timeout_ms),
        poll_interval: Duration::from_millis(config.ledger_poll_interval_ms),
    })
    .expect("ledger client should init");
    let ledger: Arc<dyn ClaimsLedger> = Arc::new(ledger);
    let orchestrator = ClaimOrchestrator::new(store.clone(), ledger, config.initial_claim_status);

    let (addr, server_shutdown, server_task) = spawn_server(
        swiftclaim_server::http::router(config.clone(), orchestrator)
            .expect("router should init"),
    )
    .await;

    let client = reqwest::Client::new();
    wait_for_healthz(&client, addr).await;

    let readyz = client
        .get(format!("http://{}/readyz", addr))
        .send()
        .await
        .expect("readyz should respond");
    assert_eq!(readyz.status(), reqwest::StatusCode::OK);

    let claim_body = serde_json::json!({
        "policyNumber": "POL-1",
        "claimAmount": 30000,
        "incidentDescription": "Fracture",
        "aabhaId": "AABHA-1",
        "billStartDate": "2024-01-10",
        "billEndDate": "2024-01-14"
    });

    let anonymous = client
        .post(format!("http://{}/claim", addr))
        .json(&claim_body)
        .send()
        .await
        .expect("anonymous submit should respond");
    assert_eq!(anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);

    let malformed = client
        .post(format!("http://{}/claim", addr))
        .header("x-swiftclaim-user-id", "asha")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("malformed submit should respond");
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);
    let malformed: Value = malformed.json().await.expect("error body should be JSON");
    assert_eq!(malformed["code"], "ERR_INVALID_PARAMS");

    let submitted = client
        .post(format!("http://{}/claim", addr))
        .header("x-swiftclaim-user-id", "asha")
        .json(&claim_body)
        .send()
        .await
        .expect("submit should respond");
    assert_eq!(submitted.status(), reqwest::StatusCode::CREATED);
    let submitted: Value = submitted.json().await.expect("submit body should be JSON");
    assert_eq!(submitted["success"], true);
    assert_eq!(submitted["claim"]["claimType"], "health");
    assert_eq!(submitted["claim"]["status"], "pending");
    assert_eq!(submitted["blockchain"]["chainClaimId"], "1");
    assert_eq!(submitted["blockchain"]["blockchainStatus"], "submitted_with_claim_id");
    let claim_id = submitted["claim"]["claimId"]
        .as_i64()
        .expect("claimId should be an integer");

    let duplicate = client
        .post(format!("http://{}/claim", addr))
        .header("x-swiftclaim-user-id", "asha")
        .json(&claim_body)
        .send()
        .await
        .expect("duplicate submit should respond");
    assert_eq!(duplicate.status(), reqwest::StatusCode::CONFLICT);
    let duplicate: Value = duplicate.json().await.expect("error body should be JSON");
    assert_eq!(duplicate["error"], "Duplicate claim");
    assert_eq!(duplicate["existingClaimId"], claim_id);

    let verified = client
        .post(format!("http://{}/claim/{}/verify", addr, claim_id))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("verify should respond");
    assert_eq!(verified.status(), reqwest::StatusCode::OK);
    let verified: Value = verified.json().await.expect("verify body should be JSON");
    assert_eq!(verified["message"], "Claim verified successfully");
    assert_eq!(verified["claimId"], claim_id);

    let reverify = client
        .post(format!("http://{}/claim/{}/verify", addr, claim_id))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("second verify should respond");
    assert_eq!(reverify.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let reverify: Value = reverify.json().await.expect("error body should be JSON");
    assert_eq!(reverify["error"], "Claim not found or not in pending status");

    let processed = client
        .post(format!("http://{}/claim/{}/process", addr, claim_id))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("process should respond");
    assert_eq!(processed.status(), reqwest::StatusCode::OK);
    let processed: Value = processed.json().await.expect("process body should be JSON");
    assert_eq!(processed["claimId"], "1");
    assert_eq!(processed["paidAmount"], PAID_BASE_UNITS);
    assert!(processed["transactionHash"].as_str().is_some());

    let settled: String = sqlx::query_scalar("SELECT claim_status FROM claims WHERE claim_id = $1")
        .bind(claim_id)
        .fetch_one(&pool)
        .await
        .expect("claim should exist");
    assert_eq!(settled, "paid");

    let ledger_claim = client
        .get(format!("http://{}/claim/1", addr))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("ledger claim read should respond");
    assert_eq!(ledger_claim.status(), reqwest::StatusCode::OK);
    let ledger_claim: Value = ledger_claim.json().await.expect("claim body should be JSON");
    assert_eq!(ledger_claim["policyNumber"], "1");
    assert_eq!(ledger_claim["isPaid"], true);
    assert_eq!(ledger_claim["aabhaId"], "AABHA-1");

    let policy = client
        .get(format!("http://{}/policy/POL-1", addr))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("ledger policy read should respond");
    assert_eq!(policy.status(), reqwest::StatusCode::OK);
    let policy: Value = policy.json().await.expect("policy body should be JSON");
    assert_eq!(policy["policyType"], "health");
    assert_eq!(policy["coverageAmount"], 50000);

    let bad_id = client
        .get(format!("http://{}/claim/abc", addr))
        .header("x-swiftclaim-user-id", "asha")
        .send()
        .await
        .expect("bad claim id read should respond");
    assert_eq!(bad_id.status(), reqwest::StatusCode::BAD_REQUEST);

    let metrics_anonymous = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .expect("metrics should respond");
    assert_eq!(metrics_anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);

    let metrics = client
        .get(format!("http://{}/metrics", addr))
        .header("x-swiftclaim-user-id", "ops")
        .send()
        .await
        .expect("metrics should respond")
        .text()
        .await
        .expect("metrics body should be text");
    assert!(metrics.contains("swiftclaim_claim_outcomes_total"));
    assert!(metrics.contains("swiftclaim_ledger_call_duration_seconds"));

    let signer_address = TransactionSigner::from_hex(SIGNING_KEY)
        .expect("signing key should parse")
        .address()
        .to_string();
    let sent = node.sent_functions();
    assert_eq!(sent, ["submitClaim", "verifyClaim", "processClaim"]);
    for envelope in node.requests_for("ledger_sendTransaction") {
        let tx = &envelope["params"][0];
        assert_eq!(tx["from"], signer_address);
        assert_eq!(tx["to"], "0xclaims");
        assert!(tx["signature"].as_str().is_some_and(|s| !s.is_empty()));
    }

    let logs = String::from_utf8(
        log_buf
            .lock()
            .expect("log lock should be available")
            .clone(),
    )
    .expect("logs should be UTF-8");
    assert!(logs.contains("claim.submitted"));
    assert!(
        !logs.contains(SIGNING_KEY),
        "signing key must never reach the logs"
    );

    let _ = server_shutdown.send(());
    let _ = server_task.await;
    let _ = node_shutdown.send(());
    let _ = node_task.await;
    store.close().await;
    pool.close().await;

    let _ = sqlx::query(&format!("DROP SCHEMA {} CASCADE", schema))
        .execute(&admin)
        .await;
    admin.close().await;
}

async fn seed(schema_url: &str) -> sqlx::PgPool {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(schema_url)
        .await
        .expect("schema connect should succeed");
    for statement in [
        "INSERT INTO users (full_name, email) VALUES ('Asha Rao', 'asha@example.com')",
        "INSERT INTO insurance_policies (policy_name, type, coverage) VALUES ('Health Gold', 'health', 50000)",
        "INSERT INTO subscribed_policies (policy_number, user_id, policy_id, status) VALUES ('POL-1', 1, 1, 'active')",
        "INSERT INTO aabha_records (aabha_id, patient_name, hospital_name, admission_date, bill_amount) VALUES ('AABHA-1', 'Asha Rao', 'City Hospital', '2024-01-10', 42000)",
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("seed statement should succeed");
    }
    pool
}

/// Ledger node double that confirms every transaction on the first poll and
/// emits the events the contract would.
#[derive(Clone, Default)]
struct MockNode {
    requests: Arc<Mutex<Vec<Value>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    next_hash: Arc<AtomicU64>,
}

impl MockNode {
    fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["method"] == method)
            .cloned()
            .collect()
    }

    fn sent_functions(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, function)| function.clone())
            .collect()
    }

    fn function_for(&self, transaction_hash: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(hash, _)| hash == transaction_hash)
            .map(|(_, function)| function.clone())
    }
}

async fn rpc(State(node): State<MockNode>, Json(req): Json<Value>) -> Json<Value> {
    node.requests.lock().unwrap().push(req.clone());
    let id = req["id"].clone();
    let reply = |result: Value| {
        Json(serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}))
    };
    let params = &req["params"][0];

    match req["method"].as_str() {
        Some("ledger_call") => match params["function"].as_str() {
            Some("getPolicy") => reply(serde_json::json!([
                "0x00000000000000000000000000000000000a5a",
                "50000000000000000000000",
                "1704067200",
                "1735689600",
                "health",
                true
            ])),
            Some("getClaim") => reply(serde_json::json!([
                "1",
                "0x00000000000000000000000000000000000a5a",
                "30000000000000000000000",
                "Fracture",
                "1704844800",
                true,
                true,
                PAID_BASE_UNITS,
                "AABHA-1",
                "1704844800",
                "0",
                false,
                0,
                0
            ])),
            _ => reply(Value::Null),
        },
        Some("ledger_sendTransaction") => {
            let hash = format!("0x{:064x}", node.next_hash.fetch_add(1, Ordering::SeqCst) + 1);
            let function = params["function"].as_str().unwrap_or_default().to_string();
            node.sent.lock().unwrap().push((hash.clone(), function));
            reply(Value::String(hash))
        }
        Some("ledger_getTransactionReceipt") => {
            let hash = params.as_str().unwrap_or_default().to_string();
            let events = match node.function_for(&hash).as_deref() {
                Some("submitClaim") => serde_json::json!([
                    {"event": "ClaimSubmitted", "args": {"claimId": "1", "policyNumber": "1"}}
                ]),
                Some("processClaim") => serde_json::json!([
                    {"event": "ClaimProcessed", "args": {"claimId": "1", "paidAmount": PAID_BASE_UNITS}}
                ]),
                _ => serde_json::json!([]),
            };
            reply(serde_json::json!({
                "transactionHash": hash,
                "blockNumber": "0x10",
                "status": "success",
                "events": events
            }))
        }
        _ => Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": req["id"],
            "error": {"code": -32601, "message": "method not found"}
        })),
    }
}

async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

async fn wait_for_healthz(client: &reqwest::Client, addr: SocketAddr) {
    let url = format!("http://{}/healthz", addr);

    for _ in 0..50 {
        if let Ok(response) = client.get(&url).send().await
            && response.status().is_success()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    panic!("server did not become ready at {}", url);
}

struct TestWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut lock = self
            .buf
            .lock()
            .map_err(|_| std::io::Error::other("log mutex poisoned"))?;
        lock.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn init_test_tracing() -> Arc<Mutex<Vec<u8>>> {
    static LOG_BUF: OnceLock<Arc<Mutex<Vec<u8>>>> = OnceLock::new();

    LOG_BUF
        .get_or_init(|| {
            let buf = Arc::new(Mutex::new(Vec::new()));
            let make_writer = {
                let buf = buf.clone();
                move || TestWriter { buf: buf.clone() }
            };

            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .with_ansi(false)
                .with_writer(make_writer)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .expect("global tracing subscriber should be set once");

            buf
        })
        .clone()
}
