use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use swiftclaim_chain::TransactionSigner;
use swiftclaim_contracts::ClaimStatus;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_url: String,
    pub db_max_connections: u32,
    pub db_query_timeout_ms: u64,
    pub ledger_rpc_url: String,
    pub ledger_contract_address: String,
    pub ledger_signer: Option<TransactionSigner>,
    pub ledger_rpc_timeout_ms: u64,
    pub ledger_confirmation_timeout_ms: u64,
    pub ledger_poll_interval_ms: u64,
    pub auth_mode: AuthMode,
    pub jwt_secret: Option<String>,
    pub environment: Environment,
    pub initial_claim_status: ClaimStatus,
    pub reconcile_interval_secs: u64,
    pub reconcile_batch_size: u32,
    pub metrics_require_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Local,
    Jwt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl ServerConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("SWIFTCLAIM_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("SWIFTCLAIM_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
            "SWIFTCLAIM_BIND_ADDR",
        )?;

        let auth_mode = parse_auth_mode(kv.get("SWIFTCLAIM_AUTH_MODE"))?;

        let dev_allow_nonlocal_bind =
            parse_bool(kv.get("SWIFTCLAIM_DEV_ALLOW_NONLOCAL_BIND")).unwrap_or(false);

        if !bind_addr.ip().is_loopback()
            && auth_mode != AuthMode::Jwt
            && !(dev_allow_nonlocal_bind && is_unspecified_ip(bind_addr.ip()))
        {
            return Err(StartupError {
                code: "ERR_NONLOCAL_BIND_REQUIRES_AUTH",
                message: "non-local bind requires jwt auth, or dev override on an unspecified address"
                    .to_string(),
            });
        }

        let jwt_secret = kv
            .get("SWIFTCLAIM_JWT_SECRET")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        if auth_mode == AuthMode::Jwt && jwt_secret.is_none() {
            return Err(StartupError {
                code: "ERR_MISSING_CONFIG",
                message: "SWIFTCLAIM_AUTH_MODE=jwt requires SWIFTCLAIM_JWT_SECRET".to_string(),
            });
        }

        let db_url = require_nonempty(kv, "SWIFTCLAIM_DB_URL")?;
        let db_max_connections = parse_u32(
            kv.get("SWIFTCLAIM_DB_MAX_CONNECTIONS"),
            8,
            "SWIFTCLAIM_DB_MAX_CONNECTIONS",
        )?;
        if db_max_connections == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "SWIFTCLAIM_DB_MAX_CONNECTIONS must be > 0".to_string(),
            });
        }
        let db_query_timeout_ms = parse_millis(
            kv.get("SWIFTCLAIM_DB_QUERY_TIMEOUT_MS"),
            2_000,
            "SWIFTCLAIM_DB_QUERY_TIMEOUT_MS",
        )?;

        let ledger_rpc_url = require_nonempty(kv, "SWIFTCLAIM_LEDGER_RPC_URL")?;
        if !ledger_rpc_url.starts_with("http://") && !ledger_rpc_url.starts_with("https://") {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "SWIFTCLAIM_LEDGER_RPC_URL must be an http(s) URL".to_string(),
            });
        }
        let ledger_contract_address = require_nonempty(kv, "SWIFTCLAIM_LEDGER_CONTRACT_ADDRESS")?;
        let ledger_signer = parse_signing_key(kv.get("SWIFTCLAIM_LEDGER_SIGNING_KEY"))?;
        let ledger_rpc_timeout_ms = parse_millis(
            kv.get("SWIFTCLAIM_LEDGER_RPC_TIMEOUT_MS"),
            5_000,
            "SWIFTCLAIM_LEDGER_RPC_TIMEOUT_MS",
        )?;
        let ledger_confirmation_timeout_ms = parse_millis(
            kv.get("SWIFTCLAIM_LEDGER_CONFIRMATION_TIMEOUT_MS"),
            60_000,
            "SWIFTCLAIM_LEDGER_CONFIRMATION_TIMEOUT_MS",
        )?;
        let ledger_poll_interval_ms = parse_millis(
            kv.get("SWIFTCLAIM_LEDGER_POLL_INTERVAL_MS"),
            500,
            "SWIFTCLAIM_LEDGER_POLL_INTERVAL_MS",
        )?;

        let environment = parse_environment(kv.get("SWIFTCLAIM_ENVIRONMENT"))?;
        let initial_claim_status =
            parse_initial_claim_status(kv.get("SWIFTCLAIM_INITIAL_CLAIM_STATUS"))?;

        let reconcile_interval_secs = parse_u64(
            kv.get("SWIFTCLAIM_RECONCILE_INTERVAL_SECS"),
            60,
            "SWIFTCLAIM_RECONCILE_INTERVAL_SECS",
        )?;
        let reconcile_batch_size = parse_u32(
            kv.get("SWIFTCLAIM_RECONCILE_BATCH_SIZE"),
            50,
            "SWIFTCLAIM_RECONCILE_BATCH_SIZE",
        )?;
        if reconcile_batch_size == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "SWIFTCLAIM_RECONCILE_BATCH_SIZE must be > 0".to_string(),
            });
        }

        let metrics_require_auth = parse_bool(kv.get("SWIFTCLAIM_METRICS_REQUIRE_AUTH"))
            .unwrap_or(!bind_addr.ip().is_loopback());

        Ok(Self {
            bind_addr,
            db_url,
            db_max_connections,
            db_query_timeout_ms,
            ledger_rpc_url,
            ledger_contract_address,
            ledger_signer,
            ledger_rpc_timeout_ms,
            ledger_confirmation_timeout_ms,
            ledger_poll_interval_ms,
            auth_mode,
            jwt_secret,
            environment,
            initial_claim_status,
            reconcile_interval_secs,
            reconcile_batch_size,
            metrics_require_auth,
        })
    }

    pub fn db_query_timeout(&self) -> Duration {
        Duration::from_millis(self.db_query_timeout_ms)
    }

    /// `None` when the background reconciler is disabled.
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0)
            .then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    kv.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u32>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_millis(
    value: Option<&String>,
    default: u64,
    key: &'static str,
) -> Result<u64, StartupError> {
    let millis = parse_u64(value, default, key)?;
    if millis == 0 {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be > 0", key),
        });
    }
    Ok(millis)
}

fn parse_bool(value: Option<&String>) -> Option<bool> {
    let value = value.map(|v| v.trim()).filter(|v| !v.is_empty())?;

    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

fn parse_auth_mode(value: Option<&String>) -> Result<AuthMode, StartupError> {
    let mode = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("local");

    match mode {
        "local" => Ok(AuthMode::Local),
        "jwt" => Ok(AuthMode::Jwt),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "SWIFTCLAIM_AUTH_MODE must be local or jwt".to_string(),
        }),
    }
}

fn parse_environment(value: Option<&String>) -> Result<Environment, StartupError> {
    let environment = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("production");

    match environment {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "SWIFTCLAIM_ENVIRONMENT must be development or production".to_string(),
        }),
    }
}

fn parse_initial_claim_status(value: Option<&String>) -> Result<ClaimStatus, StartupError> {
    let status = value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("approved");

    match status {
        "approved" => Ok(ClaimStatus::Approved),
        "pending" => Ok(ClaimStatus::Pending),
        _ => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "SWIFTCLAIM_INITIAL_CLAIM_STATUS must be approved or pending".to_string(),
        }),
    }
}

fn parse_signing_key(value: Option<&String>) -> Result<Option<TransactionSigner>, StartupError> {
    let Some(raw) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "SWIFTCLAIM_LEDGER_SIGNING_KEY must be 64 hex characters".to_string(),
        });
    }

    TransactionSigner::from_hex(hex)
        .map(Some)
        .map_err(|err| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("SWIFTCLAIM_LEDGER_SIGNING_KEY rejected: {}", err),
        })
}

fn is_unspecified_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified(),
    }
}
