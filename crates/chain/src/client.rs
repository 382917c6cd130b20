use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use swiftclaim_contracts::canonical::is_tx_hash;
use swiftclaim_contracts::{LedgerClaim, LedgerPolicy, LedgerUint};
use ulid::Ulid;

use crate::codec::{decode_claim, decode_policy, uint_value};
use crate::events::{processing_outcome, submission_outcome};
use crate::signer::TransactionSigner;
use crate::{
    ClaimsLedger, LedgerError, LedgerEvent, ProcessingReceipt, ReceiptStatus, SubmissionReceipt,
    SubmitClaimRequest, TransactionReceipt, VerificationReceipt,
};

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub signer: Option<TransactionSigner>,
    pub rpc_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<Value>,
    status: Value,
    #[serde(default)]
    revert_reason: Option<String>,
    #[serde(default)]
    events: Vec<LedgerEvent>,
}

impl RawReceipt {
    fn into_receipt(self) -> TransactionReceipt {
        let succeeded = match &self.status {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_u64() == Some(1),
            Value::String(s) => matches!(s.as_str(), "success" | "0x1" | "1"),
            _ => false,
        };
        TransactionReceipt {
            transaction_hash: self.transaction_hash,
            block_number: self.block_number.as_ref().and_then(uint_value),
            status: if succeeded {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Reverted
            },
            revert_reason: self.revert_reason,
            events: self.events,
        }
    }
}

/// JSON-RPC client for the claims-settlement contract. Never retries.
#[derive(Clone)]
pub struct RpcLedgerClient {
    config: RpcLedgerConfig,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl RpcLedgerClient {
    pub fn new(config: RpcLedgerConfig) -> Result<Self, LedgerError> {
        if config.rpc_url.trim().is_empty() {
            return Err(LedgerError::InvalidResponse(
                "ledger rpc url must be non-empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.rpc_timeout)
            .build()
            .map_err(LedgerError::Transport)?;

        Ok(Self {
            config,
            http,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn signer_address(&self) -> Option<&str> {
        self.config.signer.as_ref().map(TransactionSigner::address)
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Option<Value>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .http
            .post(&self.config.rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LedgerError::InvalidResponse(format!(
                "{} returned http status {}",
                method,
                resp.status()
            )));
        }

        let decoded = resp.json::<RpcResponse>().await.map_err(|_| {
            LedgerError::InvalidResponse(format!("{} returned invalid JSON", method))
        })?;

        if let Some(error) = decoded.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(decoded.result.filter(|v| !v.is_null()))
    }

    async fn call(&self, function: &str, args: Value) -> Result<Vec<Value>, LedgerError> {
        let result = self
            .rpc(
                "ledger_call",
                serde_json::json!([{
                    "to": self.config.contract_address,
                    "function": function,
                    "args": args,
                }]),
            )
            .await?;

        match result {
            Some(Value::Array(values)) => Ok(values),
            _ => Err(LedgerError::InvalidResponse(format!(
                "{} did not return a tuple",
                function
            ))),
        }
    }

    async fn send_transaction(&self, function: &str, args: Value) -> Result<String, LedgerError> {
        let signer = self
            .config
            .signer
            .as_ref()
            .ok_or(LedgerError::SignerUnavailable)?;
        let nonce = Ulid::new().to_string();
        let envelope =
            signer.sign_transaction(&self.config.contract_address, function, &args, &nonce);

        let result = self
            .rpc("ledger_sendTransaction", serde_json::json!([envelope]))
            .await?;
        match result {
            Some(Value::String(hash)) if is_tx_hash(&hash) => Ok(hash),
            _ => Err(LedgerError::InvalidResponse(format!(
                "{} did not return a transaction hash",
                function
            ))),
        }
    }

    async fn fetch_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        let result = self
            .rpc(
                "ledger_getTransactionReceipt",
                serde_json::json!([transaction_hash]),
            )
            .await?;
        let Some(raw) = result else {
            return Ok(None);
        };
        let raw = serde_json::from_value::<RawReceipt>(raw).map_err(|err| {
            LedgerError::InvalidResponse(format!("malformed receipt: {}", err))
        })?;
        Ok(Some(raw.into_receipt()))
    }

    /// Polls until the transaction is confirmed; reverts become errors.
    async fn wait_for_confirmation(
        &self,
        transaction_hash: String,
    ) -> Result<TransactionReceipt, LedgerError> {
        let poll = async {
            loop {
                let fetched = self.fetch_receipt(&transaction_hash).await.map_err(|err| {
                    LedgerError::ReceiptUnavailable {
                        transaction_hash: transaction_hash.clone(),
                        source: Box::new(err),
                    }
                })?;
                if let Some(receipt) = fetched {
                    return Ok::<_, LedgerError>(receipt);
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        let receipt = tokio::time::timeout(self.config.confirmation_timeout, poll)
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout {
                transaction_hash: transaction_hash.clone(),
            })??;

        if receipt.status == ReceiptStatus::Reverted {
            return Err(LedgerError::Reverted {
                transaction_hash: receipt.transaction_hash,
                reason: receipt.revert_reason,
            });
        }
        tracing::debug!(
            transaction_hash = %receipt.transaction_hash,
            events = receipt.events.len(),
            "ledger.transaction_confirmed"
        );
        Ok(receipt)
    }

    async fn transact(
        &self,
        function: &str,
        args: Value,
    ) -> Result<TransactionReceipt, LedgerError> {
        let hash = self.send_transaction(function, args).await?;
        tracing::debug!(function, transaction_hash = %hash, "ledger.transaction_sent");
        self.wait_for_confirmation(hash).await
    }
}

#[async_trait]
impl ClaimsLedger for RpcLedgerClient {
    async fn get_policy(&self, policy_number: &LedgerUint) -> Result<LedgerPolicy, LedgerError> {
        let values = self
            .call("getPolicy", serde_json::json!([policy_number.as_str()]))
            .await?;
        decode_policy(&values)
    }

    async fn get_claim(&self, claim_id: &LedgerUint) -> Result<LedgerClaim, LedgerError> {
        let values = self
            .call("getClaim", serde_json::json!([claim_id.as_str()]))
            .await?;
        decode_claim(&values)
    }

    async fn submit_claim(
        &self,
        request: &SubmitClaimRequest,
    ) -> Result<SubmissionReceipt, LedgerError> {
        let receipt = self.transact("submitClaim", request.to_args()).await?;
        Ok(submission_outcome(&receipt))
    }

    async fn verify_claim(
        &self,
        claim_id: &LedgerUint,
    ) -> Result<VerificationReceipt, LedgerError> {
        let receipt = self
            .transact("verifyClaim", serde_json::json!([claim_id.as_str()]))
            .await?;
        Ok(VerificationReceipt {
            transaction_hash: receipt.transaction_hash,
        })
    }

    async fn process_claim(
        &self,
        claim_id: &LedgerUint,
    ) -> Result<ProcessingReceipt, LedgerError> {
        let receipt = self
            .transact("processClaim", serde_json::json!([claim_id.as_str()]))
            .await?;
        processing_outcome(&receipt)
    }

    async fn transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.fetch_receipt(transaction_hash).await
    }
}
