use ed25519_dalek::{Signer, SigningKey};
use swiftclaim_contracts::canonical;

use crate::LedgerError;

/// Ed25519 key used to authorize contract writes.
#[derive(Clone)]
pub struct TransactionSigner {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TransactionSigner {
    pub fn from_hex(secret_hex: &str) -> Result<Self, LedgerError> {
        let secret_hex = secret_hex.trim();
        let secret_hex = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
        let bytes = hex::decode(secret_hex)
            .map_err(|_| LedgerError::Signing("signing key must be hex".to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::Signing("signing key must be 32 bytes".to_string()))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let address = format!("0x{}", hex::encode(signing_key.verifying_key().to_bytes()));
        Self {
            signing_key,
            address,
        }
    }

    /// `0x` + hex verifying key.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Builds the signed `ledger_sendTransaction` parameter object.
    pub fn sign_transaction(
        &self,
        to: &str,
        function: &str,
        args: &serde_json::Value,
        nonce: &str,
    ) -> serde_json::Value {
        let payload =
            canonical::transaction_signing_bytes(to, &self.address, function, args, nonce);
        let signature = self.signing_key.sign(&payload);

        serde_json::json!({
            "to": to,
            "from": self.address,
            "function": function,
            "args": args,
            "nonce": nonce,
            "signature": hex::encode(signature.to_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signature, Verifier};

    use super::*;

    #[test]
    fn signature_verifies_over_canonical_envelope() {
        let signer = TransactionSigner::from_bytes(&[7u8; 32]);
        let args = serde_json::json!(["42"]);
        let envelope = signer.sign_transaction("0xcontract", "verifyClaim", &args, "01HNONCE");

        let signature_hex = envelope["signature"].as_str().unwrap();
        let signature_bytes: [u8; 64] = hex::decode(signature_hex).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&signature_bytes);

        let payload = canonical::transaction_signing_bytes(
            "0xcontract",
            signer.address(),
            "verifyClaim",
            &args,
            "01HNONCE",
        );
        let verifying_key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        assert!(verifying_key.verify(&payload, &signature).is_ok());
        assert_eq!(envelope["from"], serde_json::json!(signer.address()));
    }

    #[test]
    fn from_hex_rejects_bad_keys() {
        assert!(TransactionSigner::from_hex("zz").is_err());
        assert!(TransactionSigner::from_hex("abcd").is_err());
        let ok = TransactionSigner::from_hex(&format!("0x{}", "11".repeat(32))).unwrap();
        assert_eq!(ok.address().len(), 66);
    }
}
