/// `0x` followed by 64 hex digits.
pub fn is_tx_hash(s: &str) -> bool {
    let Some(hex) = s.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn canonicalize_json_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.iter().map(canonicalize_json_value).collect())
        }
        serde_json::Value::Object(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize_json_value(v));
            }
            serde_json::Value::Object(out)
        }
        other => other.clone(),
    }
}

pub fn canonical_json_bytes(value: &serde_json::Value) -> Vec<u8> {
    let canonical = canonicalize_json_value(value);
    serde_json::to_vec(&canonical).unwrap_or_else(|_| b"null".to_vec())
}

/// Bytes a transaction signature commits to: the canonical JSON of the
/// unsigned envelope.
pub fn transaction_signing_bytes(
    to: &str,
    from: &str,
    function: &str,
    args: &serde_json::Value,
    nonce: &str,
) -> Vec<u8> {
    canonical_json_bytes(&serde_json::json!({
        "args": args,
        "from": from,
        "function": function,
        "nonce": nonce,
        "to": to,
    }))
}
