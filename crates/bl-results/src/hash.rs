//! Content hashing of run configuration.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ResultsResult;

/// SHA-256 over the JSON form of `config`, lowercase hex.
///
/// Stored with persisted state so a resume under a changed configuration
/// can be detected.
pub fn config_fingerprint<T: Serialize>(config: &T) -> ResultsResult<String> {
    let json = serde_json::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        name: &'static str,
        loops: u32,
    }

    #[test]
    fn fingerprint_stability() {
        let a = config_fingerprint(&Sample { name: "a", loops: 3 }).unwrap();
        let b = config_fingerprint(&Sample { name: "a", loops: 3 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_for_different_inputs() {
        let a = config_fingerprint(&Sample { name: "a", loops: 3 }).unwrap();
        let b = config_fingerprint(&Sample { name: "a", loops: 4 }).unwrap();
        assert_ne!(a, b);
    }
}
