use sha2::{Digest, Sha256};

/// Shared-secret check in front of every mutating operation.
pub struct AccessGate {
    secret_digest: Option<[u8; 32]>,
}

impl AccessGate {
    /// An empty secret leaves the gate closed.
    pub fn new(secret: &str) -> Self {
        let secret_digest = if secret.is_empty() {
            tracing::warn!("No admin password configured; dataset uploads are disabled");
            None
        } else {
            Some(digest(secret))
        };
        Self { secret_digest }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret_digest.is_some()
    }

    pub fn authorize(&self, supplied: &str) -> bool {
        let Some(expected) = &self.secret_digest else {
            return false;
        };
        let actual = digest(supplied);
        // Compare every byte so timing does not depend on the first mismatch
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        let gate = AccessGate::new("s3cret");
        assert!(gate.authorize("s3cret"));
        assert!(!gate.authorize("s3cret "));
        assert!(!gate.authorize("S3CRET"));
        assert!(!gate.authorize(""));
    }

    #[test]
    fn empty_secret_disables_uploads() {
        let gate = AccessGate::new("");
        assert!(!gate.is_enabled());
        assert!(!gate.authorize(""));
        assert!(!gate.authorize("anything"));
    }
}
