//! Admin token check
//!
//! Administrative endpoints require the `x-admin-token` header to match
//! `CDP_ADMIN_TOKEN`. Tokens are compared as SHA-256 digests so the comparison
//! time does not depend on where the first mismatch is.

use axum::http::HeaderMap;
use cdp_ingest::controller::Caller;
use sha2::{Digest, Sha256};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone, Default)]
pub struct AdminToken {
    digest: Option<[u8; 32]>,
}

impl AdminToken {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            digest: token.filter(|t| !t.is_empty()).map(digest),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }

    /// Resolve the caller for a request. Without a configured token nobody is privileged.
    pub fn caller(&self, headers: &HeaderMap) -> Caller {
        let Some(expected) = &self.digest else {
            return Caller::anonymous();
        };
        let presented = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match presented {
            Some(token) if constant_time_eq(expected, &digest(token)) => Caller::privileged(),
            _ => Caller::anonymous(),
        }
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminToken")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
