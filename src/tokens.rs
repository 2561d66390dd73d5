//! Runtime token state.
//!
//! The bridge carries two bearer tokens: `api_token` gates inbound requests,
//! `upstream_token` is attached to outbound calls to the host backend. Both
//! may be rotated at runtime; readers always get a consistent snapshot.

use std::sync::{Arc, Mutex};

/// Consistent view of both tokens at a point in time.
#[derive(Debug, Clone, Default)]
pub struct TokenSnapshot {
    pub api_token: String,
    pub upstream_token: String,
}

/// Shared owner of the token state. Cheap to clone.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Mutex<TokenSnapshot>>,
}

impl TokenManager {
    pub fn new(api_token: impl Into<String>, upstream_token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TokenSnapshot {
                api_token: api_token.into(),
                upstream_token: upstream_token.into(),
            })),
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.inner.lock().unwrap().clone()
    }

    pub fn api_token(&self) -> String {
        self.inner.lock().unwrap().api_token.clone()
    }

    pub fn upstream_token(&self) -> String {
        self.inner.lock().unwrap().upstream_token.clone()
    }

    pub fn set_api_token(&self, token: impl Into<String>) {
        self.inner.lock().unwrap().api_token = token.into();
    }

    pub fn set_upstream_token(&self, token: impl Into<String>) {
        self.inner.lock().unwrap().upstream_token = token.into();
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Compare two tokens without short-circuiting on the first mismatching byte.
///
/// The length check is allowed to leak; the byte comparison is not.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
