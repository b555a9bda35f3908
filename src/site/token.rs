//! The per-site token cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::site::info::MwVersion;

/// Token kinds folded into `csrf` on MediaWiki 1.24+.
const LEGACY_CSRF_KINDS: &[&str] = &[
    "edit", "move", "delete", "upload", "protect", "block", "unblock", "email", "import",
    "options",
];

/// Maps a requested token kind to the kind actually fetched from the
/// server.
pub(crate) fn normalize_kind(kind: &str, version: MwVersion) -> &str {
    if version.at_least(1, 24) && LEGACY_CSRF_KINDS.contains(&kind) {
        "csrf"
    } else {
        kind
    }
}

/// Cache of `(kind → token)` with shared in-flight fetches: concurrent
/// callers asking for the same kind await one request, and invalidation
/// swaps in a fresh slot so the next caller goes back to the server.
#[derive(Default)]
pub(crate) struct TokenCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl TokenCache {
    /// The cell for a kind; the caller runs `get_or_try_init` on it.
    pub fn slot(&self, kind: &str) -> Arc<OnceCell<String>> {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots
            .entry(kind.to_owned())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Seeds a freshly fetched token. A slot that resolved concurrently
    /// keeps its value.
    pub fn seed(&self, kind: &str, token: String) {
        let _ = self.slot(kind).set(token);
    }

    /// Drops a kind so the next request fetches anew.
    pub fn invalidate(&self, kind: &str) {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots.remove(kind);
    }

    /// Forgets everything; used on login and logout.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots.clear();
    }
}
