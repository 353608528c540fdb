//! Online/offline tracking.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shared online flag.
///
/// Clones observe the same flag. Whoever detects network changes calls
/// [`set_online`](Self::set_online); interested tasks [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Create a flag with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Whether the client is currently online.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record a connectivity change. Returns whether the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Watch for changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_changes_notify() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        assert!(!connectivity.set_online(true));
        assert!(!rx.has_changed().unwrap());

        assert!(connectivity.set_online(false));
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!connectivity.is_online());
    }

    #[test]
    fn clones_share_state() {
        let a = Connectivity::new(false);
        let b = a.clone();
        b.set_online(true);
        assert!(a.is_online());
    }
}
