use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Application-wide admin-mode switch. Cloning shares the same state;
/// observers follow changes through [`AdminMode::subscribe`].
#[derive(Debug, Clone)]
pub struct AdminMode {
    tx: Arc<watch::Sender<bool>>,
}

impl AdminMode {
    pub fn new(enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(enabled);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn set(&self, enabled: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
        if changed {
            info!(enabled, "admin mode changed");
        }
    }

    pub fn toggle(&self) -> bool {
        let next = !self.is_enabled();
        self.set(next);
        next
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AdminMode {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_changes() {
        let mode = AdminMode::default();
        let mut rx = mode.subscribe();
        assert!(!*rx.borrow());

        let shared = mode.clone();
        assert!(shared.toggle());
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(mode.is_enabled());

        mode.set(true);
        assert!(!rx.has_changed().unwrap());
    }
}
