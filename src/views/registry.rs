use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// A mounted view. `teardown` must stop every poll session and close every
/// gate the view owns, and must be safe to call more than once.
pub trait View: Send + Sync + 'static {
    fn teardown(&self);
}

struct Entry<V> {
    view: Arc<V>,
    last_access: Mutex<Instant>,
}

impl<V> Entry<V> {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_access.lock())
    }
}

/// Mounted views of one kind, keyed by the id handed to the browser.
///
/// Every lookup refreshes the view's last access. A browser that goes away
/// without unmounting leaves its views idle until `evict_idle` reclaims them.
pub struct ViewRegistry<V> {
    kind: &'static str,
    views: Arc<DashMap<Uuid, Entry<V>>>,
}

impl<V> Clone for ViewRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            views: Arc::clone(&self.views),
        }
    }
}

impl<V: View> ViewRegistry<V> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            views: Arc::new(DashMap::new()),
        }
    }

    pub fn mount(&self, view: V) -> (Uuid, Arc<V>) {
        let id = Uuid::new_v4();
        let view = Arc::new(view);
        self.views.insert(
            id,
            Entry {
                view: Arc::clone(&view),
                last_access: Mutex::new(Instant::now()),
            },
        );
        info!(kind = self.kind, %id, "View mounted");
        (id, view)
    }

    /// The view, cloned out so no map lock is held by the caller.
    pub fn get(&self, id: &Uuid) -> Option<Arc<V>> {
        self.views.get(id).map(|entry| {
            *entry.last_access.lock() = Instant::now();
            Arc::clone(&entry.view)
        })
    }

    /// Removes and tears down the view. Returns false for an unknown id.
    pub fn unmount(&self, id: &Uuid) -> bool {
        match self.views.remove(id) {
            Some((_, entry)) => {
                entry.view.teardown();
                info!(kind = self.kind, %id, "View unmounted");
                true
            }
            None => false,
        }
    }

    /// Unmounts every view not looked up within `ttl`. Returns how many went.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let idle: Vec<Uuid> = self
            .views
            .iter()
            .filter(|entry| entry.idle_for(now) >= ttl)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in idle {
            // re-checked under the shard lock, a lookup may have raced the scan
            if let Some((_, entry)) = self.views.remove_if(&id, |_, entry| entry.idle_for(now) >= ttl) {
                entry.view.teardown();
                info!(kind = self.kind, %id, idle_secs = ttl.as_secs(), "Idle view evicted");
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Tears down every mounted view, used on shutdown.
    pub fn unmount_all(&self) {
        let ids: Vec<Uuid> = self.views.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.unmount(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl View for Counting {
        fn teardown(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_unmount_tears_down_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ViewRegistry::new("test");
        let (id, _) = registry.mount(Counting(count.clone()));
        assert!(registry.get(&id).is_some());

        assert!(registry.unmount(&id));
        assert!(!registry.unmount(&id));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_evict_idle_spares_recently_used_views() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ViewRegistry::new("test");
        let (stale, _) = registry.mount(Counting(count.clone()));
        let (active, _) = registry.mount(Counting(count.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.get(&active).is_some());

        assert_eq!(registry.evict_idle(Duration::from_millis(50)), 1);
        assert!(registry.get(&stale).is_none());
        assert!(registry.get(&active).is_some());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // nothing idle long enough the second time round
        assert_eq!(registry.evict_idle(Duration::from_millis(50)), 0);
    }

    #[test]
    fn test_unmount_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ViewRegistry::new("test");
        registry.mount(Counting(count.clone()));
        registry.mount(Counting(count.clone()));
        registry.unmount_all();
        assert!(registry.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
