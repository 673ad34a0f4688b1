use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::external::{FetchError, MarketBackend};
use crate::models::{all_symbols, TickerSet, Wishlist};

#[derive(Default)]
struct CacheState {
    /// Bumped by every invalidation.
    generation: u64,
    lists: Option<Vec<Wishlist>>,
}

/// Read-through cache of the backend's wishlists.
///
/// The backend stays the source of truth: every mutation goes straight to it
/// and drops the cached copy. A read that was already in flight when the copy
/// was dropped returns its result but does not store it.
#[derive(Clone)]
pub struct WishlistCache {
    backend: Arc<dyn MarketBackend>,
    state: Arc<Mutex<CacheState>>,
}

impl WishlistCache {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub async fn list(&self) -> Result<Vec<Wishlist>, FetchError> {
        let generation = {
            let state = self.state.lock();
            if let Some(lists) = &state.lists {
                debug!("Serving {} wishlists from cache", lists.len());
                return Ok(lists.clone());
            }
            state.generation
        };

        let lists = self.backend.list_wishlists().await?;

        let mut state = self.state.lock();
        if state.generation == generation {
            state.lists = Some(lists.clone());
        } else {
            debug!("Wishlists changed during read, not caching");
        }
        Ok(lists)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Wishlist>, FetchError> {
        let lists = self.list().await?;
        Ok(lists.into_iter().find(|w| w.name == name))
    }

    /// Union of every wishlist's symbols.
    pub async fn all_symbols(&self) -> Result<TickerSet, FetchError> {
        Ok(all_symbols(&self.list().await?))
    }

    pub async fn create(&self, wishlist: Wishlist) -> Result<Wishlist, FetchError> {
        let result = self.backend.create_wishlist(&wishlist).await;
        self.invalidate();
        let created = result?;
        info!("Created wishlist {:?} with {} symbols", created.name, created.symbols.len());
        Ok(created)
    }

    pub async fn append(&self, name: &str, symbols: &TickerSet) -> Result<(), FetchError> {
        let result = self.backend.append_to_wishlist(name, symbols).await;
        self.invalidate();
        result?;
        info!("Appended [{}] to wishlist {:?}", symbols.to_csv(), name);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), FetchError> {
        let result = self.backend.delete_wishlist(id).await;
        self.invalidate();
        result?;
        info!("Deleted wishlist {}", id);
        Ok(())
    }

    /// Drops the cached copy; the next read goes to the backend.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.lists = None;
    }
}
