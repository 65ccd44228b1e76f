//! Latest-value holder for the engine's configuration.

use arc_swap::ArcSwap;
use composable_fetch_core::FetchConfig;
use std::sync::Arc;

/// Always holds the most recently supplied [`FetchConfig`].
///
/// Writers replace the whole configuration; readers take a cheap `Arc`
/// snapshot that stays valid for the rest of their submission even if the
/// host swaps in a new configuration meanwhile.
pub struct LatestConfig<A, R, E> {
    current: ArcSwap<FetchConfig<A, R, E>>,
}

impl<A, R, E> LatestConfig<A, R, E> {
    /// Hold `config`
    #[must_use]
    pub fn new(config: FetchConfig<A, R, E>) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Replace the configuration
    pub fn store(&self, config: FetchConfig<A, R, E>) {
        self.current.store(Arc::new(config));
    }

    /// Snapshot of the current configuration
    #[must_use]
    pub fn load(&self) -> Arc<FetchConfig<A, R, E>> {
        self.current.load_full()
    }
}

impl<A, R, E> std::fmt::Debug for LatestConfig<A, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestConfig")
            .field("current", &*self.current.load())
            .finish()
    }
}
