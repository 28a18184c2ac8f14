//! Shared registry of opened store handles

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::Result;

use super::handle::{HandleState, StoreHandle};

type HandleCell = Arc<OnceCell<Arc<StoreHandle>>>;

/// Opened handles keyed by store location.
///
/// Concurrent first requests for the same location share one open; later
/// requests reuse the handle. Constructed explicitly and shared by `Arc`, so
/// tests and embedders can run independent registries side by side.
#[derive(Default)]
pub struct StoreRegistry {
    handles: DashMap<PathBuf, HandleCell>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the opened handle for `location`, opening it at most once
    pub async fn get_or_open(&self, location: &Path) -> Result<Arc<StoreHandle>> {
        loop {
            let cell = self
                .handles
                .entry(location.to_path_buf())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let opened = cell
                .get_or_try_init(|| async {
                    tracing::debug!("Opening store {}", location.display());
                    StoreHandle::open_at(location).await.map(Arc::new)
                })
                .await;

            match opened {
                Ok(handle) if handle.state() == HandleState::Closed => {
                    // Released behind our back; drop the stale entry and reopen
                    self.handles.remove_if(location, |_, current| Arc::ptr_eq(current, &cell));
                }
                Ok(handle) => return Ok(Arc::clone(handle)),
                Err(e) => {
                    self.handles.remove_if(location, |_, current| Arc::ptr_eq(current, &cell));
                    return Err(e);
                }
            }
        }
    }

    /// Handle for `location` if one is already opened
    pub fn cached(&self, location: &Path) -> Option<Arc<StoreHandle>> {
        self.handles
            .get(location)
            .and_then(|cell| cell.get().cloned())
    }

    /// Forget the handle for `location` without closing it.
    ///
    /// Callers already holding it finish their work on the old index; the
    /// next `get_or_open` loads the store afresh.
    pub fn evict(&self, location: &Path) -> Option<Arc<StoreHandle>> {
        self.handles
            .remove(location)
            .and_then(|(_, cell)| cell.get().cloned())
    }

    /// Forget and close the handle for `location`
    pub fn release(&self, location: &Path) -> bool {
        match self.evict(location) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Number of tracked locations
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no locations are tracked
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
