//! Shared render-state protocol and the interning cache behind it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::gsg::GraphicsStateGuardian;

/// An immutable, composable piece of render state.
pub trait RenderAttrib: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static {
    /// `other` layered on top of `self`.
    fn compose(&self, other: &Self) -> Arc<Self>;
    /// The state `x` with `self.compose(x)` equivalent to `other`.
    fn invert_compose(&self, other: &Self) -> Arc<Self>;
    /// The state that has no effect.
    fn make_default() -> Arc<Self>;
    fn issue(&self, gsg: &mut dyn GraphicsStateGuardian);
}

/// Content-keyed cache: equal attributes share one allocation while any
/// holder keeps it alive.
pub struct AttribCache<A> {
    inner: Mutex<CacheInner<A>>,
}

struct CacheInner<A> {
    entries: HashMap<A, Weak<A>>,
    // entry count at which the next intern sweeps dead entries
    sweep_at: usize,
}

const MIN_SWEEP_AT: usize = 64;

impl<A: RenderAttrib> CacheInner<A> {
    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_AT);
        before - self.entries.len()
    }
}

impl<A: RenderAttrib> AttribCache<A> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                sweep_at: MIN_SWEEP_AT,
            }),
        }
    }

    /// Return the shared instance equal to `attrib`, inserting it if needed.
    pub fn intern(&self, attrib: A) -> Arc<A> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get(&attrib).and_then(Weak::upgrade) {
            return existing;
        }
        if inner.entries.len() >= inner.sweep_at {
            inner.sweep();
        }
        let shared = Arc::new(attrib.clone());
        inner.entries.insert(attrib, Arc::downgrade(&shared));
        shared
    }

    /// Number of entries still referenced somewhere.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries nobody references anymore. Returns how many went.
    pub fn garbage_collect(&self) -> usize {
        let removed = self.inner.lock().sweep();
        if removed > 0 {
            log::debug!("attrib cache: collected {removed} dead entries");
        }
        removed
    }
}

impl<A: RenderAttrib> Default for AttribCache<A> {
    fn default() -> Self {
        Self::new()
    }
}
