//! Texture stages: named slots for one texture unit in a multitexture pass.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use once_cell::sync::Lazy;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

static DEFAULT_STAGE: Lazy<Arc<TextureStage>> =
    Lazy::new(|| Arc::new(TextureStage::new(TextureStage::DEFAULT_NAME)));

/// One texture unit slot. Immutable once built; share it as `Arc<TextureStage>`.
///
/// Two stages built separately are distinct even when every field matches:
/// each carries a process-unique serial. Ordering is `(sort, name, serial)`,
/// so maps keyed by stages iterate in multitexture order.
#[derive(Clone, Debug)]
pub struct TextureStage {
    name: String,
    sort: i32,
    priority: i32,
    texcoord_name: String,
    serial: u64,
}

impl TextureStage {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const DEFAULT_TEXCOORD: &'static str = "texcoord";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: 0,
            priority: 0,
            texcoord_name: Self::DEFAULT_TEXCOORD.to_owned(),
            serial: NEXT_SERIAL.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }

    /// The shared stage used when geometry does not name one.
    pub fn default_stage() -> Arc<TextureStage> {
        DEFAULT_STAGE.clone()
    }

    #[inline]
    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    #[inline]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    pub fn with_texcoord_name(mut self, texcoord_name: impl Into<String>) -> Self {
        self.texcoord_name = texcoord_name.into();
        self
    }

    pub fn into_shared(self) -> Arc<TextureStage> {
        Arc::new(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn sort(&self) -> i32 {
        self.sort
    }

    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Name of the vertex column this stage reads authored UVs from.
    #[inline]
    pub fn texcoord_name(&self) -> &str {
        &self.texcoord_name
    }

    /// True only for the shared default stage itself, not for copies of it
    /// with any field changed.
    pub fn is_default(&self) -> bool {
        let default = &**DEFAULT_STAGE;
        self.key() == default.key()
            && self.priority == default.priority
            && self.texcoord_name == default.texcoord_name
    }

    fn key(&self) -> (i32, &str, u64) {
        (self.sort, &self.name, self.serial)
    }
}

impl PartialEq for TextureStage {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TextureStage {}

impl Hash for TextureStage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl PartialOrd for TextureStage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TextureStage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for TextureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_are_distinct_stages() {
        let a = TextureStage::new("env");
        let b = TextureStage::new("env");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn order_follows_sort_then_name() {
        let late = TextureStage::new("a").with_sort(10);
        let early = TextureStage::new("z").with_sort(-1);
        let mid = TextureStage::new("m");
        let mut stages = vec![late.clone(), mid.clone(), early.clone()];
        stages.sort();
        assert_eq!(stages, vec![early, mid, late]);
    }

    #[test]
    fn default_stage_is_shared() {
        let a = TextureStage::default_stage();
        let b = TextureStage::default_stage();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_default());
        assert!(!TextureStage::new("default").is_default());
        assert_eq!(a.texcoord_name(), TextureStage::DEFAULT_TEXCOORD);
    }

    #[test]
    fn modified_copy_of_default_is_not_default() {
        let base = TextureStage::default_stage();
        assert!((*base).clone().is_default());
        assert!(!(*base).clone().with_sort(3).is_default());
        assert!(!(*base).clone().with_priority(2).is_default());
        assert!(!(*base).clone().with_texcoord_name("uv1").is_default());
    }
}
