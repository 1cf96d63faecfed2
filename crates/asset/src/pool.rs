//! Texture pool: loads textures once, runs post-load filters, caches by path.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::filter::{FilterRegistry, TexturePoolFilter};
use crate::texture::Texture;

static GLOBAL_POOL: Lazy<Mutex<TexturePool>> =
    Lazy::new(|| Mutex::new(TexturePool::new(PipelineConfig::from_env())));

pub struct TexturePool {
    config: PipelineConfig,
    textures: HashMap<PathBuf, Arc<Texture>>,
    filters: FilterRegistry,
}

impl TexturePool {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            textures: HashMap::new(),
            filters: FilterRegistry::new(),
        }
    }

    /// Process-wide pool, configured from the environment on first use.
    pub fn global() -> &'static Mutex<TexturePool> {
        &GLOBAL_POOL
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the search configuration. Already cached textures stay.
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    pub fn register_filter(&mut self, filter: Box<dyn TexturePoolFilter>) {
        self.filters.register(filter);
    }

    #[inline]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Locate `path` on disk and return the key the pool caches it under.
    pub fn resolve_filename(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let found = self.config.resolve(path).ok_or_else(|| {
            anyhow!(
                "Texture {:?} not found (model path: {:?})",
                path,
                self.config.model_path
            )
        })?;
        Ok(fs::canonicalize(&found).unwrap_or(found))
    }

    /// Return the cached texture, or read it from disk and run the filters.
    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Result<Arc<Texture>> {
        let fullpath = self.resolve_filename(path)?;
        if let Some(tex) = self.textures.get(&fullpath) {
            log::debug!("Texture {:?} served from pool", fullpath);
            return Ok(tex.clone());
        }

        let tex = Texture::load(&fullpath)?;
        let tex = self
            .filters
            .run_post_load(tex)
            .with_context(|| format!("Failed to load texture {:?}", fullpath))?;
        log::info!(
            "Loaded texture '{}' {}x{} {:?}",
            tex.name(),
            tex.x_size(),
            tex.y_size(),
            tex.format()
        );

        let tex = Arc::new(tex);
        self.textures.insert(fullpath, tex.clone());
        Ok(tex)
    }

    /// Re-read a texture from disk without running the filters again. A
    /// texture marked `keep_ram_image` stays as it is.
    pub fn reload_texture(&mut self, path: impl AsRef<Path>) -> Result<Arc<Texture>> {
        let fullpath = self.resolve_filename(&path)?;
        let Some(old) = self.textures.get(&fullpath).cloned() else {
            return self.load_texture(path);
        };
        if old.keep_ram_image() {
            log::debug!("Texture '{}' keeps its RAM image; reload skipped", old.name());
            return Ok(old);
        }

        let mut fresh = Texture::load(&fullpath)?;
        fresh.set_name(old.name());
        fresh.set_sampler(old.sampler());
        log::info!("Reloaded texture '{}'", fresh.name());

        let fresh = Arc::new(fresh);
        self.textures.insert(fullpath, fresh.clone());
        Ok(fresh)
    }

    /// Put an already-built texture in the pool. Filters do not run.
    pub fn add_texture(&mut self, tex: Texture) -> Arc<Texture> {
        let key = tex
            .fullpath()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(tex.name()));
        let tex = Arc::new(tex);
        self.textures.insert(key, tex.clone());
        tex
    }

    pub fn has_texture(&self, path: impl AsRef<Path>) -> bool {
        self.cache_key(path.as_ref())
            .is_some_and(|key| self.textures.contains_key(&key))
    }

    pub fn release_texture(&mut self, path: impl AsRef<Path>) -> bool {
        match self.cache_key(path.as_ref()) {
            Some(key) => self.textures.remove(&key).is_some(),
            None => false,
        }
    }

    /// Drop every cached texture; returns how many were held.
    pub fn release_all(&mut self) -> usize {
        let count = self.textures.len();
        self.textures.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn cache_key(&self, path: &Path) -> Option<PathBuf> {
        if self.textures.contains_key(path) {
            return Some(path.to_path_buf());
        }
        self.resolve_filename(path).ok()
    }
}
