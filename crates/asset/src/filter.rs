//! Post-load texture filters.
//!
//! A filter registered with the pool sees every texture the first time it is
//! loaded from disk, and may modify it or return a different one. Filters run
//! in registration order, each receiving the previous filter's result. A
//! texture reloaded from disk later does not go through the filters again;
//! filters whose work must survive a reload should set
//! [`Texture::set_keep_ram_image`].

use anyhow::{Context, Result};

use crate::texture::Texture;

pub trait TexturePoolFilter: Send + Sync {
    /// Label used in logs and error context.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn post_load(&self, tex: Texture) -> Result<Texture>;
}

/// Filter built from a closure.
pub struct FnFilter<F> {
    name: String,
    f: F,
}

impl<F> TexturePoolFilter for FnFilter<F>
where
    F: Fn(Texture) -> Result<Texture> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn post_load(&self, tex: Texture) -> Result<Texture> {
        (self.f)(tex)
    }
}

pub fn filter_fn<F>(name: impl Into<String>, f: F) -> FnFilter<F>
where
    F: Fn(Texture) -> Result<Texture> + Send + Sync,
{
    FnFilter {
        name: name.into(),
        f,
    }
}

/// Ordered set of filters; order of registration is order of invocation.
#[derive(Default)]
pub struct FilterRegistry {
    filters: Vec<Box<dyn TexturePoolFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: Box<dyn TexturePoolFilter>) {
        log::debug!("Registered texture filter '{}'", filter.name());
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name())
    }

    /// Thread `tex` through every filter. The first failure stops the chain.
    pub fn run_post_load(&self, tex: Texture) -> Result<Texture> {
        let mut result = tex;
        for filter in &self.filters {
            let name = result.name().to_owned();
            result = filter
                .post_load(result)
                .with_context(|| format!("filter '{}' failed on texture '{}'", filter.name(), name))?;
        }
        Ok(result)
    }
}
