//! Post-load filter applying a txa file to every texture the pool loads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::filter::TexturePoolFilter;
use crate::texture::{MAX_TEXTURE_SIZE, Texture};
use crate::txa::{SizeRequest, TxaError, TxaFile, TxaRequest};

type TxaLoader = Box<dyn Fn() -> Result<TxaFile, TxaError> + Send + Sync>;

// txa files read so far in this process, by path
static SHARED_TXA_FILES: Lazy<Mutex<HashMap<PathBuf, Arc<TxaFile>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

enum TxaSource {
    Path(PathBuf),
    Loader(TxaLoader),
}

/// Scales, reformats and sets sampling on textures as a txa file requests.
///
/// The txa file is read the first time a texture passes through, and never
/// again. Filters built from a path share that read process-wide, so any
/// number of filters on one file read it once; a filter built with
/// [`TxaFileFilter::from_loader`] keeps its own copy. If the file is
/// missing or malformed every texture passes unchanged.
pub struct TxaFileFilter {
    source: String,
    loader: TxaSource,
    txa_file: OnceCell<Arc<TxaFile>>,
}

impl TxaFileFilter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: path.display().to_string(),
            loader: TxaSource::Path(path),
            txa_file: OnceCell::new(),
        }
    }

    /// Use the configured txa file, looked up along the model path.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let path = config
            .resolve(&config.txa_file)
            .unwrap_or_else(|| config.txa_file.clone());
        Self::new(path)
    }

    pub fn from_loader<F>(source: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<TxaFile, TxaError> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            loader: TxaSource::Loader(Box::new(loader)),
            txa_file: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.txa_file.get().is_some()
    }

    /// The parsed txa file, reading it on first call.
    pub fn txa_file(&self) -> &TxaFile {
        self.txa_file.get_or_init(|| match &self.loader {
            TxaSource::Path(path) => {
                let mut shared = SHARED_TXA_FILES.lock();
                shared
                    .entry(path.clone())
                    .or_insert_with(|| Arc::new(self.read_txa_file(|| TxaFile::read(path))))
                    .clone()
            }
            TxaSource::Loader(loader) => Arc::new(self.read_txa_file(loader)),
        })
    }

    fn read_txa_file(&self, loader: impl Fn() -> Result<TxaFile, TxaError>) -> TxaFile {
        match loader() {
            Ok(txa) => {
                log::info!("Read {} ({} rules)", self.source, txa.num_rules());
                txa
            }
            Err(err) => {
                log::warn!("{} unusable, textures pass unchanged: {}", self.source, err);
                TxaFile::new()
            }
        }
    }
}

impl TexturePoolFilter for TxaFileFilter {
    fn name(&self) -> &str {
        "txa-file"
    }

    fn post_load(&self, mut tex: Texture) -> Result<Texture> {
        let txa = self.txa_file();
        let Some(request) = txa.match_texture(tex.name()) else {
            return Ok(tex);
        };
        apply_request(&mut tex, &request, txa.powertwo())?;
        Ok(tex)
    }
}

fn apply_request(tex: &mut Texture, request: &TxaRequest, powertwo: bool) -> Result<()> {
    let current = (tex.x_size(), tex.y_size());

    if !request.omit {
        let (mut x, mut y) = match request.size {
            Some(SizeRequest::Explicit { x, y }) => (x, y),
            Some(SizeRequest::Scale(pct)) => (scaled(current.0, pct), scaled(current.1, pct)),
            None => current,
        };
        if powertwo {
            x = round_down_power_of_two(x);
            y = round_down_power_of_two(y);
        }
        if x > MAX_TEXTURE_SIZE || y > MAX_TEXTURE_SIZE {
            log::warn!(
                "txa: '{}' would scale to {}x{}, over the {} limit; size left as is",
                tex.name(),
                x,
                y,
                MAX_TEXTURE_SIZE
            );
        } else if (x, y) != current {
            log::info!(
                "txa: scaling '{}' from {}x{} to {}x{}",
                tex.name(),
                current.0,
                current.1,
                x,
                y
            );
            tex.rescale(x, y)?;
        }
    }

    if let Some(format) = request.format.filter(|_| !request.keep_format) {
        if format != tex.format() {
            log::info!("txa: '{}' {:?} -> {:?}", tex.name(), tex.format(), format);
            tex.reformat(format)?;
        }
    }

    let mut sampler = tex.sampler();
    if let Some(filter) = request.min_filter {
        sampler.min_filter = filter;
    }
    if let Some(filter) = request.mag_filter {
        sampler.mag_filter = filter;
    }
    if let Some(degree) = request.anisotropic_degree {
        sampler.anisotropic_degree = degree;
    }
    tex.set_sampler(sampler);

    // a reload from disk would lose all of the above
    tex.set_keep_ram_image(true);
    Ok(())
}

fn scaled(size: u32, pct: f32) -> u32 {
    ((size as f32 * pct / 100.0).round() as u32).max(1)
}

fn round_down_power_of_two(n: u32) -> u32 {
    match n {
        0 => 1,
        n => 1 << (u32::BITS - 1 - n.leading_zeros()),
    }
}
