//! Asset loading: textures, the texture pool and its post-load filters.
//! Textures are read once from disk, passed through the registered filters
//! in order, then cached by resolved path.

pub mod config;
pub mod filter;
pub mod pool;
pub mod texture;
pub mod txa;
pub mod txa_filter;

pub use config::PipelineConfig;
pub use filter::{FilterRegistry, TexturePoolFilter, filter_fn};
pub use pool::TexturePool;
pub use texture::{
    MAX_TEXTURE_SIZE, SamplerFilter, SamplerSettings, Texture, TextureData, TextureFormat,
};
pub use txa::{SizeRequest, TxaError, TxaFile, TxaRequest};
pub use txa_filter::TxaFileFilter;
