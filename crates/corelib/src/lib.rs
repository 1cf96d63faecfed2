//! Core types: texture stages, render-state attributes, archive format.

pub mod bam;
pub mod error;
pub mod gsg;
pub mod render_attrib;
pub mod texgen;
pub mod texture_stage;

pub use error::{CoreError, CoreResult};
pub use gsg::{GeomRendering, GraphicsStateGuardian};
pub use render_attrib::{AttribCache, RenderAttrib};
pub use texgen::{TexGenAttrib, TexGenMode};
pub use texture_stage::TextureStage;
