//! Renderer side of render state: a software state guardian that turns
//! issued texgen state into per-vertex texture coordinates, plus the
//! uniform block a shader path would upload.

pub mod software_gsg;

pub use software_gsg::{MAX_TEXGEN_STAGES, SoftwareGsg, TexGenUniform, point_sprite_corners};
