//! Backend-facing seam: the state guardian that render attributes issue into.

use bitflags::bitflags;

use crate::texgen::TexGenAttrib;

bitflags! {
    /// Properties of the geometry being drawn that a backend must honor.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GeomRendering: u32 {
        const POINT = 1 << 0;
        const LINES = 1 << 1;
        const TRIANGLES = 1 << 2;
        /// Points are drawn as textured quads with generated corner UVs.
        const POINT_SPRITE = 1 << 3;
        const PER_POINT_SIZE = 1 << 4;
    }
}

/// Programs render state into a concrete backend.
pub trait GraphicsStateGuardian {
    fn issue_tex_gen(&mut self, attrib: &TexGenAttrib);
}
