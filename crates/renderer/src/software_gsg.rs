//! CPU state guardian: texture coordinate generation without a GPU.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3};

use corelib::{GeomRendering, GraphicsStateGuardian, TexGenAttrib, TexGenMode, TextureStage};

/// Stages a shader path can generate coordinates for.
pub const MAX_TEXGEN_STAGES: usize = 8;

/// Texgen state as uploaded to a shader (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexGenUniform {
    /// Mode tag per stage slot, in stage order.
    pub modes: [u32; MAX_TEXGEN_STAGES],
    pub stage_count: u32,
    pub point_sprites: u32,
    pub _pad: [u32; 2],
}

/// Texcoords across a point sprite's face: upper-left, upper-right,
/// lower-left, lower-right.
pub fn point_sprite_corners() -> [Vec2; 4] {
    [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
    ]
}

pub struct SoftwareGsg {
    tex_gen: TexGenAttrib,
    model: Mat4,
    view: Mat4,
    issue_count: usize,
}

impl SoftwareGsg {
    pub fn new() -> Self {
        Self {
            tex_gen: TexGenAttrib::default(),
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            issue_count: 0,
        }
    }

    /// Object-to-world and world-to-eye transforms for the next draw.
    pub fn set_transforms(&mut self, model: Mat4, view: Mat4) {
        self.model = model;
        self.view = view;
    }

    /// The texgen state most recently issued.
    #[inline]
    pub fn tex_gen(&self) -> &TexGenAttrib {
        &self.tex_gen
    }

    #[inline]
    pub fn issue_count(&self) -> usize {
        self.issue_count
    }

    /// Rendering bits for geometry drawn under the current state.
    pub fn geom_rendering(&self, requested: GeomRendering) -> GeomRendering {
        self.tex_gen.get_geom_rendering(requested)
    }

    /// Whether the geometry must supply authored texcoords for `stage`.
    pub fn needs_texcoords(&self, stage: &TextureStage) -> bool {
        !self.tex_gen.get_no_texcoords().contains(stage)
    }

    /// Generated coordinates for `stage`, one per position. `None` when the
    /// stage uses authored texcoords (`Off`) or the rasterizer supplies them
    /// (`PointSprite`). Missing normals count as +Z.
    pub fn generate_texcoords(
        &self,
        stage: &TextureStage,
        positions: &[Vec3],
        normals: &[Vec3],
    ) -> Option<Vec<Vec3>> {
        let mode = self.tex_gen.get_mode(stage);
        if matches!(mode, TexGenMode::Off | TexGenMode::PointSprite) {
            return None;
        }

        let model_view = self.view * self.model;
        let normal_world = Mat3::from_mat4(self.model).inverse().transpose();
        let normal_eye = Mat3::from_mat4(model_view).inverse().transpose();
        let camera_world = self.view.inverse().w_axis.truncate();

        let coords = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let n = normals.get(i).copied().unwrap_or(Vec3::Z);
                match mode {
                    TexGenMode::EyeSphereMap => {
                        let eye = model_view.transform_point3(p).normalize_or_zero();
                        let r = reflect(eye, (normal_eye * n).normalize_or_zero());
                        sphere_map(r)
                    }
                    TexGenMode::WorldCubeMap => {
                        let incident = (self.model.transform_point3(p) - camera_world).normalize_or_zero();
                        reflect(incident, (normal_world * n).normalize_or_zero())
                    }
                    TexGenMode::EyeCubeMap => {
                        let eye = model_view.transform_point3(p).normalize_or_zero();
                        reflect(eye, (normal_eye * n).normalize_or_zero())
                    }
                    TexGenMode::WorldNormal => (normal_world * n).normalize_or_zero(),
                    TexGenMode::EyeNormal => (normal_eye * n).normalize_or_zero(),
                    TexGenMode::WorldPosition => self.model.transform_point3(p),
                    TexGenMode::ObjectPosition => p,
                    TexGenMode::EyePosition => model_view.transform_point3(p),
                    TexGenMode::Off | TexGenMode::PointSprite => unreachable!(),
                }
            })
            .collect();
        Some(coords)
    }

    /// Pack the current state for a shader. Stages past
    /// [`MAX_TEXGEN_STAGES`] are dropped.
    pub fn uniform(&self) -> TexGenUniform {
        let mut uniform = TexGenUniform::zeroed();
        for (slot, (_, mode)) in self.tex_gen.stages().take(MAX_TEXGEN_STAGES).enumerate() {
            uniform.modes[slot] = u32::from(mode.tag());
            uniform.stage_count += 1;
        }
        uniform.point_sprites = u32::from(self.tex_gen.num_point_sprites() > 0);
        uniform
    }
}

impl Default for SoftwareGsg {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsStateGuardian for SoftwareGsg {
    fn issue_tex_gen(&mut self, attrib: &TexGenAttrib) {
        if attrib.num_stages() > MAX_TEXGEN_STAGES {
            log::warn!(
                "texgen: {} stages issued, only {} reach the shader path",
                attrib.num_stages(),
                MAX_TEXGEN_STAGES
            );
        }
        log::debug!("issue {}", attrib);
        self.tex_gen = attrib.clone();
        self.issue_count += 1;
    }
}

#[inline]
fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Map an eye-space reflection vector onto the sphere map's unit square.
fn sphere_map(r: Vec3) -> Vec3 {
    let m = 2.0 * (r.x * r.x + r.y * r.y + (r.z + 1.0) * (r.z + 1.0)).sqrt();
    if m <= f32::EPSILON {
        return Vec3::new(0.5, 0.5, 0.0);
    }
    Vec3::new(r.x / m + 0.5, r.y / m + 0.5, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn issued(stage: &Arc<TextureStage>, mode: TexGenMode) -> SoftwareGsg {
        let mut gsg = SoftwareGsg::new();
        TexGenAttrib::make_stage(stage, mode).issue(&mut gsg);
        gsg
    }

    fn assert_vec3(actual: Vec3, expected: Vec3) {
        assert_abs_diff_eq!(actual.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(actual.y, expected.y, epsilon = 1e-5);
        assert_abs_diff_eq!(actual.z, expected.z, epsilon = 1e-5);
    }

    #[test]
    fn issue_records_state() {
        let stage = TextureStage::new("env").into_shared();
        let gsg = issued(&stage, TexGenMode::EyeNormal);
        assert_eq!(gsg.issue_count(), 1);
        assert_eq!(gsg.tex_gen().get_mode(&stage), TexGenMode::EyeNormal);
        assert!(!gsg.needs_texcoords(&stage));
        assert!(gsg.needs_texcoords(&TextureStage::new("other")));
    }

    #[test]
    fn off_and_sprites_generate_nothing() {
        let stage = TextureStage::new("s").into_shared();
        let positions = [Vec3::ZERO];
        assert!(issued(&stage, TexGenMode::Off)
            .generate_texcoords(&stage, &positions, &[])
            .is_none());
        let sprites = issued(&stage, TexGenMode::PointSprite);
        assert!(sprites.generate_texcoords(&stage, &positions, &[]).is_none());
        assert!(sprites
            .geom_rendering(GeomRendering::POINT)
            .contains(GeomRendering::POINT_SPRITE));
        assert_eq!(point_sprite_corners()[3], Vec2::ONE);
    }

    #[test]
    fn position_modes_follow_transforms() {
        let stage = TextureStage::new("proj").into_shared();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let p = [Vec3::new(1.0, 0.0, 0.0)];

        let mut gsg = issued(&stage, TexGenMode::ObjectPosition);
        gsg.set_transforms(model, view);
        assert_vec3(gsg.generate_texcoords(&stage, &p, &[]).unwrap()[0], p[0]);

        let mut gsg = issued(&stage, TexGenMode::WorldPosition);
        gsg.set_transforms(model, view);
        assert_vec3(
            gsg.generate_texcoords(&stage, &p, &[]).unwrap()[0],
            Vec3::new(2.0, 2.0, 3.0),
        );

        let mut gsg = issued(&stage, TexGenMode::EyePosition);
        gsg.set_transforms(model, view);
        assert_vec3(
            gsg.generate_texcoords(&stage, &p, &[]).unwrap()[0],
            Vec3::new(2.0, 2.0, -7.0),
        );
    }

    #[test]
    fn sphere_map_centre_faces_camera() {
        let stage = TextureStage::new("shiny").into_shared();
        let mut gsg = issued(&stage, TexGenMode::EyeSphereMap);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        gsg.set_transforms(Mat4::IDENTITY, view);

        let positions = [Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0), Vec3::new(-2.0, 0.5, 0.3)];
        let normals = [Vec3::Z, Vec3::new(0.6, 0.0, 0.8), Vec3::new(-0.3, 0.9, 0.1)];
        let coords = gsg.generate_texcoords(&stage, &positions, &normals).unwrap();
        assert_vec3(coords[0], Vec3::new(0.5, 0.5, 0.0));
        for c in coords {
            assert!((0.0..=1.0).contains(&c.x) && (0.0..=1.0).contains(&c.y), "{c:?}");
        }
    }

    #[test]
    fn cube_map_reflects_view_ray() {
        let stage = TextureStage::new("cube").into_shared();
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);

        let mut world = issued(&stage, TexGenMode::WorldCubeMap);
        world.set_transforms(Mat4::IDENTITY, view);
        let r = world.generate_texcoords(&stage, &[Vec3::ZERO], &[Vec3::Z]).unwrap();
        assert_vec3(r[0], Vec3::Z);

        let mut eye = issued(&stage, TexGenMode::EyeCubeMap);
        eye.set_transforms(Mat4::IDENTITY, view);
        let r = eye.generate_texcoords(&stage, &[Vec3::ZERO], &[Vec3::Z]).unwrap();
        assert_vec3(r[0], Vec3::Z);
    }

    #[test]
    fn normal_modes_use_inverse_transpose() {
        let stage = TextureStage::new("n").into_shared();
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let mut gsg = issued(&stage, TexGenMode::WorldNormal);
        gsg.set_transforms(model, Mat4::IDENTITY);
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let out = gsg.generate_texcoords(&stage, &[Vec3::ZERO], &[n]).unwrap()[0];
        assert_vec3(out, Vec3::new(0.5, 1.0, 0.0).normalize());
    }

    #[test]
    fn uniform_packs_stage_modes() {
        let a = TextureStage::new("a").with_sort(0).into_shared();
        let b = TextureStage::new("b").with_sort(1).into_shared();
        let mut gsg = SoftwareGsg::new();
        TexGenAttrib::make()
            .add_stage(&a, TexGenMode::EyeSphereMap)
            .add_stage(&b, TexGenMode::PointSprite)
            .issue(&mut gsg);
        let u = gsg.uniform();
        assert_eq!(u.stage_count, 2);
        assert_eq!(&u.modes[..2], &[1, 9]);
        assert_eq!(u.point_sprites, 1);
        assert_eq!(bytemuck::bytes_of(&u).len(), 48);
    }
}
