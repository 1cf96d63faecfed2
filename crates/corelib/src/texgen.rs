//! Automatic texture-coordinate generation state.
//!
//! A [`TexGenAttrib`] maps texture stages to a [`TexGenMode`]. Instances are
//! immutable and interned: every operation returns a shared `Arc` from the
//! process-wide cache, so equal states are pointer-equal while alive.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{CoreError, CoreResult};
use crate::gsg::{GeomRendering, GraphicsStateGuardian};
use crate::render_attrib::{AttribCache, RenderAttrib};
use crate::texture_stage::TextureStage;

/// How texture coordinates are computed for a stage.
///
/// "eye" is the observing camera's space, "object" the local space of the
/// geometry and "world" the space of the scene root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TexGenMode {
    /// Use the texcoords authored on the geometry.
    #[default]
    Off = 0,
    /// Classic static reflection map from a 180-degree fisheye image.
    /// Only meaningful in eye space.
    EyeSphereMap = 1,
    /// Reflection vector for cube map lookups.
    WorldCubeMap = 2,
    EyeCubeMap = 3,
    /// Vertex normal, mostly for diffuse lighting through a cube map.
    WorldNormal = 4,
    EyeNormal = 5,
    /// Vertex position copied into the texcoord (projective texturing).
    WorldPosition = 6,
    ObjectPosition = 7,
    EyePosition = 8,
    /// Large points get (0,0)-(1,1) across their face, upper-left to
    /// lower-right, instead of a single uniform texcoord.
    PointSprite = 9,
}

impl TexGenMode {
    pub const ALL: [TexGenMode; 10] = [
        TexGenMode::Off,
        TexGenMode::EyeSphereMap,
        TexGenMode::WorldCubeMap,
        TexGenMode::EyeCubeMap,
        TexGenMode::WorldNormal,
        TexGenMode::EyeNormal,
        TexGenMode::WorldPosition,
        TexGenMode::ObjectPosition,
        TexGenMode::EyePosition,
        TexGenMode::PointSprite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TexGenMode::Off => "off",
            TexGenMode::EyeSphereMap => "eye_sphere_map",
            TexGenMode::WorldCubeMap => "world_cube_map",
            TexGenMode::EyeCubeMap => "eye_cube_map",
            TexGenMode::WorldNormal => "world_normal",
            TexGenMode::EyeNormal => "eye_normal",
            TexGenMode::WorldPosition => "world_position",
            TexGenMode::ObjectPosition => "object_position",
            TexGenMode::EyePosition => "eye_position",
            TexGenMode::PointSprite => "point_sprite",
        }
    }

    /// Wire tag used by the archive format.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TexGenMode {
    type Error = CoreError;

    fn try_from(tag: u8) -> CoreResult<Self> {
        TexGenMode::ALL
            .get(tag as usize)
            .copied()
            .ok_or(CoreError::UnknownTexGenMode(tag.to_string()))
    }
}

impl FromStr for TexGenMode {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        TexGenMode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownTexGenMode(s.to_owned()))
    }
}

impl fmt::Display for TexGenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Stages = BTreeMap<Arc<TextureStage>, TexGenMode>;

static CACHE: Lazy<AttribCache<TexGenAttrib>> = Lazy::new(AttribCache::new);

// Held strongly so the empty state is never evicted from the cache.
static EMPTY: Lazy<Arc<TexGenAttrib>> = Lazy::new(|| CACHE.intern(TexGenAttrib::default()));

/// Per-stage texture coordinate generation state.
#[derive(Clone, Debug, Default)]
pub struct TexGenAttrib {
    stages: Stages,
    // Stages whose texcoords come from texgen rather than from the geometry.
    // Always derived from `stages`.
    no_texcoords: BTreeSet<Arc<TextureStage>>,
    num_point_sprites: usize,
}

impl TexGenAttrib {
    /// The shared empty state.
    pub fn make() -> Arc<TexGenAttrib> {
        EMPTY.clone()
    }

    /// A state with exactly one stage configured.
    pub fn make_stage(stage: &Arc<TextureStage>, mode: TexGenMode) -> Arc<TexGenAttrib> {
        let mut stages = Stages::new();
        stages.insert(stage.clone(), mode);
        Self::from_stages(stages)
    }

    /// Build an interned state from an explicit mapping.
    pub fn from_stages(stages: BTreeMap<Arc<TextureStage>, TexGenMode>) -> Arc<TexGenAttrib> {
        if stages.is_empty() {
            return Self::make();
        }
        let no_texcoords = stages
            .iter()
            .filter(|(_, mode)| **mode != TexGenMode::Off)
            .map(|(stage, _)| stage.clone())
            .collect();
        let num_point_sprites = stages
            .values()
            .filter(|mode| **mode == TexGenMode::PointSprite)
            .count();
        CACHE.intern(TexGenAttrib {
            stages,
            no_texcoords,
            num_point_sprites,
        })
    }

    /// Returns a new state with `stage` set to `mode`, replacing any
    /// previous mode for that stage.
    pub fn add_stage(&self, stage: &Arc<TextureStage>, mode: TexGenMode) -> Arc<TexGenAttrib> {
        let mut stages = self.stages.clone();
        stages.insert(stage.clone(), mode);
        Self::from_stages(stages)
    }

    /// Returns a new state without `stage`. Removing an absent stage yields
    /// a state equal to this one.
    pub fn remove_stage(&self, stage: &TextureStage) -> Arc<TexGenAttrib> {
        let mut stages = self.stages.clone();
        stages.remove(stage);
        Self::from_stages(stages)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[inline]
    pub fn has_stage(&self, stage: &TextureStage) -> bool {
        self.stages.contains_key(stage)
    }

    /// Mode for `stage`, or [`TexGenMode::Off`] if the stage is not listed.
    pub fn get_mode(&self, stage: &TextureStage) -> TexGenMode {
        self.stages.get(stage).copied().unwrap_or_default()
    }

    #[inline]
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Stages and modes in stage order.
    pub fn stages(&self) -> impl Iterator<Item = (&Arc<TextureStage>, TexGenMode)> {
        self.stages.iter().map(|(stage, mode)| (stage, *mode))
    }

    /// Stages for which the geometry need not supply texcoords.
    #[inline]
    pub fn get_no_texcoords(&self) -> &BTreeSet<Arc<TextureStage>> {
        &self.no_texcoords
    }

    #[inline]
    pub fn num_point_sprites(&self) -> usize {
        self.num_point_sprites
    }

    /// Adjust the rendering bits for geometry drawn under this state: points
    /// become point sprites when any stage asks for them.
    pub fn get_geom_rendering(&self, geom_rendering: GeomRendering) -> GeomRendering {
        if geom_rendering.contains(GeomRendering::POINT) && self.num_point_sprites > 0 {
            geom_rendering | GeomRendering::POINT_SPRITE
        } else {
            geom_rendering
        }
    }

    /// Union of both states; `other` wins where both list a stage.
    pub fn compose(&self, other: &TexGenAttrib) -> Arc<TexGenAttrib> {
        let mut stages = self.stages.clone();
        for (stage, mode) in &other.stages {
            stages.insert(stage.clone(), *mode);
        }
        Self::from_stages(stages)
    }

    /// The state `x` for which `self.compose(x)` behaves like `other`.
    ///
    /// Stages only listed here are explicitly turned off; stages listed in
    /// `other` keep `other`'s mode.
    pub fn invert_compose(&self, other: &TexGenAttrib) -> Arc<TexGenAttrib> {
        let mut stages = other.stages.clone();
        for stage in self.stages.keys() {
            stages.entry(stage.clone()).or_insert(TexGenMode::Off);
        }
        Self::from_stages(stages)
    }

    /// Hand this state to the backend.
    pub fn issue(&self, gsg: &mut dyn GraphicsStateGuardian) {
        gsg.issue_tex_gen(self);
    }
}

impl RenderAttrib for TexGenAttrib {
    fn compose(&self, other: &Self) -> Arc<Self> {
        TexGenAttrib::compose(self, other)
    }

    fn invert_compose(&self, other: &Self) -> Arc<Self> {
        TexGenAttrib::invert_compose(self, other)
    }

    fn make_default() -> Arc<Self> {
        TexGenAttrib::make()
    }

    fn issue(&self, gsg: &mut dyn GraphicsStateGuardian) {
        TexGenAttrib::issue(self, gsg)
    }
}

impl PartialEq for TexGenAttrib {
    fn eq(&self, other: &Self) -> bool {
        self.stages == other.stages
    }
}

impl Eq for TexGenAttrib {}

impl Hash for TexGenAttrib {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stages.hash(state);
    }
}

impl PartialOrd for TexGenAttrib {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TexGenAttrib {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stages.cmp(&other.stages)
    }
}

impl fmt::Display for TexGenAttrib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("texgen:")?;
        for (stage, mode) in &self.stages {
            write!(f, " {}({})", stage.name(), mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str) -> Arc<TextureStage> {
        TextureStage::new(name).into_shared()
    }

    #[test]
    fn make_is_empty_and_shared() {
        let a = TexGenAttrib::make();
        assert!(a.is_empty());
        assert!(Arc::ptr_eq(&a, &TexGenAttrib::make()));
        assert_eq!(a.num_point_sprites(), 0);
    }

    #[test]
    fn add_then_query() {
        let s = stage("env");
        let a = TexGenAttrib::make().add_stage(&s, TexGenMode::EyeCubeMap);
        assert!(!a.is_empty());
        assert!(a.has_stage(&s));
        assert_eq!(a.get_mode(&s), TexGenMode::EyeCubeMap);
        assert!(a.get_no_texcoords().contains(&s));
    }

    #[test]
    fn add_overwrites_mode() {
        let s = stage("env");
        let a = TexGenAttrib::make_stage(&s, TexGenMode::PointSprite)
            .add_stage(&s, TexGenMode::WorldNormal);
        assert_eq!(a.num_stages(), 1);
        assert_eq!(a.get_mode(&s), TexGenMode::WorldNormal);
        assert_eq!(a.num_point_sprites(), 0);
    }

    #[test]
    fn absent_stage_reads_off() {
        let a = TexGenAttrib::make_stage(&stage("a"), TexGenMode::EyeNormal);
        let never = stage("never");
        assert!(!a.has_stage(&never));
        assert_eq!(a.get_mode(&never), TexGenMode::Off);
    }

    #[test]
    fn off_stage_is_listed_but_needs_texcoords() {
        let s = stage("plain");
        let a = TexGenAttrib::make_stage(&s, TexGenMode::Off);
        assert!(a.has_stage(&s));
        assert!(!a.is_empty());
        assert!(a.get_no_texcoords().is_empty());
    }

    #[test]
    fn remove_stage_and_absent_noop() {
        let s = stage("s");
        let t = stage("t");
        let a = TexGenAttrib::make_stage(&s, TexGenMode::EyePosition);
        let removed = a.remove_stage(&s);
        assert!(!removed.has_stage(&s));
        assert!(removed.is_empty());
        assert!(Arc::ptr_eq(&removed, &TexGenAttrib::make()));

        let same = a.remove_stage(&t);
        assert_eq!(*same, *a);
        assert!(Arc::ptr_eq(&same, &a));
    }

    #[test]
    fn point_sprite_count_tracks_stages() {
        let stages: Vec<_> = (0..4).map(|i| stage(&format!("p{i}"))).collect();
        let mut a = TexGenAttrib::make();
        for s in &stages {
            a = a.add_stage(s, TexGenMode::PointSprite);
        }
        assert_eq!(a.num_point_sprites(), 4);
        let a = a.remove_stage(&stages[2]);
        assert_eq!(a.num_point_sprites(), 3);
        assert_eq!(a.get_no_texcoords().len(), 3);
    }

    #[test]
    fn sphere_map_and_sprite_scenario() {
        let stage_a = stage("A");
        let stage_b = stage("B");
        let a = TexGenAttrib::make()
            .add_stage(&stage_a, TexGenMode::EyeSphereMap)
            .add_stage(&stage_b, TexGenMode::PointSprite);
        assert!(!a.is_empty());
        assert_eq!(a.num_point_sprites(), 1);
        assert_eq!(a.get_mode(&stage_a), TexGenMode::EyeSphereMap);
    }

    #[test]
    fn compose_prefers_later() {
        let shared = stage("shared");
        let only_a = stage("only_a");
        let only_b = stage("only_b");
        let a = TexGenAttrib::make()
            .add_stage(&shared, TexGenMode::WorldPosition)
            .add_stage(&only_a, TexGenMode::EyeNormal);
        let b = TexGenAttrib::make()
            .add_stage(&shared, TexGenMode::EyeSphereMap)
            .add_stage(&only_b, TexGenMode::PointSprite);

        let c = a.compose(&b);
        assert_eq!(c.get_mode(&shared), TexGenMode::EyeSphereMap);
        assert_eq!(c.get_mode(&only_a), TexGenMode::EyeNormal);
        assert_eq!(c.get_mode(&only_b), TexGenMode::PointSprite);
        assert_eq!(c.num_point_sprites(), 1);
    }

    #[test]
    fn invert_compose_restores_previous_state() {
        let shared = stage("shared");
        let only_a = stage("only_a");
        let only_b = stage("only_b");
        let a = TexGenAttrib::make()
            .add_stage(&shared, TexGenMode::WorldPosition)
            .add_stage(&only_a, TexGenMode::EyeNormal);
        let b = TexGenAttrib::make()
            .add_stage(&shared, TexGenMode::EyeSphereMap)
            .add_stage(&only_b, TexGenMode::PointSprite);

        let composed = a.compose(&b);
        let undo = composed.invert_compose(&a);
        let restored = composed.compose(&undo);
        for s in [&shared, &only_a, &only_b] {
            assert_eq!(restored.get_mode(s), a.get_mode(s), "stage {}", s.name());
        }
        assert_eq!(restored.num_point_sprites(), 0);
    }

    #[test]
    fn invert_compose_reaches_target() {
        let s = stage("s");
        let t = stage("t");
        let a = TexGenAttrib::make_stage(&s, TexGenMode::EyeCubeMap);
        let b = TexGenAttrib::make_stage(&t, TexGenMode::WorldCubeMap);
        let x = a.invert_compose(&b);
        assert_eq!(x.get_mode(&s), TexGenMode::Off);
        assert!(x.has_stage(&s));
        let reached = a.compose(&x);
        assert_eq!(reached.get_mode(&t), TexGenMode::WorldCubeMap);
        assert_eq!(reached.get_mode(&s), TexGenMode::Off);
    }

    #[test]
    fn ordering_is_stagewise() {
        let first = TextureStage::new("first").with_sort(0).into_shared();
        let second = TextureStage::new("second").with_sort(1).into_shared();
        let a = TexGenAttrib::make_stage(&first, TexGenMode::EyeNormal);
        let b = TexGenAttrib::make_stage(&second, TexGenMode::EyeNormal);
        let a2 = TexGenAttrib::make_stage(&first, TexGenMode::EyePosition);
        assert!(TexGenAttrib::make() < a);
        assert!(a < b);
        assert!(a < a2);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn geom_rendering_adds_point_sprite_only_for_points() {
        let a = TexGenAttrib::make_stage(&stage("p"), TexGenMode::PointSprite);
        let points = a.get_geom_rendering(GeomRendering::POINT);
        assert!(points.contains(GeomRendering::POINT_SPRITE));
        let tris = a.get_geom_rendering(GeomRendering::TRIANGLES);
        assert_eq!(tris, GeomRendering::TRIANGLES);
        let plain = TexGenAttrib::make().get_geom_rendering(GeomRendering::POINT);
        assert_eq!(plain, GeomRendering::POINT);
    }

    #[test]
    fn mode_names_and_tags() {
        for mode in TexGenMode::ALL {
            assert_eq!(mode.as_str().parse::<TexGenMode>().unwrap(), mode);
            assert_eq!(TexGenMode::try_from(mode.tag()).unwrap(), mode);
        }
        assert_eq!("Eye-Sphere-Map".parse::<TexGenMode>().unwrap(), TexGenMode::EyeSphereMap);
        assert!(TexGenMode::try_from(10).is_err());
        assert!("sphere".parse::<TexGenMode>().is_err());
    }

    #[test]
    fn display_lists_stages() {
        let s = TextureStage::new("env").into_shared();
        let a = TexGenAttrib::make_stage(&s, TexGenMode::EyeSphereMap);
        assert_eq!(a.to_string(), "texgen: env(eye_sphere_map)");
        assert_eq!(TexGenAttrib::make().to_string(), "texgen:");
    }
}
