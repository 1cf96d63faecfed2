//! Binary archive for render state.
//!
//! Layout (little endian): 6-byte magic, `u16` major, `u16` minor, then
//! records of `u16` object id, `u8` type tag, `u32` payload length, payload.
//! Attribute records refer to texture stages by object id, and the writer
//! emits stages after the attributes that use them, so reading happens in
//! two phases: [`BamReader::read_raw`] collects raw records and objects,
//! [`RawArchive::complete`] resolves the stage references.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::texgen::{TexGenAttrib, TexGenMode};
use crate::texture_stage::TextureStage;

pub const BAM_MAGIC: &[u8; 6] = b"pbj\0\n\r";
pub const BAM_MAJOR_VER: u16 = 1;
pub const BAM_MINOR_VER: u16 = 0;

const TYPE_TEXTURE_STAGE: u8 = 1;
const TYPE_TEX_GEN_ATTRIB: u8 = 2;

/// Index of an object within one archive. Zero is never assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u16);

#[derive(Debug, Error)]
pub enum BamError {
    #[error("not a bam stream (bad magic)")]
    BadMagic,
    #[error("unsupported bam version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unknown object type tag {tag} for object {id:?}")]
    UnknownObjectType { id: ObjectId, tag: u8 },
    #[error("invalid texgen mode tag {0}")]
    InvalidMode(u8),
    #[error("object {0:?} referenced but never defined")]
    UnresolvedPointer(ObjectId),
    #[error("object {0:?} defined twice")]
    DuplicateObject(ObjectId),
    #[error("too many objects for one archive")]
    TooManyObjects,
    #[error("object {0:?} is not a valid object id")]
    InvalidObjectId(ObjectId),
    #[error("payload of {0} bytes does not fit a record")]
    TooLarge(usize),
    #[error("string is not valid UTF-8")]
    InvalidString,
    #[error("bam stream truncated")]
    Truncated,
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for BamError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            BamError::Truncated
        } else {
            BamError::Io(err)
        }
    }
}

pub type BamResult<T> = Result<T, BamError>;

/// Writes texgen attributes and the stages they reference.
pub struct BamWriter<W: Write> {
    out: W,
    next_id: u16,
    stage_ids: HashMap<Arc<TextureStage>, ObjectId>,
    pending_stages: Vec<(ObjectId, Arc<TextureStage>)>,
}

impl<W: Write> BamWriter<W> {
    /// Start an archive; writes the header immediately.
    pub fn new(mut out: W) -> BamResult<Self> {
        out.write_all(BAM_MAGIC)?;
        out.write_u16::<LittleEndian>(BAM_MAJOR_VER)?;
        out.write_u16::<LittleEndian>(BAM_MINOR_VER)?;
        Ok(Self {
            out,
            next_id: 1,
            stage_ids: HashMap::new(),
            pending_stages: Vec::new(),
        })
    }

    /// Write one attribute record. Stages it references are queued and
    /// written later.
    pub fn write_tex_gen(&mut self, attrib: &TexGenAttrib) -> BamResult<ObjectId> {
        let id = self.alloc_id()?;
        let count = u16::try_from(attrib.num_stages()).map_err(|_| BamError::TooManyObjects)?;

        let mut payload = Vec::with_capacity(2 + attrib.num_stages() * 3);
        payload.write_u16::<LittleEndian>(count)?;
        for (stage, mode) in attrib.stages() {
            let stage_id = self.stage_id(stage)?;
            payload.write_u16::<LittleEndian>(stage_id.0)?;
            payload.write_u8(mode.tag())?;
        }

        self.write_record(id, TYPE_TEX_GEN_ATTRIB, &payload)?;
        Ok(id)
    }

    /// Write every stage queued so far.
    pub fn flush_pending(&mut self) -> BamResult<()> {
        for (id, stage) in std::mem::take(&mut self.pending_stages) {
            let mut payload = Vec::new();
            payload.write_u8(u8::from(stage.is_default()))?;
            write_string(&mut payload, stage.name())?;
            payload.write_i32::<LittleEndian>(stage.sort())?;
            payload.write_i32::<LittleEndian>(stage.priority())?;
            write_string(&mut payload, stage.texcoord_name())?;
            self.write_record(id, TYPE_TEXTURE_STAGE, &payload)?;
        }
        Ok(())
    }

    /// Flush queued stages and hand back the sink.
    pub fn finish(mut self) -> BamResult<W> {
        self.flush_pending()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn alloc_id(&mut self) -> BamResult<ObjectId> {
        let id = ObjectId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(BamError::TooManyObjects)?;
        Ok(id)
    }

    fn stage_id(&mut self, stage: &Arc<TextureStage>) -> BamResult<ObjectId> {
        if let Some(id) = self.stage_ids.get(stage) {
            return Ok(*id);
        }
        let id = self.alloc_id()?;
        self.stage_ids.insert(stage.clone(), id);
        self.pending_stages.push((id, stage.clone()));
        Ok(id)
    }

    fn write_record(&mut self, id: ObjectId, tag: u8, payload: &[u8]) -> BamResult<()> {
        let len = u32::try_from(payload.len()).map_err(|_| BamError::TooLarge(payload.len()))?;
        self.out.write_u16::<LittleEndian>(id.0)?;
        self.out.write_u8(tag)?;
        self.out.write_u32::<LittleEndian>(len)?;
        self.out.write_all(payload)?;
        Ok(())
    }
}

/// A texgen attribute as read from disk, before stage references resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TexGenRecord {
    pub id: ObjectId,
    pub read_modes: Vec<(ObjectId, TexGenMode)>,
}

impl TexGenRecord {
    /// Second phase: swap every stage id for the stage it names.
    pub fn complete_pointers(&self, table: &ObjectTable) -> BamResult<Arc<TexGenAttrib>> {
        let mut attrib = TexGenAttrib::make();
        for (stage_id, mode) in &self.read_modes {
            let stage = table.get(*stage_id).ok_or(BamError::UnresolvedPointer(*stage_id))?;
            attrib = attrib.add_stage(stage, *mode);
        }
        Ok(attrib)
    }
}

/// Objects that are fully readable without other objects.
#[derive(Debug, Default)]
pub struct ObjectTable {
    stages: HashMap<ObjectId, Arc<TextureStage>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObjectId, stage: Arc<TextureStage>) -> BamResult<()> {
        if self.stages.insert(id, stage).is_some() {
            return Err(BamError::DuplicateObject(id));
        }
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Option<&Arc<TextureStage>> {
        self.stages.get(&id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Output of the first read phase.
#[derive(Debug, Default)]
pub struct RawArchive {
    pub records: Vec<TexGenRecord>,
    pub objects: ObjectTable,
}

impl RawArchive {
    /// Resolve every record against the object table, in file order.
    pub fn complete(&self) -> BamResult<Vec<Arc<TexGenAttrib>>> {
        self.records
            .iter()
            .map(|record| record.complete_pointers(&self.objects))
            .collect()
    }
}

pub struct BamReader<R: Read> {
    input: R,
}

impl<R: Read> BamReader<R> {
    /// Open a stream and validate its header.
    pub fn new(mut input: R) -> BamResult<Self> {
        let mut magic = [0u8; 6];
        input.read_exact(&mut magic)?;
        if &magic != BAM_MAGIC {
            return Err(BamError::BadMagic);
        }
        let major = input.read_u16::<LittleEndian>()?;
        let minor = input.read_u16::<LittleEndian>()?;
        if major != BAM_MAJOR_VER || minor > BAM_MINOR_VER {
            return Err(BamError::UnsupportedVersion { major, minor });
        }
        Ok(Self { input })
    }

    /// First phase: read raw records without resolving references.
    pub fn read_raw(&mut self) -> BamResult<RawArchive> {
        let mut bytes = Vec::new();
        self.input.read_to_end(&mut bytes)?;
        let total = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes.as_slice());
        let mut archive = RawArchive::default();
        // ids of both record kinds share one namespace
        let mut seen = HashSet::new();

        while cursor.position() < total {
            let id = ObjectId(cursor.read_u16::<LittleEndian>()?);
            if id.0 == 0 {
                return Err(BamError::InvalidObjectId(id));
            }
            if !seen.insert(id) {
                return Err(BamError::DuplicateObject(id));
            }
            let tag = cursor.read_u8()?;
            let len = cursor.read_u32::<LittleEndian>()? as usize;
            if len as u64 > total - cursor.position() {
                return Err(BamError::Truncated);
            }
            let mut payload = vec![0u8; len];
            cursor.read_exact(&mut payload)?;
            let mut payload = Cursor::new(payload.as_slice());

            match tag {
                TYPE_TEXTURE_STAGE => {
                    let stage = read_stage(&mut payload)?;
                    log::debug!("bam: stage {:?} '{}'", id, stage.name());
                    archive.objects.insert(id, stage)?;
                }
                TYPE_TEX_GEN_ATTRIB => {
                    let count = payload.read_u16::<LittleEndian>()?;
                    let mut read_modes = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let stage_id = ObjectId(payload.read_u16::<LittleEndian>()?);
                        let raw = payload.read_u8()?;
                        let mode = TexGenMode::try_from(raw).map_err(|_| BamError::InvalidMode(raw))?;
                        read_modes.push((stage_id, mode));
                    }
                    log::debug!("bam: texgen {:?} with {} stages", id, count);
                    archive.records.push(TexGenRecord { id, read_modes });
                }
                other => return Err(BamError::UnknownObjectType { id, tag: other }),
            }
        }
        Ok(archive)
    }

    /// Both phases in one call.
    pub fn read_all(&mut self) -> BamResult<Vec<Arc<TexGenAttrib>>> {
        self.read_raw()?.complete()
    }
}

/// Serialize a list of attributes into a standalone archive.
pub fn write_tex_gen_attribs(attribs: &[Arc<TexGenAttrib>]) -> BamResult<Vec<u8>> {
    let mut writer = BamWriter::new(Vec::new())?;
    for attrib in attribs {
        writer.write_tex_gen(attrib)?;
    }
    writer.finish()
}

pub fn read_tex_gen_attribs(bytes: &[u8]) -> BamResult<Vec<Arc<TexGenAttrib>>> {
    BamReader::new(bytes)?.read_all()
}

fn read_stage(payload: &mut Cursor<&[u8]>) -> BamResult<Arc<TextureStage>> {
    let is_default = payload.read_u8()? != 0;
    let name = read_string(payload)?;
    let sort = payload.read_i32::<LittleEndian>()?;
    let priority = payload.read_i32::<LittleEndian>()?;
    let texcoord_name = read_string(payload)?;
    if is_default {
        return Ok(TextureStage::default_stage());
    }
    Ok(TextureStage::new(name)
        .with_sort(sort)
        .with_priority(priority)
        .with_texcoord_name(texcoord_name)
        .into_shared())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> BamResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| BamError::TooLarge(s.len()))?;
    out.write_u32::<LittleEndian>(len)?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string(payload: &mut Cursor<&[u8]>) -> BamResult<String> {
    let len = payload.read_u32::<LittleEndian>()? as usize;
    let remaining = payload.get_ref().len() as u64 - payload.position();
    if len as u64 > remaining {
        return Err(BamError::Truncated);
    }
    let mut buf = vec![0u8; len];
    payload.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| BamError::InvalidString)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_by_name(attrib: &TexGenAttrib, name: &str) -> Option<TexGenMode> {
        attrib
            .stages()
            .find(|(stage, _)| stage.name() == name)
            .map(|(_, mode)| mode)
    }

    #[test]
    fn header_layout() {
        let bytes = BamWriter::new(Vec::new()).unwrap().finish().unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..6], BAM_MAGIC);
        assert_eq!(bytes[6], 1);
        assert_eq!(bytes[8], 0);
    }

    #[test]
    fn stages_follow_the_attribs_that_use_them() {
        let env = TextureStage::new("env").with_sort(2).into_shared();
        let sprite = TextureStage::new("sprite").with_priority(5).into_shared();
        let attrib = TexGenAttrib::make()
            .add_stage(&env, TexGenMode::EyeSphereMap)
            .add_stage(&sprite, TexGenMode::PointSprite);

        let bytes = write_tex_gen_attribs(&[attrib.clone()]).unwrap();
        let raw = BamReader::new(bytes.as_slice()).unwrap().read_raw().unwrap();
        assert_eq!(raw.records.len(), 1);
        assert_eq!(raw.objects.len(), 2);
        // attribute got the first id; its stages come later in the stream
        assert_eq!(raw.records[0].id, ObjectId(1));
        assert!(raw.records[0].read_modes.iter().all(|(id, _)| id.0 > 1));

        let restored = raw.complete().unwrap();
        let restored = &restored[0];
        assert_eq!(restored.num_stages(), 2);
        assert_eq!(restored.num_point_sprites(), 1);
        assert_eq!(mode_by_name(restored, "env"), Some(TexGenMode::EyeSphereMap));
        assert_eq!(mode_by_name(restored, "sprite"), Some(TexGenMode::PointSprite));
        let (env_read, _) = restored.stages().find(|(s, _)| s.name() == "env").unwrap();
        assert_eq!(env_read.sort(), 2);
    }

    #[test]
    fn shared_stage_written_once() {
        let stage = TextureStage::new("shared").into_shared();
        let a = TexGenAttrib::make_stage(&stage, TexGenMode::WorldNormal);
        let b = TexGenAttrib::make_stage(&stage, TexGenMode::EyeNormal);
        let bytes = write_tex_gen_attribs(&[a, b]).unwrap();
        let raw = BamReader::new(bytes.as_slice()).unwrap().read_raw().unwrap();
        assert_eq!(raw.objects.len(), 1);
        let attribs = raw.complete().unwrap();
        let (sa, _) = attribs[0].stages().next().unwrap();
        let (sb, _) = attribs[1].stages().next().unwrap();
        assert!(Arc::ptr_eq(sa, sb));
    }

    #[test]
    fn default_stage_resolves_to_singleton() {
        let attrib = TexGenAttrib::make_stage(&TextureStage::default_stage(), TexGenMode::EyeCubeMap);
        let bytes = write_tex_gen_attribs(&[attrib.clone()]).unwrap();
        let restored = read_tex_gen_attribs(&bytes).unwrap();
        assert!(Arc::ptr_eq(&restored[0], &attrib));
    }

    #[test]
    fn empty_attrib_round_trips_to_shared_empty() {
        let bytes = write_tex_gen_attribs(&[TexGenAttrib::make()]).unwrap();
        let restored = read_tex_gen_attribs(&bytes).unwrap();
        assert!(Arc::ptr_eq(&restored[0], &TexGenAttrib::make()));
    }

    #[test]
    fn missing_stage_is_unresolved() {
        let stage = TextureStage::new("lost").into_shared();
        let mut writer = BamWriter::new(Vec::new()).unwrap();
        writer
            .write_tex_gen(&TexGenAttrib::make_stage(&stage, TexGenMode::EyeNormal))
            .unwrap();
        // drop the queued stage so the reference dangles
        writer.pending_stages.clear();
        let bytes = writer.finish().unwrap();
        let err = read_tex_gen_attribs(&bytes).unwrap_err();
        assert!(matches!(err, BamError::UnresolvedPointer(ObjectId(2))));
    }

    fn append_record(bytes: &mut Vec<u8>, id: u16, tag: u8, payload: &[u8]) {
        bytes.write_u16::<LittleEndian>(id).unwrap();
        bytes.write_u8(tag).unwrap();
        bytes.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        bytes.extend_from_slice(payload);
    }

    #[test]
    fn reused_object_ids_are_rejected() {
        let stage = TextureStage::new("s").into_shared();
        let good = write_tex_gen_attribs(&[TexGenAttrib::make_stage(&stage, TexGenMode::EyeNormal)])
            .unwrap();
        let empty_attrib = [0u8, 0];

        // id 1 already names the first attribute
        let mut twice = good.clone();
        append_record(&mut twice, 1, TYPE_TEX_GEN_ATTRIB, &empty_attrib);
        assert!(matches!(
            read_tex_gen_attribs(&twice),
            Err(BamError::DuplicateObject(ObjectId(1)))
        ));

        // id 2 already names the stage
        let mut clash = good.clone();
        append_record(&mut clash, 2, TYPE_TEX_GEN_ATTRIB, &empty_attrib);
        assert!(matches!(
            read_tex_gen_attribs(&clash),
            Err(BamError::DuplicateObject(ObjectId(2)))
        ));

        let mut zero = good;
        append_record(&mut zero, 0, TYPE_TEX_GEN_ATTRIB, &empty_attrib);
        assert!(matches!(
            read_tex_gen_attribs(&zero),
            Err(BamError::InvalidObjectId(ObjectId(0)))
        ));
    }

    #[test]
    fn oversized_payload_is_not_an_object_count_error() {
        let err = BamError::TooLarge(5_000_000_000);
        assert_eq!(err.to_string(), "payload of 5000000000 bytes does not fit a record");
        assert_ne!(err.to_string(), BamError::TooManyObjects.to_string());
    }

    #[test]
    fn modified_default_stage_keeps_its_fields() {
        let moved = TextureStage::default_stage().as_ref().clone().with_sort(3).into_shared();
        let attrib = TexGenAttrib::make_stage(&moved, TexGenMode::WorldPosition);
        let restored = read_tex_gen_attribs(&write_tex_gen_attribs(&[attrib]).unwrap()).unwrap();
        let (stage, _) = restored[0].stages().next().unwrap();
        assert_eq!(stage.sort(), 3);
        assert!(!Arc::ptr_eq(stage, &TextureStage::default_stage()));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            read_tex_gen_attribs(b"nope\0\0\0\0\0\0"),
            Err(BamError::BadMagic)
        ));

        let mut bytes = BAM_MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0, 0, 0]);
        assert!(matches!(
            read_tex_gen_attribs(&bytes),
            Err(BamError::UnsupportedVersion { major: 2, minor: 0 })
        ));

        let stage = TextureStage::new("s").into_shared();
        let good = write_tex_gen_attribs(&[TexGenAttrib::make_stage(&stage, TexGenMode::EyeNormal)])
            .unwrap();
        assert!(matches!(
            read_tex_gen_attribs(&good[..good.len() - 3]),
            Err(BamError::Truncated)
        ));

        let mut bad_mode = good.clone();
        // header(10) + record head(7) + count(2) + stage id(2) -> mode byte
        bad_mode[21] = 42;
        assert!(matches!(read_tex_gen_attribs(&bad_mode), Err(BamError::InvalidMode(42))));

        let mut bad_type = good;
        bad_type[12] = 9;
        assert!(matches!(
            read_tex_gen_attribs(&bad_type),
            Err(BamError::UnknownObjectType { tag: 9, .. })
        ));
    }
}
