use std::fmt;
use std::io::{self, Read};
use std::mem::size_of;
use std::ops::Deref;
use std::str;

use bitflags::bitflags;
use byteorder::LE;
use glam::{EulerRot, Mat4, Quat, Vec3};
use maligned::A4;
use tracing::warn;
use zerocopy::{
    byteorder::{I16, U16},
    FromBytes, Unaligned,
};

use crate::binary_utils::{
    align_bytes, null_terminated_prefix, parse, parse_mut, parse_slice, parse_slice_mut,
    read_aligned,
};
use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"IDST";

/// The only supported format version. Used by every GoldSrc game.
pub const VERSION: i32 = 10;

/// Number of animated channels per bone: translation x/y/z, rotation x/y/z.
pub const CHANNEL_COUNT: usize = 6;

const PALETTE_LEN: usize = 256 * 3;

#[derive(Debug, Clone, Copy, PartialEq, FromBytes)]
#[repr(C)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (Vec3::from(self.min) + Vec3::from(self.max)) / 2.0
    }

    #[must_use]
    pub fn extents(&self) -> Vec3 {
        (Vec3::from(self.max) - Vec3::from(self.min)) / 2.0
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
struct Header {
    magic: [u8; 4],
    version: i32,
    name: [u8; 64],
    file_size: i32,

    eye_position: [f32; 3],
    hull: BoundingBox,
    view: BoundingBox,

    flags: i32,

    bone_count: i32,
    bone_offset: i32,

    bone_controller_count: i32,
    bone_controller_offset: i32,

    hitbox_count: i32,
    hitbox_offset: i32,

    sequence_count: i32,
    sequence_offset: i32,

    sequence_group_count: i32,
    sequence_group_offset: i32,

    texture_count: i32,
    texture_offset: i32,
    texture_data_offset: i32,

    skin_reference_count: i32,
    skin_family_count: i32,
    skin_offset: i32,

    body_part_count: i32,
    body_part_offset: i32,

    attachment_count: i32,
    attachment_offset: i32,

    sound_table: i32,
    sound_offset: i32,
    sound_group_count: i32,
    sound_group_offset: i32,

    transition_count: i32,
    transition_offset: i32,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Bone {
    name: [u8; 32],
    pub parent_index: i32,
    pub flags: i32,
    pub bone_controller_indices: [i32; 6],
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub position_scale: [f32; 3],
    pub rotation_scale: [f32; 3],
}

impl Bone {
    pub fn name(&self) -> Result<&str> {
        name_str(&self.name, "bone name is not valid utf8")
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct BoneController {
    pub bone_index: i32,
    pub kind: i32,
    pub start_angle: f32,
    pub end_angle: f32,
    pub rest_index: i32,
    pub index: i32,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Hitbox {
    pub bone_index: i32,
    pub group_index: i32,
    pub bounds: BoundingBox,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Sequence {
    name: [u8; 32],
    pub fps: f32,
    flags: i32,

    pub activity: i32,
    pub activity_weight: i32,

    pub event_count: i32,
    pub event_offset: i32,

    pub frame_count: i32,

    pub pivot_count: i32,
    pub pivot_offset: i32,

    pub motion_type: i32,
    pub motion_bone_index: i32,
    pub linear_movement: [f32; 3],
    pub auto_move_position_index: i32,
    pub auto_move_angle_index: i32,

    pub bounds: BoundingBox,

    pub blend_count: i32,
    pub anim_offset: i32,
    pub blend_type: [i32; 2],
    pub blend_start: [f32; 2],
    pub blend_end: [f32; 2],
    pub blend_parent: i32,

    pub group_index: i32,

    pub entry_node_index: i32,
    pub exit_node_index: i32,
    pub node_flags: i32,

    pub next_sequence_index: i32,
}

impl Sequence {
    pub fn name(&self) -> Result<&str> {
        name_str(&self.name, "sequence name is not valid utf8")
    }

    #[must_use]
    pub fn flags(&self) -> SequenceFlags {
        SequenceFlags::from_bits_truncate(self.flags)
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct SequenceEvent {
    pub frame_index: i32,
    pub event_index: i32,
    pub event_type: i32,
    options: [u8; 64],
}

impl SequenceEvent {
    pub fn options(&self) -> Result<&str> {
        name_str(&self.options, "sequence event options are not valid utf8")
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct SequencePivot {
    pub origin: [f32; 3],
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct SequenceGroup {
    label: [u8; 32],
    name: [u8; 64],
    unused_1: i32,
    unused_2: i32,
}

impl SequenceGroup {
    pub fn label(&self) -> Result<&str> {
        name_str(&self.label, "sequence group label is not valid utf8")
    }

    /// File name of the external group file, e.g. `model01.mdl`.
    pub fn name(&self) -> Result<&str> {
        name_str(&self.name, "sequence group name is not valid utf8")
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Texture {
    name: [u8; 64],
    flags: i32,
    pub width: i32,
    pub height: i32,
    pub data_offset: i32,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: i32 {
        const FLAT_SHADE = 1 << 0;
        const CHROME = 1 << 1;
        const FULL_BRIGHT = 1 << 2;
        const NO_MIPS = 1 << 3;
        const ALPHA = 1 << 4;
        const ADDITIVE = 1 << 5;
        const MASKED = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SequenceFlags: i32 {
        const LOOPING = 1 << 0;
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct BodyPart {
    name: [u8; 64],
    pub model_count: i32,
    pub base: i32,
    pub model_offset: i32,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Attachment {
    name: [u8; 32],
    pub kind: i32,
    pub bone_index: i32,
    pub origin: [f32; 3],
    pub vectors: [[f32; 3]; 3],
}

impl Attachment {
    pub fn name(&self) -> Result<&str> {
        name_str(&self.name, "attachment name is not valid utf8")
    }
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Model {
    name: [u8; 64],
    pub kind: i32,
    pub bounding_radius: f32,

    pub mesh_count: i32,
    pub mesh_offset: i32,

    pub vertex_count: i32,
    pub vertex_bone_index_offset: i32,
    pub vertex_offset: i32,

    pub normal_count: i32,
    pub normal_bone_index_offset: i32,
    pub normal_offset: i32,

    pub group_count: i32,
    pub group_offset: i32,
}

#[derive(Debug, PartialEq, FromBytes)]
#[repr(C)]
pub struct Mesh {
    pub face_count: i32,
    pub face_offset: i32,
    pub skin_index: i32,
    pub normal_count: i32,
    pub normal_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, FromBytes, Unaligned)]
#[repr(C)]
pub struct FaceVertex {
    pub vertex_index: U16<LE>,
    pub normal_index: U16<LE>,
    pub u: U16<LE>,
    pub v: U16<LE>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    TriangleFan,
    TriangleStrip,
}

/// A raw triangle fan or strip. Vertices are in stream order;
/// triangulation and uv normalization are left to the consumer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face<'a> {
    pub primitive_type: PrimitiveType,
    pub vertices: &'a [FaceVertex],
}

#[derive(Debug, PartialEq, FromBytes, Unaligned)]
#[repr(C)]
struct AnimOffsets {
    value_offsets: [U16<LE>; CHANNEL_COUNT],
}

/// One 2-byte cell of a compressed animation value stream.
///
/// A cell is either a span header (`valid`/`total`) or a signed sample
/// (`value`), depending on its position in the stream. A span header with
/// `valid == 0` doubles as the span's single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, Unaligned)]
#[repr(transparent)]
pub struct AnimValue([u8; 2]);

impl AnimValue {
    #[must_use]
    pub fn from_value(value: i16) -> Self {
        Self(value.to_le_bytes())
    }

    #[must_use]
    pub fn from_span(valid: u8, total: u8) -> Self {
        Self([valid, total])
    }

    #[must_use]
    pub fn valid(self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub fn total(self) -> u8 {
        self.0[1]
    }

    #[must_use]
    pub fn value(self) -> i16 {
        i16::from_le_bytes(self.0)
    }
}

/// Decompresses the value of a single frame from a run-length compressed
/// value stream.
///
/// Each span of the stream covers `total` frames: the first `valid` frames
/// have explicitly stored samples following the span header, and the
/// remaining frames repeat the last stored sample. The returned value is
/// `sample * scale + base`.
///
/// # Errors
///
/// Returns `Err` if the stream ends before the target frame or contains a
/// zero-length span.
pub fn extract_animation_value(
    frame_index: usize,
    values: &[AnimValue],
    scale: f32,
    base: f32,
) -> Result<f32> {
    let mut k = frame_index;
    let mut index = 0;

    loop {
        let span = *values.get(index).ok_or(Error::CorruptAnimation {
            error: "value stream ended before the target frame",
        })?;

        if span.total() == 0 {
            return Err(Error::CorruptAnimation {
                error: "zero-length span in value stream",
            });
        }

        let valid = span.valid() as usize;

        if k < span.total() as usize {
            // when valid == 0, this resolves to the span header itself
            let value_index = if k < valid { index + 1 + k } else { index + valid };

            let value = values.get(value_index).ok_or(Error::CorruptAnimation {
                error: "value stream ended inside a span",
            })?;

            return Ok(f32::from(value.value()) * scale + base);
        }

        k -= span.total() as usize;
        index += valid + 1;
    }
}

/// Converts x/y/z euler angles in radians to a quaternion, matching how
/// Blender converts an `'XYZ'`-order euler rotation.
#[must_use]
pub fn euler_to_quat(rotation: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, rotation.z, rotation.y, rotation.x)
}

#[must_use]
pub fn euler_to_mat4(rotation: Vec3) -> Mat4 {
    Mat4::from_quat(euler_to_quat(rotation))
}

/// Builds a bone-local transform from a translation and an euler rotation:
/// rotation first, then translation.
#[must_use]
pub fn local_transform(position: Vec3, rotation: Vec3) -> Mat4 {
    Mat4::from_translation(position) * euler_to_mat4(rotation)
}

fn name_str<'a>(bytes: &'a [u8], error: &'static str) -> Result<&'a str> {
    let prefix = null_terminated_prefix(bytes).ok_or(Error::Corrupted { error })?;
    str::from_utf8(prefix).map_err(|_| Error::Corrupted { error })
}

fn parse_records<'a, T: FromBytes>(
    bytes: &'a [u8],
    offset: usize,
    count: usize,
    error: &'static str,
) -> Result<&'a [T]> {
    let len = count.checked_mul(size_of::<T>()).ok_or(Error::Corrupted { error })?;
    let end = offset.checked_add(len).ok_or(Error::Corrupted { error })?;

    if end > bytes.len() {
        return Err(Error::Truncated { error });
    }

    // in bounds, so a failure here can only mean misalignment
    parse_slice(bytes, offset, count).ok_or(Error::Corrupted { error })
}

fn parse_table<'a, T: FromBytes>(
    bytes: &'a [u8],
    offset: i32,
    count: i32,
    descriptor_error: &'static str,
    error: &'static str,
) -> Result<&'a [T]> {
    let offset = usize::try_from(offset).map_err(|_| Error::Corrupted {
        error: descriptor_error,
    })?;
    let count = usize::try_from(count).map_err(|_| Error::Corrupted {
        error: descriptor_error,
    })?;

    parse_records(bytes, offset, count, error)
}

#[derive(Clone)]
pub struct Mdl {
    bytes: Vec<u8>,
}

impl Mdl {
    /// Reads an mdl file into memory. No validation or decoding happens yet.
    ///
    /// # Errors
    ///
    /// Returns `Err` if reading from `reader` fails.
    pub fn read(reader: impl Read) -> io::Result<Self> {
        let bytes = read_aligned::<A4, _>(reader)?;
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: align_bytes::<A4>(bytes),
        }
    }

    /// # Errors
    ///
    /// Returns `Err` if the file doesn't begin with the `IDST` magic.
    pub fn check_signature(&self) -> Result<()> {
        let signature = self.bytes.get(0..4).ok_or(Error::Truncated {
            error: "eof reading signature",
        })?;

        if signature == MAGIC {
            Ok(())
        } else {
            Err(Error::InvalidSignature {
                signature: String::from_utf8_lossy(signature).into_owned(),
            })
        }
    }

    /// # Errors
    ///
    /// Returns `Err` if the file is too short to contain a version.
    pub fn version(&self) -> Result<i32> {
        if self.bytes.len() < 8 {
            return Err(Error::Truncated {
                error: "eof reading version",
            });
        }
        Ok(i32::from_le_bytes(self.bytes[4..8].try_into().unwrap()))
    }

    /// # Errors
    ///
    /// Returns `Err` if the version is not [`VERSION`].
    pub fn check_version(&self) -> Result<i32> {
        let version = self.version()?;

        if version == VERSION {
            Ok(version)
        } else {
            Err(Error::UnsupportedVersion { version })
        }
    }

    /// # Errors
    ///
    /// Returns `Err` if the file is too short to contain a header.
    pub fn header(&self) -> Result<HeaderRef> {
        let header = parse(&self.bytes, 0).ok_or(Error::Truncated {
            error: "eof reading header",
        })?;

        Ok(HeaderRef {
            header,
            bytes: &self.bytes,
        })
    }
}

impl fmt::Debug for Mdl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mdl").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderRef<'a> {
    header: &'a Header,
    bytes: &'a [u8],
}

impl<'a> HeaderRef<'a> {
    pub fn name(&self) -> Result<&'a str> {
        name_str(&self.header.name, "header name is not valid utf8")
    }

    #[must_use]
    pub fn flags(&self) -> i32 {
        self.header.flags
    }

    #[must_use]
    pub fn eye_position(&self) -> Vec3 {
        Vec3::from(self.header.eye_position)
    }

    #[must_use]
    pub fn hull(&self) -> &'a BoundingBox {
        &self.header.hull
    }

    #[must_use]
    pub fn view(&self) -> &'a BoundingBox {
        &self.header.view
    }

    pub fn bone_count(&self) -> Result<usize> {
        self.header.bone_count.try_into().map_err(|_| Error::Corrupted {
            error: "bone count is negative",
        })
    }

    pub fn iter_bones(&self) -> Result<impl Iterator<Item = &'a Bone> + ExactSizeIterator> {
        let bones: &[Bone] = parse_table(
            self.bytes,
            self.header.bone_offset,
            self.header.bone_count,
            "bone table descriptor is invalid",
            "bone table out of bounds",
        )?;

        Ok(bones.iter())
    }

    pub fn iter_bone_controllers(
        &self,
    ) -> Result<impl Iterator<Item = &'a BoneController> + ExactSizeIterator> {
        let controllers: &[BoneController] = parse_table(
            self.bytes,
            self.header.bone_controller_offset,
            self.header.bone_controller_count,
            "bone controller table descriptor is invalid",
            "bone controller table out of bounds",
        )?;

        Ok(controllers.iter())
    }

    pub fn iter_hitboxes(&self) -> Result<impl Iterator<Item = &'a Hitbox> + ExactSizeIterator> {
        let hitboxes: &[Hitbox] = parse_table(
            self.bytes,
            self.header.hitbox_offset,
            self.header.hitbox_count,
            "hitbox table descriptor is invalid",
            "hitbox table out of bounds",
        )?;

        Ok(hitboxes.iter())
    }

    pub fn iter_sequences(
        &self,
    ) -> Result<impl Iterator<Item = SequenceRef<'a>> + ExactSizeIterator> {
        let bone_count = self.bone_count()?;

        let sequences: &[Sequence] = parse_table(
            self.bytes,
            self.header.sequence_offset,
            self.header.sequence_count,
            "sequence table descriptor is invalid",
            "sequence table out of bounds",
        )?;

        let bytes = self.bytes;

        Ok(sequences.iter().map(move |sequence| SequenceRef {
            sequence,
            bone_count,
            bytes,
        }))
    }

    pub fn iter_sequence_groups(
        &self,
    ) -> Result<impl Iterator<Item = &'a SequenceGroup> + ExactSizeIterator> {
        let groups: &[SequenceGroup] = parse_table(
            self.bytes,
            self.header.sequence_group_offset,
            self.header.sequence_group_count,
            "sequence group table descriptor is invalid",
            "sequence group table out of bounds",
        )?;

        Ok(groups.iter())
    }

    pub fn iter_textures(&self) -> Result<impl Iterator<Item = TextureRef<'a>> + ExactSizeIterator> {
        let textures: &[Texture] = parse_table(
            self.bytes,
            self.header.texture_offset,
            self.header.texture_count,
            "texture table descriptor is invalid",
            "texture table out of bounds",
        )?;

        let bytes = self.bytes;

        Ok(textures.iter().map(move |texture| TextureRef { texture, bytes }))
    }

    /// Returns the skin families: each family maps mesh skin slots to
    /// texture indices.
    pub fn skin_families(&self) -> Result<Vec<&'a [U16<LE>]>> {
        let references: usize =
            self.header
                .skin_reference_count
                .try_into()
                .map_err(|_| Error::Corrupted {
                    error: "skin reference count is negative",
                })?;
        let families: usize =
            self.header
                .skin_family_count
                .try_into()
                .map_err(|_| Error::Corrupted {
                    error: "skin family count is negative",
                })?;
        let offset: usize = self.header.skin_offset.try_into().map_err(|_| Error::Corrupted {
            error: "skin table offset is negative",
        })?;

        let total = references.checked_mul(families).ok_or(Error::Corrupted {
            error: "skin table size overflows",
        })?;

        let values: &[U16<LE>] = parse_records(self.bytes, offset, total, "skin table out of bounds")?;

        if references == 0 {
            return Ok(vec![values; families]);
        }

        Ok(values.chunks_exact(references).collect())
    }

    pub fn iter_body_parts(
        &self,
    ) -> Result<impl Iterator<Item = BodyPartRef<'a>> + ExactSizeIterator> {
        let body_parts: &[BodyPart] = parse_table(
            self.bytes,
            self.header.body_part_offset,
            self.header.body_part_count,
            "body part table descriptor is invalid",
            "body part table out of bounds",
        )?;

        let bytes = self.bytes;

        Ok(body_parts
            .iter()
            .map(move |body_part| BodyPartRef { body_part, bytes }))
    }

    pub fn iter_attachments(
        &self,
    ) -> Result<impl Iterator<Item = &'a Attachment> + ExactSizeIterator> {
        let attachments: &[Attachment] = parse_table(
            self.bytes,
            self.header.attachment_offset,
            self.header.attachment_count,
            "attachment table descriptor is invalid",
            "attachment table out of bounds",
        )?;

        Ok(attachments.iter())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceRef<'a> {
    sequence: &'a Sequence,
    bone_count: usize,
    bytes: &'a [u8],
}

impl<'a> SequenceRef<'a> {
    pub fn name(&self) -> Result<&'a str> {
        name_str(&self.sequence.name, "sequence name is not valid utf8")
    }

    pub fn events(&self) -> Result<&'a [SequenceEvent]> {
        parse_table(
            self.bytes,
            self.sequence.event_offset,
            self.sequence.event_count,
            "sequence event descriptor is invalid",
            "sequence events out of bounds",
        )
    }

    pub fn pivots(&self) -> Result<&'a [SequencePivot]> {
        parse_table(
            self.bytes,
            self.sequence.pivot_offset,
            self.sequence.pivot_count,
            "sequence pivot descriptor is invalid",
            "sequence pivots out of bounds",
        )
    }

    /// Returns the per-(blend, bone) animation records of the sequence, or
    /// `None` if the animation data lives in an external sequence group
    /// file, which is unsupported.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the animation records are out of bounds or the
    /// sequence record is invalid.
    pub fn animations(&self) -> Result<Option<AnimationsRef<'a>>> {
        if self.sequence.group_index != 0 {
            warn!(
                "sequence animation data is in external sequence group {}, not loading",
                self.sequence.group_index
            );
            return Ok(None);
        }

        let blend_count: usize =
            self.sequence
                .blend_count
                .try_into()
                .map_err(|_| Error::Corrupted {
                    error: "sequence blend count is negative",
                })?;
        let offset: usize = self.sequence.anim_offset.try_into().map_err(|_| Error::Corrupted {
            error: "sequence animation offset is negative",
        })?;

        let count = blend_count.checked_mul(self.bone_count).ok_or(Error::Corrupted {
            error: "sequence animation record count overflows",
        })?;

        let animations =
            parse_records(self.bytes, offset, count, "sequence animation records out of bounds")?;

        Ok(Some(AnimationsRef {
            animations,
            offset,
            bone_count: self.bone_count,
            bytes: self.bytes,
        }))
    }
}

impl<'a> Deref for SequenceRef<'a> {
    type Target = Sequence;

    fn deref(&self) -> &Self::Target {
        self.sequence
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnimationsRef<'a> {
    animations: &'a [AnimOffsets],
    offset: usize,
    bone_count: usize,
    bytes: &'a [u8],
}

impl<'a> AnimationsRef<'a> {
    /// Returns the animation record for the given blend track and bone, or
    /// `None` if either index is out of range.
    #[must_use]
    pub fn get(&self, blend_index: usize, bone_index: usize) -> Option<AnimationRef<'a>> {
        if bone_index >= self.bone_count {
            return None;
        }

        let index = blend_index
            .checked_mul(self.bone_count)?
            .checked_add(bone_index)?;
        let offsets = self.animations.get(index)?;

        Some(AnimationRef {
            offsets,
            offset: self.offset + index * size_of::<AnimOffsets>(),
            bytes: self.bytes,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnimationRef<'a> {
    offsets: &'a AnimOffsets,
    offset: usize,
    bytes: &'a [u8],
}

impl<'a> AnimationRef<'a> {
    /// Returns the compressed value stream of a channel, or `None` if the
    /// channel is constant at the bone's rest value.
    ///
    /// Channels 0-2 are translation x/y/z, channels 3-5 rotation x/y/z.
    /// The returned slice extends to the end of the file; only
    /// [`extract_animation_value`] knows where the stream logically ends.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= CHANNEL_COUNT`.
    pub fn channel(&self, channel: usize) -> Result<Option<&'a [AnimValue]>> {
        let relative = self.offsets.value_offsets[channel].get();

        if relative == 0 {
            return Ok(None);
        }

        // value offsets are relative to the animation record itself
        let offset = self.offset + relative as usize;
        let bytes = self.bytes.get(offset..).ok_or(Error::Truncated {
            error: "animation value stream out of bounds",
        })?;

        let count = bytes.len() / size_of::<AnimValue>();
        let values = parse_slice(bytes, 0, count).ok_or(Error::Corrupted {
            error: "animation value stream is misaligned",
        })?;

        Ok(Some(values))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextureRef<'a> {
    texture: &'a Texture,
    bytes: &'a [u8],
}

/// An expanded texture: row-major rgba floats in 0.0-1.0, bottom row first.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<f32>,
}

impl<'a> TextureRef<'a> {
    pub fn name(&self) -> Result<&'a str> {
        name_str(&self.texture.name, "texture name is not valid utf8")
    }

    #[must_use]
    pub fn flags(&self) -> TextureFlags {
        TextureFlags::from_bits_truncate(self.texture.flags)
    }

    /// Expands the palette-indexed pixel data into rgba floats, flipping
    /// the row order to a top-left origin.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the pixel data or the palette is out of bounds.
    pub fn decode(&self) -> Result<TextureData> {
        let width: usize = self.texture.width.try_into().map_err(|_| Error::Corrupted {
            error: "texture width is negative",
        })?;
        let height: usize = self.texture.height.try_into().map_err(|_| Error::Corrupted {
            error: "texture height is negative",
        })?;
        let offset: usize = self.texture.data_offset.try_into().map_err(|_| Error::Corrupted {
            error: "texture data offset is negative",
        })?;

        let pixel_count = width.checked_mul(height).ok_or(Error::Corrupted {
            error: "texture size overflows",
        })?;

        if pixel_count == 0 {
            return Ok(TextureData {
                width,
                height,
                rgba: Vec::new(),
            });
        }

        let indices: &[u8] = parse_records(self.bytes, offset, pixel_count, "texture pixel data out of bounds")?;
        let palette: &[u8] = parse_records(
            self.bytes,
            offset + pixel_count,
            PALETTE_LEN,
            "texture palette out of bounds",
        )?;

        let mut rgba = Vec::with_capacity(pixel_count * 4);

        for row in indices.chunks_exact(width).rev() {
            for &index in row {
                let color = &palette[3 * index as usize..3 * index as usize + 3];
                rgba.push(f32::from(color[0]) / 255.0);
                rgba.push(f32::from(color[1]) / 255.0);
                rgba.push(f32::from(color[2]) / 255.0);
                rgba.push(1.0);
            }
        }

        Ok(TextureData {
            width,
            height,
            rgba,
        })
    }
}

impl<'a> Deref for TextureRef<'a> {
    type Target = Texture;

    fn deref(&self) -> &Self::Target {
        self.texture
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BodyPartRef<'a> {
    body_part: &'a BodyPart,
    bytes: &'a [u8],
}

impl<'a> BodyPartRef<'a> {
    pub fn name(&self) -> Result<&'a str> {
        name_str(&self.body_part.name, "body part name is not valid utf8")
    }

    pub fn iter_models(&self) -> Result<impl Iterator<Item = ModelRef<'a>> + ExactSizeIterator> {
        let models: &[Model] = parse_table(
            self.bytes,
            self.body_part.model_offset,
            self.body_part.model_count,
            "body part model descriptor is invalid",
            "body part models out of bounds",
        )?;

        let bytes = self.bytes;

        Ok(models.iter().map(move |model| ModelRef { model, bytes }))
    }
}

impl<'a> Deref for BodyPartRef<'a> {
    type Target = BodyPart;

    fn deref(&self) -> &Self::Target {
        self.body_part
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRef<'a> {
    model: &'a Model,
    bytes: &'a [u8],
}

impl<'a> ModelRef<'a> {
    pub fn name(&self) -> Result<&'a str> {
        name_str(&self.model.name, "model name is not valid utf8")
    }

    pub fn vertices(&self) -> Result<&'a [[f32; 3]]> {
        parse_table(
            self.bytes,
            self.model.vertex_offset,
            self.model.vertex_count,
            "model vertex descriptor is invalid",
            "model vertices out of bounds",
        )
    }

    /// Returns the owning bone index of each vertex; rigid skinning, one
    /// bone per vertex.
    pub fn vertex_bone_indices(&self) -> Result<&'a [u8]> {
        parse_table(
            self.bytes,
            self.model.vertex_bone_index_offset,
            self.model.vertex_count,
            "model vertex descriptor is invalid",
            "model vertex bone indices out of bounds",
        )
    }

    pub fn normals(&self) -> Result<&'a [[f32; 3]]> {
        parse_table(
            self.bytes,
            self.model.normal_offset,
            self.model.normal_count,
            "model normal descriptor is invalid",
            "model normals out of bounds",
        )
    }

    pub fn normal_bone_indices(&self) -> Result<&'a [u8]> {
        parse_table(
            self.bytes,
            self.model.normal_bone_index_offset,
            self.model.normal_count,
            "model normal descriptor is invalid",
            "model normal bone indices out of bounds",
        )
    }

    pub fn iter_meshes(&self) -> Result<impl Iterator<Item = MeshRef<'a>> + ExactSizeIterator> {
        let meshes: &[Mesh] = parse_table(
            self.bytes,
            self.model.mesh_offset,
            self.model.mesh_count,
            "model mesh descriptor is invalid",
            "model meshes out of bounds",
        )?;

        let bytes = self.bytes;

        Ok(meshes.iter().map(move |mesh| MeshRef { mesh, bytes }))
    }
}

impl<'a> Deref for ModelRef<'a> {
    type Target = Model;

    fn deref(&self) -> &Self::Target {
        self.model
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeshRef<'a> {
    mesh: &'a Mesh,
    bytes: &'a [u8],
}

impl<'a> MeshRef<'a> {
    /// Decodes the face stream of the mesh: a sequence of triangle fans
    /// and strips terminated by a zero vertex count. A negative count is a
    /// fan of `abs(count)` vertices, a positive count a strip.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the stream runs past the end of the file.
    pub fn faces(&self) -> Result<Vec<Face<'a>>> {
        let offset: usize = self.mesh.face_offset.try_into().map_err(|_| Error::Corrupted {
            error: "mesh face offset is negative",
        })?;

        let mut bytes = self.bytes.get(offset..).ok_or(Error::Truncated {
            error: "mesh face stream out of bounds",
        })?;

        let mut faces = Vec::new();

        loop {
            let vertex_count = parse_mut::<I16<LE>>(&mut bytes)
                .ok_or(Error::Truncated {
                    error: "eof reading face vertex count",
                })?
                .get();

            if vertex_count == 0 {
                break;
            }

            let primitive_type = if vertex_count < 0 {
                PrimitiveType::TriangleFan
            } else {
                PrimitiveType::TriangleStrip
            };

            let vertices = parse_slice_mut(&mut bytes, vertex_count.unsigned_abs().into()).ok_or(
                Error::Truncated {
                    error: "eof reading face vertices",
                },
            )?;

            faces.push(Face {
                primitive_type,
                vertices,
            });
        }

        Ok(faces)
    }
}

impl<'a> Deref for MeshRef<'a> {
    type Target = Mesh;

    fn deref(&self) -> &Self::Target {
        self.mesh
    }
}

#[cfg(test)]
mod tests;
