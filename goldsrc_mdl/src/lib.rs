#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod binary_utils;
pub mod mdl;

use std::{fs::File, io, path::Path, result};

use glam::{Mat4, Vec3};
use itertools::Itertools;
use thiserror::Error;

use mdl::{
    extract_animation_value, local_transform, BoundingBox, Face, Mdl, SequenceFlags, TextureData,
    TextureFlags,
};

#[derive(Debug, Clone, Error, Hash, PartialEq, Eq)]
pub enum Error {
    #[error("io error reading `{path}`: {error}")]
    Io { path: String, error: String },
    #[error("not an mdl file: invalid signature `{signature}`")]
    InvalidSignature { signature: String },
    #[error("unsupported mdl version {version}")]
    UnsupportedVersion { version: i32 },
    #[error("mdl truncated: {error}")]
    Truncated { error: &'static str },
    #[error("mdl corrupted: {error}")]
    Corrupted { error: &'static str },
    #[error("animation corrupted: {error}")]
    CorruptAnimation { error: &'static str },
    #[error("mdl {feature} unsupported")]
    Unsupported { feature: &'static str },
    #[error("{what} index out of range")]
    OutOfRange { what: &'static str },
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    fn from_io(err: &io::Error, path: &impl ToString) -> Self {
        Self::Io {
            path: path.to_string(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    mdl: Mdl,
}

impl Model {
    /// # Errors
    ///
    /// Returns `Err` if reading the mdl file fails.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| Error::from_io(&err, &path.display()))?;
        let mdl = Mdl::read(file).map_err(|err| Error::from_io(&err, &path.display()))?;

        Ok(Model { mdl })
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Model {
            mdl: Mdl::from_bytes(bytes),
        }
    }

    /// # Errors
    ///
    /// Returns `Err` if the signature is invalid, the version is
    /// unsupported or the file is too short to contain a header.
    pub fn verify(&self) -> Result<Verified> {
        self.mdl.check_signature()?;
        self.mdl.check_version()?;

        let header = self.mdl.header()?;

        Ok(Verified { header })
    }
}

#[derive(Debug, Clone)]
pub struct Verified<'a> {
    header: mdl::HeaderRef<'a>,
}

impl<'a> Verified<'a> {
    /// # Errors
    ///
    /// Returns `Err` if reading the name fails.
    pub fn name(&self) -> Result<&'a str> {
        self.header.name()
    }

    #[must_use]
    pub fn eye_position(&self) -> Vec3 {
        self.header.eye_position()
    }

    #[must_use]
    pub fn hull(&self) -> &'a BoundingBox {
        self.header.hull()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the bones fails due to corrupted mdl.
    /// Bones are guaranteed to come after their parents, so transforms can
    /// be composed in a single forward pass.
    pub fn bones(&self) -> Result<Vec<Bone<'a>>> {
        self.header
            .iter_bones()?
            .enumerate()
            .map(|(index, bone)| {
                let parent_index = match usize::try_from(bone.parent_index) {
                    Err(_) => None,
                    Ok(parent) if parent < index => Some(parent),
                    Ok(_) => {
                        return Err(Error::Corrupted {
                            error: "bone hierarchy is not topologically ordered",
                        })
                    }
                };

                Ok(Bone {
                    name: bone.name()?,
                    parent_index,
                    position: Vec3::from(bone.position),
                    rotation: Vec3::from(bone.rotation),
                    position_scale: Vec3::from(bone.position_scale),
                    rotation_scale: Vec3::from(bone.rotation_scale),
                })
            })
            .try_collect()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the bone controllers fails due to corrupted mdl.
    pub fn bone_controllers(&self) -> Result<Vec<BoneController>> {
        let bone_count = self.header.bone_count()?;

        self.header
            .iter_bone_controllers()?
            .map(|controller| {
                Ok(BoneController {
                    bone_index: checked_bone_index(controller.bone_index, bone_count)?,
                    kind: controller.kind,
                    start_angle: controller.start_angle,
                    end_angle: controller.end_angle,
                    index: controller.index,
                })
            })
            .try_collect()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the hitboxes fails due to corrupted mdl.
    pub fn hitboxes(&self) -> Result<Vec<Hitbox>> {
        let bone_count = self.header.bone_count()?;

        self.header
            .iter_hitboxes()?
            .map(|hitbox| {
                let bone_index =
                    checked_bone_index(hitbox.bone_index, bone_count)?.ok_or(Error::Corrupted {
                        error: "hitbox bone index is negative",
                    })?;

                Ok(Hitbox {
                    bone_index,
                    group_index: hitbox.group_index,
                    bounds: hitbox.bounds,
                })
            })
            .try_collect()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the attachments fails due to corrupted mdl.
    pub fn attachments(&self) -> Result<Vec<Attachment<'a>>> {
        let bone_count = self.header.bone_count()?;

        self.header
            .iter_attachments()?
            .map(|attachment| {
                let bone_index = checked_bone_index(attachment.bone_index, bone_count)?.ok_or(
                    Error::Corrupted {
                        error: "attachment bone index is negative",
                    },
                )?;

                Ok(Attachment {
                    name: attachment.name()?,
                    bone_index,
                    origin: Vec3::from(attachment.origin),
                })
            })
            .try_collect()
    }

    /// Decodes all textures into rgba data.
    ///
    /// # Errors
    ///
    /// Returns `Err` if reading the textures fails due to corrupted mdl.
    pub fn textures(&self) -> Result<Vec<Texture<'a>>> {
        self.header
            .iter_textures()?
            .map(|texture| {
                Ok(Texture {
                    name: texture.name()?,
                    flags: texture.flags(),
                    data: texture.decode()?,
                })
            })
            .try_collect()
    }

    /// Returns the skin families: each family maps mesh skin slots to
    /// texture indices.
    ///
    /// # Errors
    ///
    /// Returns `Err` if reading the skin table fails due to corrupted mdl.
    pub fn skin_families(&self) -> Result<Vec<Vec<u16>>> {
        Ok(self
            .header
            .skin_families()?
            .into_iter()
            .map(|family| family.iter().map(|texture_index| texture_index.get()).collect())
            .collect())
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the body parts fails due to corrupted mdl.
    pub fn body_parts(&self) -> Result<Vec<BodyPart<'a>>> {
        let bone_count = self.header.bone_count()?;

        self.header
            .iter_body_parts()?
            .map(|body_part| {
                Ok(BodyPart {
                    name: body_part.name()?,
                    base: body_part.base,
                    models: body_part
                        .iter_models()?
                        .map(|model| read_sub_model(&model, bone_count))
                        .try_collect()?,
                })
            })
            .try_collect()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the sequences fails due to corrupted mdl.
    pub fn sequences(&self) -> Result<Vec<Sequence<'a>>> {
        self.header
            .iter_sequences()?
            .map(|sequence| {
                let events = sequence
                    .events()?
                    .iter()
                    .map(|event| {
                        Ok(SequenceEvent {
                            frame_index: event.frame_index,
                            event_index: event.event_index,
                            event_type: event.event_type,
                            options: event.options()?,
                        })
                    })
                    .try_collect()?;

                let pivots = sequence
                    .pivots()?
                    .iter()
                    .map(|pivot| SequencePivot {
                        origin: Vec3::from(pivot.origin),
                        start: pivot.start,
                        end: pivot.end,
                    })
                    .collect();

                Ok(Sequence {
                    name: sequence.name()?,
                    fps: sequence.fps,
                    flags: sequence.flags(),
                    frame_count: usize::try_from(sequence.frame_count).map_err(|_| {
                        Error::Corrupted {
                            error: "sequence frame count is negative",
                        }
                    })?,
                    blend_count: usize::try_from(sequence.blend_count).map_err(|_| {
                        Error::Corrupted {
                            error: "sequence blend count is negative",
                        }
                    })?,
                    group_index: sequence.group_index,
                    events,
                    pivots,
                })
            })
            .try_collect()
    }

    /// # Errors
    ///
    /// Returns `Err` if reading the sequence groups fails due to corrupted mdl.
    pub fn sequence_groups(&self) -> Result<Vec<SequenceGroup<'a>>> {
        self.header
            .iter_sequence_groups()?
            .map(|group| {
                Ok(SequenceGroup {
                    label: group.label()?,
                    name: group.name()?,
                })
            })
            .try_collect()
    }

    /// Computes the world transform of each bone at the given frame of an
    /// animation sequence.
    ///
    /// # Errors
    ///
    /// Returns `Err` if an index is out of range, the animation data is
    /// corrupted or it lives in an external sequence group file.
    pub fn bone_world_transforms(
        &self,
        sequence_index: usize,
        blend_index: usize,
        frame_index: usize,
    ) -> Result<Vec<Mat4>> {
        let sequence = self
            .header
            .iter_sequences()?
            .nth(sequence_index)
            .ok_or(Error::OutOfRange { what: "sequence" })?;

        let frame_count =
            usize::try_from(sequence.frame_count).map_err(|_| Error::Corrupted {
                error: "sequence frame count is negative",
            })?;

        if frame_index >= frame_count {
            return Err(Error::OutOfRange { what: "frame" });
        }

        let animations = sequence.animations()?.ok_or(Error::Unsupported {
            feature: "external sequence group animation data",
        })?;

        let bones = self.bones()?;
        let mut world_transforms = Vec::with_capacity(bones.len());

        for (bone_index, bone) in bones.iter().enumerate() {
            let animation = animations
                .get(blend_index, bone_index)
                .ok_or(Error::OutOfRange { what: "blend" })?;

            let mut position = bone.position;
            let mut rotation = bone.rotation;

            for axis in 0..3 {
                if let Some(values) = animation.channel(axis)? {
                    position[axis] = extract_animation_value(
                        frame_index,
                        values,
                        bone.position_scale[axis],
                        bone.position[axis],
                    )?;
                }

                if let Some(values) = animation.channel(3 + axis)? {
                    rotation[axis] = extract_animation_value(
                        frame_index,
                        values,
                        bone.rotation_scale[axis],
                        bone.rotation[axis],
                    )?;
                }
            }

            let local = local_transform(position, rotation);
            let world = compose_with_parent(&world_transforms, bone.parent_index, local);

            world_transforms.push(world);
        }

        Ok(world_transforms)
    }

    /// Computes the world transform of each bone in the rest pose.
    ///
    /// # Errors
    ///
    /// Returns `Err` if reading the bones fails due to corrupted mdl.
    pub fn rest_bone_world_transforms(&self) -> Result<Vec<Mat4>> {
        let bones = self.bones()?;
        let mut world_transforms = Vec::with_capacity(bones.len());

        for bone in &bones {
            let local = local_transform(bone.position, bone.rotation);
            let world = compose_with_parent(&world_transforms, bone.parent_index, local);

            world_transforms.push(world);
        }

        Ok(world_transforms)
    }
}

fn compose_with_parent(
    world_transforms: &[Mat4],
    parent_index: Option<usize>,
    local: Mat4,
) -> Mat4 {
    match parent_index {
        // parent is guaranteed to come before the bone itself
        Some(parent) => world_transforms[parent] * local,
        None => local,
    }
}

fn checked_bone_index(bone_index: i32, bone_count: usize) -> Result<Option<usize>> {
    match usize::try_from(bone_index) {
        Err(_) => Ok(None),
        Ok(index) if index < bone_count => Ok(Some(index)),
        Ok(_) => Err(Error::Corrupted {
            error: "bone index out of bounds",
        }),
    }
}

fn read_sub_model<'a>(model: &mdl::ModelRef<'a>, bone_count: usize) -> Result<SubModel<'a>> {
    let vertices = model.vertices()?;
    let normals = model.normals()?;

    let vertex_bone_indices = model.vertex_bone_indices()?;
    let normal_bone_indices = model.normal_bone_indices()?;

    if vertex_bone_indices
        .iter()
        .chain(normal_bone_indices)
        .any(|&bone_index| bone_index as usize >= bone_count)
    {
        return Err(Error::Corrupted {
            error: "vertex bone index out of bounds",
        });
    }

    let meshes = model
        .iter_meshes()?
        .map(|mesh| {
            let faces = mesh.faces()?;

            for face in &faces {
                for vertex in face.vertices {
                    if vertex.vertex_index.get() as usize >= vertices.len()
                        || vertex.normal_index.get() as usize >= normals.len()
                    {
                        return Err(Error::Corrupted {
                            error: "face vertex index out of bounds",
                        });
                    }
                }
            }

            Ok(Mesh {
                skin_index: usize::try_from(mesh.skin_index).map_err(|_| Error::Corrupted {
                    error: "mesh skin index is negative",
                })?,
                faces,
            })
        })
        .try_collect()?;

    Ok(SubModel {
        name: model.name()?,
        vertices: vertices.iter().copied().map(Vec3::from).collect(),
        vertex_bone_indices,
        normals: normals.iter().copied().map(Vec3::from).collect(),
        normal_bone_indices,
        meshes,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bone<'a> {
    pub name: &'a str,
    pub parent_index: Option<usize>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub position_scale: Vec3,
    pub rotation_scale: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneController {
    pub bone_index: Option<usize>,
    pub kind: i32,
    pub start_angle: f32,
    pub end_angle: f32,
    pub index: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub bone_index: usize,
    pub group_index: i32,
    pub bounds: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment<'a> {
    pub name: &'a str,
    pub bone_index: usize,
    pub origin: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture<'a> {
    pub name: &'a str,
    pub flags: TextureFlags,
    pub data: TextureData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart<'a> {
    pub name: &'a str,
    pub base: i32,
    pub models: Vec<SubModel<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubModel<'a> {
    pub name: &'a str,
    pub vertices: Vec<Vec3>,
    pub vertex_bone_indices: &'a [u8],
    pub normals: Vec<Vec3>,
    pub normal_bone_indices: &'a [u8],
    pub meshes: Vec<Mesh<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh<'a> {
    pub skin_index: usize,
    pub faces: Vec<Face<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<'a> {
    pub name: &'a str,
    pub fps: f32,
    pub flags: SequenceFlags,
    pub frame_count: usize,
    pub blend_count: usize,
    pub group_index: i32,
    pub events: Vec<SequenceEvent<'a>>,
    pub pivots: Vec<SequencePivot>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencePivot {
    pub origin: Vec3,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGroup<'a> {
    pub label: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceEvent<'a> {
    pub frame_index: i32,
    pub event_index: i32,
    pub event_type: i32,
    pub options: &'a str,
}
