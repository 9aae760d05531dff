use crate::{
    Animation, Atlas, Attachment, AttachmentFrame, AttachmentTimeline, AttachmentType, BlendMode,
    BoneData, Color, Error, Inherit, MeshAttachment, RegionAttachment, SkeletonData, SkinData,
    SlotData,
};
use log::warn;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

impl SkeletonData {
    pub fn from_json_str(input: &str, atlas: &Atlas) -> Result<Arc<Self>, Error> {
        Self::from_json_str_with_scale(input, atlas, 1.0)
    }

    /// Parses a skeleton document, resolving attachment regions against
    /// `atlas`. All translations and dimensions are multiplied by `scale`.
    pub fn from_json_str_with_scale(
        input: &str,
        atlas: &Atlas,
        scale: f32,
    ) -> Result<Arc<Self>, Error> {
        let root: Root = serde_json::from_str(input).map_err(|err| Error::JsonParse {
            message: err.to_string(),
        })?;
        read_skeleton_data(root, atlas, scale).map(Arc::new)
    }

    pub fn from_json_file(path: impl AsRef<Path>, atlas: &Atlas) -> Result<Arc<Self>, Error> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&input, atlas)
    }
}

fn read_skeleton_data(root: Root, atlas: &Atlas, scale: f32) -> Result<SkeletonData, Error> {
    let mut data = SkeletonData::default();

    if let Some(header) = root.skeleton {
        data.hash = header.hash;
        data.version = header.spine;
        data.width = header.width * scale;
        data.height = header.height * scale;
        data.images_path = header.images;
        data.fps = header.fps;
    } else {
        data.fps = 30.0;
    }

    // Bones are declared parents-first; a parent name that is not already
    // read (including forward references) is fatal.
    let mut bone_index = HashMap::new();
    for def in &root.bones {
        let parent = match def.parent.as_deref() {
            None => None,
            Some(parent_name) => match bone_index.get(parent_name) {
                Some(&index) => Some(index),
                None => {
                    return Err(Error::UnknownBoneParent {
                        bone: def.name.clone(),
                        parent: parent_name.to_string(),
                    });
                }
            },
        };

        bone_index.insert(def.name.clone(), data.bones.len());
        data.bones.push(BoneData {
            name: def.name.clone(),
            parent,
            length: def.length * scale,
            x: def.x * scale,
            y: def.y * scale,
            rotation: def.rotation,
            scale_x: def.scale_x,
            scale_y: def.scale_y,
            shear_x: def.shear_x,
            shear_y: def.shear_y,
            inherit: parse_inherit(def.inherit.as_deref(), &def.name),
        });
    }

    let mut slot_index = HashMap::new();
    for def in &root.slots {
        let Some(&bone) = bone_index.get(def.bone.as_str()) else {
            return Err(Error::UnknownSlotBone {
                slot: def.name.clone(),
                bone: def.bone.clone(),
            });
        };

        slot_index.insert(def.name.clone(), data.slots.len());
        data.slots.push(SlotData {
            name: def.name.clone(),
            bone,
            attachment: def.attachment.clone(),
            color: parse_color(def.color.as_deref(), &def.name),
            blend: parse_blend(def.blend.as_deref(), &def.name),
        });
    }

    for (skin_name, slots) in root.skins.map(SkinsDef::normalize).unwrap_or_default() {
        let mut skin = SkinData {
            name: skin_name.clone(),
            attachments: vec![HashMap::new(); data.slots.len()],
        };

        for (slot_name, attachments) in slots {
            let Some(&slot) = slot_index.get(slot_name.as_str()) else {
                warn!("skin '{skin_name}' references unknown slot '{slot_name}'");
                continue;
            };
            for (attachment_name, def) in attachments {
                if let Some(attachment) = read_attachment(&attachment_name, &def, atlas, scale) {
                    skin.attachments[slot].insert(attachment_name, attachment);
                }
            }
        }

        data.skins.insert(skin_name, skin);
    }

    for (animation_name, def) in root.animations {
        let mut slot_timelines = Vec::new();
        let mut duration = 0.0f32;

        for (slot_name, timelines) in def.slots {
            let Some(&slot) = slot_index.get(slot_name.as_str()) else {
                warn!("animation '{animation_name}' keys unknown slot '{slot_name}'");
                continue;
            };
            let Some(keys) = timelines.attachment else {
                continue;
            };

            let mut frames: Vec<AttachmentFrame> = keys
                .into_iter()
                .map(|key| AttachmentFrame {
                    time: key.time,
                    name: key.name,
                })
                .collect();
            frames.sort_by(|a, b| a.time.total_cmp(&b.time));

            if let Some(last) = frames.last() {
                duration = duration.max(last.time);
            }
            if !frames.is_empty() {
                slot_timelines.push(AttachmentTimeline {
                    slot_index: slot,
                    frames,
                });
            }
        }

        let mut bones = Vec::new();
        for bone_name in def.bones.keys() {
            match bone_index.get(bone_name.as_str()) {
                Some(&index) => bones.push(index),
                None => {
                    warn!("animation '{animation_name}' keys unknown bone '{bone_name}'");
                }
            }
        }
        bones.sort_unstable();

        data.animation_index
            .insert(animation_name.clone(), data.animations.len());
        data.animations.push(Animation {
            name: animation_name,
            duration,
            slot_timelines,
            bones,
        });
    }

    Ok(data)
}

fn read_attachment(
    name: &str,
    def: &AttachmentDef,
    atlas: &Atlas,
    scale: f32,
) -> Option<Attachment> {
    let type_name = def.attachment_type.as_deref().unwrap_or("region");
    let Some(attachment_type) = AttachmentType::from_json_name(type_name) else {
        warn!("attachment '{name}' has unknown type '{type_name}', skipping");
        return None;
    };

    let path = def.path.as_deref().unwrap_or(name);
    match attachment_type {
        AttachmentType::Region => {
            let Some(region) = atlas.find_region(path) else {
                warn!("atlas has no region '{path}' for attachment '{name}', skipping");
                return None;
            };
            Some(Attachment::Region(RegionAttachment {
                name: name.to_string(),
                path: path.to_string(),
                x: def.x * scale,
                y: def.y * scale,
                scale_x: def.scale_x,
                scale_y: def.scale_y,
                rotation: def.rotation,
                width: def.width.unwrap_or(region.width as f32) * scale,
                height: def.height.unwrap_or(region.height as f32) * scale,
                color: parse_color(def.color.as_deref(), name),
                region_rotate: region.rotate,
            }))
        }
        AttachmentType::Mesh => {
            if atlas.find_region(path).is_none() {
                warn!("atlas has no region '{path}' for mesh '{name}', skipping");
                return None;
            }

            let mut uvs = Vec::new();
            if def.uvs.len() % 2 != 0 {
                warn!("mesh '{name}' has an odd-length uvs array, dropping uvs");
            } else {
                uvs = def
                    .uvs
                    .chunks_exact(2)
                    .map(|pair| [pair[0], pair[1]])
                    .collect();
            }

            // Unweighted: a flat x,y list, one pair per mesh vertex.
            let read_flat = |raw: &[f32]| -> Vec<[f32; 2]> {
                raw.chunks_exact(2)
                    .map(|pair| [pair[0] * scale, -pair[1] * scale])
                    .collect()
            };

            let vertices = if def.vertices.is_empty() {
                Vec::new()
            } else if !uvs.is_empty() && def.vertices.len() == uvs.len() * 2 {
                read_flat(&def.vertices)
            } else if looks_weighted(&def.vertices) {
                read_weighted_vertices(&def.vertices, scale)
            } else if def.vertices.len() % 2 == 0 {
                warn!("mesh '{name}' vertices do not match the weighted encoding, reading as flat x,y pairs");
                read_flat(&def.vertices)
            } else {
                warn!("mesh '{name}' has an unreadable vertex array, dropping vertices");
                Vec::new()
            };

            Some(Attachment::Mesh(MeshAttachment {
                name: name.to_string(),
                path: path.to_string(),
                color: parse_color(def.color.as_deref(), name),
                uvs,
                triangles: read_triangles(name, &def.triangles, vertices.len()),
                vertices,
            }))
        }
        other => {
            warn!(
                "attachment '{name}' has unsupported type '{}', skipping",
                other.name()
            );
            None
        }
    }
}

/// Unpacks the weighted vertex encoding: per vertex, a bone count followed by
/// `(bone index, x, y)` triples. The per-bone offsets are summed into one
/// bone-local position per vertex. Y is negated to convert from the
/// down-positive document convention.
fn read_weighted_vertices(raw: &[f32], scale: f32) -> Vec<[f32; 2]> {
    let mut vertices = Vec::new();
    let mut i = 0usize;
    while i < raw.len() {
        let bone_count = raw[i] as usize;
        i += 1;
        let mut x = 0.0;
        let mut y = 0.0;
        for _ in 0..bone_count {
            if i + 2 >= raw.len() {
                i = raw.len();
                break;
            }
            x += raw[i + 1];
            y += raw[i + 2];
            i += 3;
        }
        vertices.push([x * scale, -y * scale]);
    }
    vertices
}

/// True when the array walks exactly as the weighted encoding: an integral
/// bone count followed by that many `(bone index, x, y)` triples, repeated
/// to the end.
fn looks_weighted(raw: &[f32]) -> bool {
    if raw.is_empty() {
        return false;
    }
    let mut i = 0usize;
    while i < raw.len() {
        let bone_count = raw[i];
        if bone_count < 1.0 || bone_count.fract() != 0.0 {
            return false;
        }
        i += 1 + bone_count as usize * 3;
    }
    i == raw.len()
}

/// Keeps only triangles whose indices fall inside the vertex array; anything
/// else would reach the draw list as an out-of-range index.
fn read_triangles(name: &str, raw: &[u32], vertex_count: usize) -> Vec<u32> {
    if raw.len() % 3 != 0 {
        warn!(
            "mesh '{name}' has a triangle list of length {}, dropping triangles",
            raw.len()
        );
        return Vec::new();
    }
    let mut triangles = Vec::with_capacity(raw.len());
    for triangle in raw.chunks_exact(3) {
        if triangle.iter().any(|&index| index as usize >= vertex_count) {
            warn!("mesh '{name}' triangle references a vertex past {vertex_count}, dropping it");
            continue;
        }
        triangles.extend_from_slice(triangle);
    }
    triangles
}

fn parse_inherit(value: Option<&str>, bone: &str) -> Inherit {
    let Some(value) = value else {
        return Inherit::Normal;
    };
    match value {
        "normal" => Inherit::Normal,
        "onlyTranslation" => Inherit::OnlyTranslation,
        "noRotationOrReflection" => Inherit::NoRotationOrReflection,
        "noScale" => Inherit::NoScale,
        "noScaleOrReflection" => Inherit::NoScaleOrReflection,
        other => {
            warn!("bone '{bone}' has unknown inherit mode '{other}', using normal");
            Inherit::Normal
        }
    }
}

fn parse_color(value: Option<&str>, context: &str) -> Color {
    let Some(value) = value else {
        return Color::WHITE;
    };
    match Color::from_hex(value) {
        Some(color) => color,
        None => {
            warn!("'{context}' has invalid color '{value}', using white");
            Color::WHITE
        }
    }
}

fn parse_blend(value: Option<&str>, slot: &str) -> BlendMode {
    let Some(value) = value else {
        return BlendMode::Normal;
    };
    match BlendMode::from_json_name(value) {
        Some(blend) => blend,
        None => {
            warn!("slot '{slot}' has unknown blend mode '{value}', using normal");
            BlendMode::Normal
        }
    }
}

fn default_one() -> f32 {
    1.0
}

fn default_fps() -> f32 {
    30.0
}

#[derive(Debug, Deserialize)]
struct Root {
    skeleton: Option<SkeletonHeaderDef>,
    #[serde(default)]
    bones: Vec<BoneDef>,
    #[serde(default)]
    slots: Vec<SlotDef>,
    skins: Option<SkinsDef>,
    #[serde(default)]
    animations: BTreeMap<String, AnimationDef>,
}

#[derive(Debug, Deserialize)]
struct SkeletonHeaderDef {
    hash: Option<String>,
    spine: Option<String>,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    images: Option<String>,
    #[serde(default = "default_fps")]
    fps: f32,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    name: String,
    parent: Option<String>,
    #[serde(default)]
    length: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(rename = "scaleX", default = "default_one")]
    scale_x: f32,
    #[serde(rename = "scaleY", default = "default_one")]
    scale_y: f32,
    #[serde(rename = "shearX", default)]
    shear_x: f32,
    #[serde(rename = "shearY", default)]
    shear_y: f32,
    #[serde(alias = "transform")]
    inherit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotDef {
    name: String,
    bone: String,
    attachment: Option<String>,
    color: Option<String>,
    blend: Option<String>,
}

type SkinAttachmentsDef = BTreeMap<String, BTreeMap<String, AttachmentDef>>;

/// Both historical skin encodings: a map keyed by skin name, and a list of
/// objects with explicit `name`/`attachments` fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SkinsDef {
    Map(BTreeMap<String, SkinAttachmentsDef>),
    Array(Vec<SkinEntryDef>),
}

#[derive(Debug, Deserialize)]
struct SkinEntryDef {
    name: Option<String>,
    #[serde(default)]
    attachments: SkinAttachmentsDef,
}

impl SkinsDef {
    fn normalize(self) -> Vec<(String, SkinAttachmentsDef)> {
        match self {
            SkinsDef::Map(map) => map.into_iter().collect(),
            SkinsDef::Array(entries) => entries
                .into_iter()
                .map(|entry| {
                    (
                        entry.name.unwrap_or_else(|| "default".to_string()),
                        entry.attachments,
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentDef {
    #[serde(rename = "type")]
    attachment_type: Option<String>,
    path: Option<String>,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(rename = "scaleX", default = "default_one")]
    scale_x: f32,
    #[serde(rename = "scaleY", default = "default_one")]
    scale_y: f32,
    #[serde(default)]
    rotation: f32,
    width: Option<f32>,
    height: Option<f32>,
    color: Option<String>,
    #[serde(default)]
    uvs: Vec<f32>,
    #[serde(default)]
    vertices: Vec<f32>,
    #[serde(default)]
    triangles: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct AnimationDef {
    #[serde(default)]
    slots: BTreeMap<String, SlotTimelinesDef>,
    #[serde(default)]
    bones: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SlotTimelinesDef {
    attachment: Option<Vec<AttachmentKeyDef>>,
}

#[derive(Debug, Deserialize)]
struct AttachmentKeyDef {
    #[serde(default)]
    time: f32,
    name: Option<String>,
}
