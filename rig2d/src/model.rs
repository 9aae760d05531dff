use std::collections::HashMap;

/// RGBA color with components in `0..=1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    /// Decodes an `RRGGBBAA` hex string. Anything that is not exactly 8 hex
    /// digits yields `None`.
    pub fn from_hex(value: &str) -> Option<Color> {
        if value.len() != 8 || !value.is_ascii() {
            return None;
        }
        let mut channels = [0.0f32; 4];
        for (i, channel) in channels.iter_mut().enumerate() {
            let byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16).ok()?;
            *channel = byte as f32 / 255.0;
        }
        Some(Color {
            r: channels[0],
            g: channels[1],
            b: channels[2],
            a: channels[3],
        })
    }

    pub fn multiply(self, other: Color) -> Color {
        Color {
            r: self.r * other.r,
            g: self.g * other.g,
            b: self.b * other.b,
            a: self.a * other.a,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

impl BlendMode {
    /// Maps a skeleton document blend name. Unknown names fall back to
    /// `Normal`; the loader warns.
    pub fn from_json_name(name: &str) -> Option<BlendMode> {
        match name {
            "normal" => Some(BlendMode::Normal),
            "additive" => Some(BlendMode::Additive),
            "multiply" => Some(BlendMode::Multiply),
            "screen" => Some(BlendMode::Screen),
            _ => None,
        }
    }
}

/// How a bone combines its parent's world transform with its own local one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Inherit {
    #[default]
    Normal,
    OnlyTranslation,
    NoRotationOrReflection,
    NoScale,
    NoScaleOrReflection,
}

/// Attachment type tags as they appear in skeleton documents. Only `Region`
/// and `Mesh` carry data in this crate; the rest exist so the loader can name
/// what it skips.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachmentType {
    Region,
    Mesh,
    BoundingBox,
    LinkedMesh,
    Path,
    Point,
    Clipping,
}

impl AttachmentType {
    pub fn from_json_name(name: &str) -> Option<AttachmentType> {
        match name {
            "region" => Some(AttachmentType::Region),
            "mesh" => Some(AttachmentType::Mesh),
            "boundingbox" => Some(AttachmentType::BoundingBox),
            "linkedmesh" => Some(AttachmentType::LinkedMesh),
            "path" => Some(AttachmentType::Path),
            "point" => Some(AttachmentType::Point),
            "clipping" => Some(AttachmentType::Clipping),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttachmentType::Region => "region",
            AttachmentType::Mesh => "mesh",
            AttachmentType::BoundingBox => "boundingbox",
            AttachmentType::LinkedMesh => "linkedmesh",
            AttachmentType::Path => "path",
            AttachmentType::Point => "point",
            AttachmentType::Clipping => "clipping",
        }
    }
}

/// Setup-pose bone. Bones form an arena: `parent` is an index into
/// `SkeletonData::bones` and is always smaller than the bone's own index, so
/// iterating in declaration order visits parents before children.
#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub inherit: Inherit,
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub attachment: Option<String>,
    pub color: Color,
    pub blend: BlendMode,
}

#[derive(Clone, Debug)]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
    /// Rotate flag of the atlas region this attachment resolved to at load
    /// time. Cached so world-vertex computation can swap width/height without
    /// an atlas lookup.
    pub region_rotate: bool,
}

#[derive(Clone, Debug)]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    pub color: Color,
    pub uvs: Vec<[f32; 2]>,
    /// Bone-local vertex positions. Weighted input encodings are flattened by
    /// the loader, so this is always one entry per mesh vertex.
    pub vertices: Vec<[f32; 2]>,
    pub triangles: Vec<u32>,
}

#[derive(Clone, Debug)]
pub enum Attachment {
    Region(RegionAttachment),
    Mesh(MeshAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Attachment::Region(a) => a.name.as_str(),
            Attachment::Mesh(a) => a.name.as_str(),
        }
    }

    pub fn attachment_type(&self) -> AttachmentType {
        match self {
            Attachment::Region(_) => AttachmentType::Region,
            Attachment::Mesh(_) => AttachmentType::Mesh,
        }
    }
}

/// A named set of attachments keyed by `(slot index, attachment name)`.
#[derive(Clone, Debug)]
pub struct SkinData {
    pub name: String,
    pub attachments: Vec<HashMap<String, Attachment>>,
}

impl SkinData {
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&Attachment> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    /// Frames ordered by time.
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    /// Max keyframe time, 0 when the animation has no frames.
    pub duration: f32,
    pub slot_timelines: Vec<AttachmentTimeline>,
    /// Indices of the bones the animation declares timelines for. The frames
    /// themselves are not modeled; the indices drive bone activation.
    pub bones: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct SkeletonData {
    pub name: String,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub width: f32,
    pub height: f32,
    pub images_path: Option<String>,
    pub fps: f32,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub skins: HashMap<String, SkinData>,
    pub animations: Vec<Animation>,
    pub animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        let index = self.animation_index.get(name).copied()?;
        self.animations.get(index).map(|a| (index, a))
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn default_skin(&self) -> Option<&SkinData> {
        self.skins.get("default")
    }
}
