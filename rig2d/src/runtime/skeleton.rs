use crate::{Attachment, BlendMode, Color, Error, Inherit, SkeletonData};
use log::warn;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub inherit: Inherit,
    /// Inactive bones are skipped by the world-transform pass and by the
    /// render adapter. The flag is toggled by animation resolution, never by
    /// deleting the bone.
    pub active: bool,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    pub fn world_rotation(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }

    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub active: bool,
    pub attachment: Option<String>,
    pub color: Color,
    pub blend: BlendMode,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn set_attachment(&mut self, attachment: Option<String>) {
        self.attachment = attachment;
    }
}

/// What `Skeleton::resolve_animation` activated, for callers that want to
/// inspect or mirror the result (sprite pools, debug overlays).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationResolution {
    /// Indices of the slots the animation keys, ascending.
    pub slots: Vec<usize>,
    /// `(slot index, attachment name)` pairs the animation can show.
    pub attachments: Vec<(usize, String)>,
    /// Indices of the animated bones plus all their ancestors, ascending.
    pub bones: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    /// Current skin name. `None` resolves attachments through the skin named
    /// "default" only.
    pub skin: Option<String>,
    pub color: Color,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    update_order: Vec<usize>,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(data_index, bone)| {
                debug_assert!(
                    bone.parent.is_none_or(|p| p < data_index),
                    "bone arena must order parents before children"
                );
                Bone {
                    data_index,
                    parent: bone.parent,
                    inherit: bone.inherit,
                    active: true,
                    x: bone.x,
                    y: bone.y,
                    rotation: bone.rotation,
                    scale_x: bone.scale_x,
                    scale_y: bone.scale_y,
                    shear_x: bone.shear_x,
                    shear_y: bone.shear_y,
                    a: 1.0,
                    b: 0.0,
                    c: 0.0,
                    d: 1.0,
                    world_x: 0.0,
                    world_y: 0.0,
                }
            })
            .collect::<Vec<_>>();

        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(data_index, slot)| Slot {
                data_index,
                bone: slot.bone,
                active: true,
                attachment: slot.attachment.clone(),
                color: slot.color,
                blend: slot.blend,
            })
            .collect::<Vec<_>>();

        // Declaration order is parent-first (the loader guarantees parent
        // index < child index), so it doubles as the update order.
        let update_order = (0..bones.len()).collect::<Vec<_>>();

        Skeleton {
            data,
            bones,
            slots,
            skin: None,
            color: Color::WHITE,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            update_order,
        }
    }

    /// Restores setup-pose locals, slot colors and attachments, and clears
    /// any activation state left by a previous animation resolution.
    pub fn set_to_setup_pose(&mut self) {
        for (i, bone) in self.bones.iter_mut().enumerate() {
            let Some(data) = self.data.bones.get(i) else {
                continue;
            };
            bone.inherit = data.inherit;
            bone.active = true;
            bone.x = data.x;
            bone.y = data.y;
            bone.rotation = data.rotation;
            bone.scale_x = data.scale_x;
            bone.scale_y = data.scale_y;
            bone.shear_x = data.shear_x;
            bone.shear_y = data.shear_y;
        }

        let data = self.data.clone();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot_data) = data.slots.get(i) else {
                continue;
            };
            slot.active = true;
            slot.color = slot_data.color;
            slot.blend = slot_data.blend;
            slot.attachment = match slot_data.attachment.as_deref() {
                Some(name) if resolve_attachment(&data, self.skin.as_deref(), i, name).is_some() => {
                    Some(name.to_string())
                }
                _ => None,
            };
        }
    }

    /// Switches the active skin and re-resolves every slot's declared setup
    /// attachment against it. Slots whose setup attachment neither the new
    /// skin nor the default skin provides are left unattached.
    pub fn set_skin(&mut self, skin_name: Option<&str>) -> Result<(), Error> {
        match skin_name {
            None => {
                self.skin = None;
            }
            Some(name) => {
                if self.data.skins.contains_key(name) {
                    self.skin = Some(name.to_string());
                } else {
                    return Err(Error::UnknownSkin {
                        name: name.to_string(),
                    });
                }
            }
        }

        let data = self.data.clone();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let setup_name = data.slots.get(i).and_then(|s| s.attachment.as_deref());
            let Some(setup_name) = setup_name else {
                continue;
            };
            if resolve_attachment(&data, self.skin.as_deref(), i, setup_name).is_some() {
                slot.attachment = Some(setup_name.to_string());
            } else {
                warn!(
                    "skin {:?} has no attachment '{setup_name}' for slot '{}'",
                    self.skin.as_deref().unwrap_or("default"),
                    data.slots.get(i).map(|s| s.name.as_str()).unwrap_or("?"),
                );
                slot.attachment = None;
            }
        }

        Ok(())
    }

    /// Resolves the named attachment through the current skin, falling back
    /// to the skin named "default".
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&Attachment> {
        resolve_attachment(&self.data, self.skin.as_deref(), slot_index, attachment_name)
    }

    /// The attachment currently shown by a slot, if any.
    pub fn slot_attachment(&self, slot_index: usize) -> Option<&Attachment> {
        let slot = self.slots.get(slot_index)?;
        let name = slot.attachment.as_deref()?;
        self.attachment(slot_index, name)
    }

    /// Recomputes every active bone's world transform, parents before
    /// children.
    pub fn update_world_transform(&mut self) {
        for &index in &self.update_order {
            if !self.bones[index].active {
                continue;
            }
            match self.bones[index].parent {
                None => {
                    let bone = &mut self.bones[index];
                    update_world_transform_root(bone, self.x, self.y, self.scale_x, self.scale_y);
                }
                Some(parent_index) => {
                    // parent_index < index by the arena invariant.
                    let (head, tail) = self.bones.split_at_mut(index);
                    let parent = &head[parent_index];
                    update_world_transform_child(&mut tail[0], self.scale_x, self.scale_y, parent);
                }
            }
        }
    }

    /// Activates the subset of the skeleton an animation uses: its keyed
    /// slots, the attachments those keys can show, and the animated bones
    /// plus their ancestors. Everything else is flagged inactive (but kept).
    /// Calling this again with another animation fully replaces the result.
    pub fn resolve_animation(&mut self, name: &str) -> Result<AnimationResolution, Error> {
        let data = self.data.clone();
        let Some((_, animation)) = data.animation(name) else {
            return Err(Error::UnknownAnimation {
                name: name.to_string(),
            });
        };

        let used_slots: HashSet<usize> = animation
            .slot_timelines
            .iter()
            .map(|t| t.slot_index)
            .collect();
        let used_names: HashSet<&str> = animation
            .slot_timelines
            .iter()
            .flat_map(|t| t.frames.iter())
            .filter_map(|f| f.name.as_deref())
            .collect();

        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.active = used_slots.contains(&i);
        }

        let skin = self
            .skin
            .as_deref()
            .and_then(|n| data.skin(n))
            .or_else(|| data.default_skin());

        let mut attachments = Vec::new();
        if let Some(skin) = skin {
            for (slot_index, slot_map) in skin.attachments.iter().enumerate() {
                if !used_slots.contains(&slot_index) {
                    continue;
                }
                for attachment_name in slot_map.keys() {
                    if used_names.contains(attachment_name.as_str()) {
                        attachments.push((slot_index, attachment_name.clone()));
                    }
                }
            }
        }
        attachments.sort();
        for (slot_index, attachment_name) in &attachments {
            if let Some(slot) = self.slots.get_mut(*slot_index) {
                slot.attachment = Some(attachment_name.clone());
            }
        }

        let mut in_closure = vec![false; self.bones.len()];
        for &bone_index in &animation.bones {
            let mut current = Some(bone_index);
            while let Some(index) = current {
                if in_closure[index] {
                    break;
                }
                in_closure[index] = true;
                current = data.bones.get(index).and_then(|b| b.parent);
            }
        }
        for (i, bone) in self.bones.iter_mut().enumerate() {
            bone.active = in_closure[i];
        }

        let mut slots: Vec<usize> = used_slots.into_iter().collect();
        slots.sort_unstable();
        let bones: Vec<usize> = in_closure
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
            .collect();

        Ok(AnimationResolution {
            slots,
            attachments,
            bones,
        })
    }
}

fn resolve_attachment<'a>(
    data: &'a SkeletonData,
    skin_name: Option<&str>,
    slot_index: usize,
    attachment_name: &str,
) -> Option<&'a Attachment> {
    if let Some(skin_name) = skin_name {
        if let Some(skin) = data.skin(skin_name) {
            if let Some(attachment) = skin.attachment(slot_index, attachment_name) {
                return Some(attachment);
            }
        }
        if skin_name == "default" {
            return None;
        }
    }
    data.default_skin()
        .and_then(|skin| skin.attachment(slot_index, attachment_name))
}

fn update_world_transform_root(bone: &mut Bone, x: f32, y: f32, scale_x: f32, scale_y: f32) {
    let rotation_x = (bone.rotation + bone.shear_x).to_radians();
    let rotation_y = (bone.rotation + 90.0 + bone.shear_y).to_radians();
    let la = rotation_x.cos() * bone.scale_x;
    let lb = rotation_y.cos() * bone.scale_y;
    let lc = rotation_x.sin() * bone.scale_x;
    let ld = rotation_y.sin() * bone.scale_y;

    bone.a = la * scale_x;
    bone.b = lb * scale_x;
    bone.c = lc * scale_y;
    bone.d = ld * scale_y;
    bone.world_x = bone.x * scale_x + x;
    bone.world_y = bone.y * scale_y + y;
}

fn update_world_transform_child(
    bone: &mut Bone,
    skeleton_scale_x: f32,
    skeleton_scale_y: f32,
    parent: &Bone,
) {
    let mut pa = parent.a;
    let mut pb = parent.b;
    let mut pc = parent.c;
    let mut pd = parent.d;

    bone.world_x = pa * bone.x + pb * bone.y + parent.world_x;
    bone.world_y = pc * bone.x + pd * bone.y + parent.world_y;

    match bone.inherit {
        Inherit::Normal => {
            let rotation_x = (bone.rotation + bone.shear_x).to_radians();
            let rotation_y = (bone.rotation + 90.0 + bone.shear_y).to_radians();
            let la = rotation_x.cos() * bone.scale_x;
            let lb = rotation_y.cos() * bone.scale_y;
            let lc = rotation_x.sin() * bone.scale_x;
            let ld = rotation_y.sin() * bone.scale_y;

            bone.a = pa * la + pb * lc;
            bone.b = pa * lb + pb * ld;
            bone.c = pc * la + pd * lc;
            bone.d = pc * lb + pd * ld;
        }
        Inherit::OnlyTranslation => {
            let rotation_x = (bone.rotation + bone.shear_x).to_radians();
            let rotation_y = (bone.rotation + 90.0 + bone.shear_y).to_radians();
            bone.a = rotation_x.cos() * bone.scale_x * skeleton_scale_x;
            bone.b = rotation_y.cos() * bone.scale_y * skeleton_scale_x;
            bone.c = rotation_x.sin() * bone.scale_x * skeleton_scale_y;
            bone.d = rotation_y.sin() * bone.scale_y * skeleton_scale_y;
        }
        Inherit::NoRotationOrReflection => {
            let sx = if skeleton_scale_x.abs() > 1.0e-12 {
                1.0 / skeleton_scale_x
            } else {
                0.0
            };
            let sy = if skeleton_scale_y.abs() > 1.0e-12 {
                1.0 / skeleton_scale_y
            } else {
                0.0
            };
            pa *= sx;
            pc *= sy;

            let mut s = pa * pa + pc * pc;
            let prx;
            if s > 1.0e-4 {
                s = (pa * pd * sy - pb * sx * pc).abs() / s;
                pb = pc * s;
                pd = pa * s;
                prx = pc.atan2(pa).to_degrees();
            } else {
                pa = 0.0;
                pc = 0.0;
                prx = 90.0 - pd.atan2(pb).to_degrees();
            }

            let rotation_x = (bone.rotation + bone.shear_x - prx).to_radians();
            let rotation_y = (bone.rotation + bone.shear_y - prx + 90.0).to_radians();
            let la = rotation_x.cos() * bone.scale_x;
            let lb = rotation_y.cos() * bone.scale_y;
            let lc = rotation_x.sin() * bone.scale_x;
            let ld = rotation_y.sin() * bone.scale_y;

            bone.a = (pa * la - pb * lc) * skeleton_scale_x;
            bone.b = (pa * lb - pb * ld) * skeleton_scale_x;
            bone.c = (pc * la + pd * lc) * skeleton_scale_y;
            bone.d = (pc * lb + pd * ld) * skeleton_scale_y;
        }
        Inherit::NoScale | Inherit::NoScaleOrReflection => {
            let mut rotation = bone.rotation.to_radians();
            let cos = rotation.cos();
            let sin = rotation.sin();

            let za = (pa * cos + pb * sin) / skeleton_scale_x;
            let zc = (pc * cos + pd * sin) / skeleton_scale_y;
            let mut s = (za * za + zc * zc).sqrt();
            if s > 1.0e-5 {
                s = 1.0 / s;
            }
            let za = za * s;
            let zc = zc * s;

            let mut s2 = (za * za + zc * zc).sqrt();
            if matches!(bone.inherit, Inherit::NoScale) {
                let det = pa * pd - pb * pc;
                let flip = (det < 0.0) != ((skeleton_scale_x < 0.0) != (skeleton_scale_y < 0.0));
                if flip {
                    s2 = -s2;
                }
            }

            rotation = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
            let zb = rotation.cos() * s2;
            let zd = rotation.sin() * s2;

            let shear_x = bone.shear_x.to_radians();
            let shear_y = (90.0 + bone.shear_y).to_radians();
            let la = shear_x.cos() * bone.scale_x;
            let lb = shear_y.cos() * bone.scale_y;
            let lc = shear_x.sin() * bone.scale_x;
            let ld = shear_y.sin() * bone.scale_y;

            bone.a = (za * la + zb * lc) * skeleton_scale_x;
            bone.b = (za * lb + zb * ld) * skeleton_scale_x;
            bone.c = (zc * la + zd * lc) * skeleton_scale_y;
            bone.d = (zc * lb + zd * ld) * skeleton_scale_y;
        }
    }
}

impl crate::RegionAttachment {
    /// Local quad corners mapped through a bone's world transform, in
    /// BL, BR, TR, TL order. The extents are the attachment size times its
    /// own scale. The quad is rotated twice: once by the attachment's own
    /// rotation in bone space, then by whatever rotation the bone's world
    /// matrix carries.
    pub fn compute_world_vertices(&self, bone: &Bone) -> [[f32; 2]; 4] {
        let width = self.width * self.scale_x;
        let height = self.height * self.scale_y;
        let (w, h) = if self.region_rotate {
            (height, width)
        } else {
            (width, height)
        };

        let local = [
            [self.x - w / 2.0, self.y - h / 2.0],
            [self.x + w / 2.0, self.y - h / 2.0],
            [self.x + w / 2.0, self.y + h / 2.0],
            [self.x - w / 2.0, self.y + h / 2.0],
        ];

        let radians = self.rotation.to_radians();
        let cos = radians.cos();
        let sin = radians.sin();

        local.map(|[lx, ly]| {
            let rx = lx * cos - ly * sin;
            let ry = lx * sin + ly * cos;
            [
                rx * bone.a + ry * bone.b + bone.world_x,
                rx * bone.c + ry * bone.d + bone.world_y,
            ]
        })
    }
}
