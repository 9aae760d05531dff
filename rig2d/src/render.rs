use crate::{Atlas, Attachment, BlendMode, Skeleton, TextureRegion};
use log::debug;

/// View configuration for draw-list production. Owned by the caller and
/// passed per call; the skeleton itself carries no view state.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub premultiplied_alpha: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            flip_x: false,
            flip_y: false,
            premultiplied_alpha: false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

/// One batched draw call: `index_count` indices starting at `first_index`,
/// all sharing a page texture and blend mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Draw {
    pub texture: String,
    pub blend: BlendMode,
    pub first_index: usize,
    pub index_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub draws: Vec<Draw>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.draws.clear();
    }
}

pub fn build_draw_list(skeleton: &Skeleton, atlas: &Atlas, settings: &RenderSettings) -> DrawList {
    let mut out = DrawList::default();
    append_draw_list(&mut out, skeleton, atlas, settings);
    out
}

/// Walks the slots in declaration order and appends one quad or triangle fan
/// per visible attachment. Content gaps (missing regions, empty slots) skip
/// the slot; nothing here aborts.
pub fn append_draw_list(
    out: &mut DrawList,
    skeleton: &Skeleton,
    atlas: &Atlas,
    settings: &RenderSettings,
) {
    let sx = settings.scale * if settings.flip_x { -1.0 } else { 1.0 };
    let sy = settings.scale * if settings.flip_y { -1.0 } else { 1.0 };
    let to_view = |[wx, wy]: [f32; 2]| -> [f32; 2] {
        [(wx + settings.offset_x) * sx, (wy + settings.offset_y) * sy]
    };

    for (slot_index, slot) in skeleton.slots.iter().enumerate() {
        if !slot.active {
            continue;
        }
        let Some(bone) = skeleton.bones.get(slot.bone) else {
            continue;
        };
        if !bone.active {
            continue;
        }
        let Some(attachment) = skeleton.slot_attachment(slot_index) else {
            continue;
        };

        match attachment {
            Attachment::Region(region_attachment) => {
                let Some(region) = atlas.find_region(&region_attachment.path) else {
                    debug!(
                        "atlas has no region '{}', skipping slot {slot_index}",
                        region_attachment.path
                    );
                    continue;
                };
                let Some(page) = atlas.page(region.page) else {
                    continue;
                };

                let world = region_attachment.compute_world_vertices(bone);
                let positions = world.map(to_view);
                let uvs = region_quad_uvs(region);
                let color = apply_pma(
                    skeleton
                        .color
                        .multiply(slot.color)
                        .multiply(region_attachment.color)
                        .to_array(),
                    settings.premultiplied_alpha,
                );

                let base = out.vertices.len() as u32;
                for (position, uv) in positions.into_iter().zip(uvs) {
                    out.vertices.push(Vertex {
                        position,
                        uv,
                        color,
                    });
                }

                let first_index = out.indices.len();
                out.indices
                    .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
                push_draw(out, &page.name, slot.blend, first_index, 6);
            }
            Attachment::Mesh(mesh) => {
                let Some(region) = atlas.find_region(&mesh.path) else {
                    debug!(
                        "atlas has no region '{}', skipping slot {slot_index}",
                        mesh.path
                    );
                    continue;
                };
                let Some(page) = atlas.page(region.page) else {
                    continue;
                };
                if mesh.vertices.is_empty() || mesh.triangles.is_empty() {
                    continue;
                }

                let color = apply_pma(
                    skeleton
                        .color
                        .multiply(slot.color)
                        .multiply(mesh.color)
                        .to_array(),
                    settings.premultiplied_alpha,
                );

                let base = out.vertices.len() as u32;
                for (i, &[x, y]) in mesh.vertices.iter().enumerate() {
                    let world = [
                        bone.a * x + bone.b * y + bone.world_x,
                        bone.c * x + bone.d * y + bone.world_y,
                    ];
                    let uv = mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]);
                    out.vertices.push(Vertex {
                        position: to_view(world),
                        uv: map_mesh_uv(uv, region),
                        color,
                    });
                }

                let first_index = out.indices.len();
                for &index in &mesh.triangles {
                    out.indices.push(base + index);
                }
                push_draw(out, &page.name, slot.blend, first_index, mesh.triangles.len());
            }
        }
    }
}

fn push_draw(
    out: &mut DrawList,
    texture: &str,
    blend: BlendMode,
    first_index: usize,
    index_count: usize,
) {
    if let Some(last) = out.draws.last_mut() {
        let expected = last.first_index + last.index_count;
        if last.texture == texture && last.blend == blend && expected == first_index {
            last.index_count += index_count;
            return;
        }
    }

    out.draws.push(Draw {
        texture: texture.to_string(),
        blend,
        first_index,
        index_count,
    });
}

/// UVs for the four corners produced by `compute_world_vertices`
/// (BL, BR, TR, TL). Rotated regions are packed turned 90 degrees, so their
/// UV corners walk the rect starting one corner over.
fn region_quad_uvs(region: &TextureRegion) -> [[f32; 2]; 4] {
    let TextureRegion { u, v, u2, v2, .. } = *region;
    if region.rotate {
        [[u2, v2], [u2, v], [u, v], [u, v2]]
    } else {
        [[u, v2], [u2, v2], [u2, v], [u, v]]
    }
}

/// Maps a mesh UV (unit square over the logical region) into the region's
/// page UV rect, accounting for rotated packing.
fn map_mesh_uv([mu, mv]: [f32; 2], region: &TextureRegion) -> [f32; 2] {
    let TextureRegion { u, v, u2, v2, .. } = *region;
    if region.rotate {
        [u + mv * (u2 - u), v + (1.0 - mu) * (v2 - v)]
    } else {
        [u + mu * (u2 - u), v + mv * (v2 - v)]
    }
}

fn apply_pma(mut color: [f32; 4], premultiplied_alpha: bool) -> [f32; 4] {
    if premultiplied_alpha {
        let a = color[3];
        color[0] *= a;
        color[1] *= a;
        color[2] *= a;
    }
    color
}
