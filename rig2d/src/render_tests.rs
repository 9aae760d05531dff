use crate::{
    Atlas, Attachment, BlendMode, BoneData, Color, Inherit, MeshAttachment, RegionAttachment,
    RenderSettings, Skeleton, SkeletonData, SkinData, SlotData, build_draw_list,
};
use std::collections::HashMap;
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn test_atlas() -> Atlas {
    Atlas::parse(
        r#"
page.png
size: 100,100

head
  rotate: false
  xy: 0, 0
  size: 10, 20
arm
  rotate: true
  xy: 50, 50
  size: 10, 20
"#,
    )
    .unwrap()
}

fn region(path: &str, width: f32, height: f32) -> Attachment {
    Attachment::Region(RegionAttachment {
        name: path.to_string(),
        path: path.to_string(),
        x: 0.0,
        y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        rotation: 0.0,
        width,
        height,
        color: Color::WHITE,
        region_rotate: false,
    })
}

fn skeleton_with_slots(slots: Vec<(&str, Attachment)>) -> Skeleton {
    let mut attachments = Vec::new();
    let mut slot_data = Vec::new();
    for (name, attachment) in slots {
        let mut map = HashMap::new();
        map.insert(name.to_string(), attachment);
        attachments.push(map);
        slot_data.push(SlotData {
            name: format!("slot-{name}"),
            bone: 0,
            attachment: Some(name.to_string()),
            color: Color::WHITE,
            blend: BlendMode::Normal,
        });
    }

    let data = Arc::new(SkeletonData {
        bones: vec![BoneData {
            name: "root".to_string(),
            parent: None,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            inherit: Inherit::Normal,
        }],
        slots: slot_data,
        skins: HashMap::from([(
            "default".to_string(),
            SkinData {
                name: "default".to_string(),
                attachments,
            },
        )]),
        ..SkeletonData::default()
    });

    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();
    skeleton
}

#[test]
fn region_quad_positions_uvs_and_indices() {
    let atlas = test_atlas();
    let skeleton = skeleton_with_slots(vec![("head", region("head", 4.0, 2.0))]);
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    assert_eq!(list.vertices.len(), 4);
    assert_eq!(list.indices, vec![0, 1, 2, 2, 3, 0]);

    // BL, BR, TR, TL.
    let positions: Vec<[f32; 2]> = list.vertices.iter().map(|v| v.position).collect();
    assert_approx(positions[0][0], -2.0);
    assert_approx(positions[0][1], -1.0);
    assert_approx(positions[1][0], 2.0);
    assert_approx(positions[1][1], -1.0);
    assert_approx(positions[2][0], 2.0);
    assert_approx(positions[2][1], 1.0);
    assert_approx(positions[3][0], -2.0);
    assert_approx(positions[3][1], 1.0);

    let uvs: Vec<[f32; 2]> = list.vertices.iter().map(|v| v.uv).collect();
    assert_eq!(uvs[0], [0.0, 0.2]);
    assert_eq!(uvs[1], [0.1, 0.2]);
    assert_eq!(uvs[2], [0.1, 0.0]);
    assert_eq!(uvs[3], [0.0, 0.0]);

    assert_eq!(list.draws.len(), 1);
    assert_eq!(list.draws[0].texture, "page.png");
    assert_eq!(list.draws[0].blend, BlendMode::Normal);
    assert_eq!(list.draws[0].first_index, 0);
    assert_eq!(list.draws[0].index_count, 6);
}

#[test]
fn rotated_region_uses_turned_uv_corners() {
    let atlas = test_atlas();
    let mut attachment = region("arm", 4.0, 2.0);
    if let Attachment::Region(region) = &mut attachment {
        region.region_rotate = true;
    }
    let skeleton = skeleton_with_slots(vec![("arm", attachment)]);
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    let uvs: Vec<[f32; 2]> = list.vertices.iter().map(|v| v.uv).collect();
    assert_eq!(uvs[0], [0.7, 0.6]);
    assert_eq!(uvs[1], [0.7, 0.5]);
    assert_eq!(uvs[2], [0.5, 0.5]);
    assert_eq!(uvs[3], [0.5, 0.6]);
}

#[test]
fn settings_scale_offset_and_flip_transform_positions() {
    let atlas = test_atlas();
    let skeleton = skeleton_with_slots(vec![("head", region("head", 4.0, 2.0))]);
    let settings = RenderSettings {
        scale: 2.0,
        offset_x: 1.0,
        flip_y: true,
        ..RenderSettings::default()
    };
    let list = build_draw_list(&skeleton, &atlas, &settings);

    // BL world (-2, -1): x = (-2 + 1) * 2, y = -1 * -2.
    assert_approx(list.vertices[0].position[0], -2.0);
    assert_approx(list.vertices[0].position[1], 2.0);
    // TR world (2, 1): x = (2 + 1) * 2, y = 1 * -2.
    assert_approx(list.vertices[2].position[0], 6.0);
    assert_approx(list.vertices[2].position[1], -2.0);
}

#[test]
fn inactive_and_empty_slots_produce_nothing() {
    let atlas = test_atlas();

    let mut skeleton = skeleton_with_slots(vec![("head", region("head", 4.0, 2.0))]);
    skeleton.slots[0].active = false;
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());
    assert!(list.vertices.is_empty());
    assert!(list.draws.is_empty());

    let mut skeleton = skeleton_with_slots(vec![("head", region("head", 4.0, 2.0))]);
    skeleton.slots[0].attachment = None;
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());
    assert!(list.vertices.is_empty());

    let mut skeleton = skeleton_with_slots(vec![("head", region("head", 4.0, 2.0))]);
    skeleton.bones[0].active = false;
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());
    assert!(list.vertices.is_empty());
}

#[test]
fn missing_atlas_region_skips_the_slot_without_error() {
    let atlas = test_atlas();
    let skeleton = skeleton_with_slots(vec![
        ("ghost", region("not-in-atlas", 4.0, 2.0)),
        ("head", region("head", 4.0, 2.0)),
    ]);
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    assert_eq!(list.vertices.len(), 4);
    assert_eq!(list.draws.len(), 1);
}

#[test]
fn consecutive_draws_with_same_texture_and_blend_merge() {
    let atlas = test_atlas();
    let skeleton = skeleton_with_slots(vec![
        ("head", region("head", 4.0, 2.0)),
        ("arm", region("arm", 4.0, 2.0)),
    ]);
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    assert_eq!(list.vertices.len(), 8);
    assert_eq!(list.indices.len(), 12);
    assert_eq!(list.draws.len(), 1);
    assert_eq!(list.draws[0].index_count, 12);
}

#[test]
fn blend_mode_change_splits_the_batch() {
    let atlas = test_atlas();
    let mut skeleton = skeleton_with_slots(vec![
        ("head", region("head", 4.0, 2.0)),
        ("arm", region("arm", 4.0, 2.0)),
    ]);
    skeleton.slots[1].blend = BlendMode::Additive;
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    assert_eq!(list.draws.len(), 2);
    assert_eq!(list.draws[0].blend, BlendMode::Normal);
    assert_eq!(list.draws[1].blend, BlendMode::Additive);
    assert_eq!(list.draws[1].first_index, 6);
}

#[test]
fn mesh_attachment_maps_uvs_into_region_rect() {
    let atlas = test_atlas();
    let mesh = Attachment::Mesh(MeshAttachment {
        name: "cloth".to_string(),
        path: "head".to_string(),
        color: Color::WHITE,
        uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
        vertices: vec![[0.0, 0.0], [4.0, 0.0], [4.0, 2.0]],
        triangles: vec![0, 1, 2],
    });
    let skeleton = skeleton_with_slots(vec![("cloth", mesh)]);
    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    assert_eq!(list.vertices.len(), 3);
    assert_eq!(list.indices, vec![0, 1, 2]);
    assert_eq!(list.vertices[0].uv, [0.0, 0.0]);
    assert_eq!(list.vertices[1].uv, [0.1, 0.0]);
    assert_eq!(list.vertices[2].uv, [0.1, 0.2]);
    assert_approx(list.vertices[2].position[0], 4.0);
    assert_approx(list.vertices[2].position[1], 2.0);
    assert_eq!(list.draws.len(), 1);
    assert_eq!(list.draws[0].index_count, 3);
}

#[test]
fn tint_multiplies_skeleton_slot_and_attachment_colors() {
    let atlas = test_atlas();
    let mut attachment = region("head", 4.0, 2.0);
    if let Attachment::Region(region) = &mut attachment {
        region.color = Color {
            r: 1.0,
            g: 1.0,
            b: 0.5,
            a: 1.0,
        };
    }
    let mut skeleton = skeleton_with_slots(vec![("head", attachment)]);
    skeleton.color = Color {
        r: 0.5,
        g: 1.0,
        b: 1.0,
        a: 0.5,
    };
    skeleton.slots[0].color = Color {
        r: 1.0,
        g: 0.5,
        b: 1.0,
        a: 1.0,
    };

    let list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());
    assert_eq!(list.vertices[0].color, [0.5, 0.5, 0.5, 0.5]);

    let settings = RenderSettings {
        premultiplied_alpha: true,
        ..RenderSettings::default()
    };
    let list = build_draw_list(&skeleton, &atlas, &settings);
    assert_eq!(list.vertices[0].color, [0.25, 0.25, 0.25, 0.5]);
}
