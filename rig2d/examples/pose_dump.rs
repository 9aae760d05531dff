use rig2d::{Atlas, RenderSettings, Skeleton, SkeletonData, build_draw_list};
use serde_json::json;
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let atlas_path = args
        .first()
        .map(PathBuf::from)
        .expect("usage: pose_dump <atlas> <skeleton.json> [animation]");
    let json_path = args
        .get(1)
        .map(PathBuf::from)
        .expect("usage: pose_dump <atlas> <skeleton.json> [animation]");
    let animation = args.get(2).cloned();

    let atlas = Atlas::load(&atlas_path).expect("parse atlas");
    let data = SkeletonData::from_json_file(&json_path, &atlas).expect("parse skeleton json");

    let mut skeleton = Skeleton::new(data.clone());
    let resolution = animation
        .as_deref()
        .map(|name| skeleton.resolve_animation(name).expect("resolve animation"));
    skeleton.update_world_transform();

    let bones: Vec<_> = skeleton
        .bones
        .iter()
        .enumerate()
        .map(|(i, bone)| {
            let name = skeleton
                .data
                .bones
                .get(i)
                .map(|b| b.name.as_str())
                .unwrap_or("<unknown>");
            json!({
                "i": i,
                "name": name,
                "active": if bone.active { 1 } else { 0 },
                "world": {
                    "a": bone.a, "b": bone.b, "c": bone.c, "d": bone.d,
                    "x": bone.world_x, "y": bone.world_y,
                },
                "rotation": bone.world_rotation(),
            })
        })
        .collect();

    let slots: Vec<_> = skeleton
        .slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let name = skeleton
                .data
                .slots
                .get(i)
                .map(|s| s.name.as_str())
                .unwrap_or("<unknown>");
            json!({
                "i": i,
                "name": name,
                "active": if slot.active { 1 } else { 0 },
                "color": slot.color.to_array(),
                "attachment": slot.attachment,
            })
        })
        .collect();

    let draw_list = build_draw_list(&skeleton, &atlas, &RenderSettings::default());

    let out = json!({
        "animation": animation,
        "resolution": resolution.map(|r| json!({
            "slots": r.slots,
            "attachments": r.attachments,
            "bones": r.bones,
        })),
        "bones": bones,
        "slots": slots,
        "draws": draw_list.draws.len(),
        "vertices": draw_list.vertices.len(),
    });

    println!("{}", serde_json::to_string(&out).expect("json"));
}
