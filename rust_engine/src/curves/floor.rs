//! 脚部不穿地修正

use glam::{Mat4, Vec3};

use super::range::FrameRange;
use crate::animation::{Action, InsertMode};
use crate::math::{translation_of, with_translation};
use crate::skeleton::{world_to_basis, CanonicalRole, PoseEvaluator, Skeleton};

fn is_foot(role: &CanonicalRole) -> bool {
    matches!(role, CanonicalRole::Foot(_) | CanonicalRole::Toe(_))
}

/// 每帧脚与脚趾尾部的最低点低于 `floor_z` 时抬高髋部；返回修正的帧数
pub fn keep_above_floor(skeleton: &Skeleton, action: &mut Action, floor_z: f32, range: Option<FrameRange>) -> usize {
    let Some(hips) = skeleton
        .find_role(&CanonicalRole::Hips)
        .or_else(|| skeleton.roots().first().copied())
    else {
        return 0;
    };
    let feet: Vec<usize> = (0..skeleton.len())
        .filter(|&i| skeleton.bone(i).role.as_ref().is_some_and(is_foot))
        .collect();
    if feet.is_empty() {
        log::warn!("骨架 {} 没有脚部角色，跳过地面修正", skeleton.name);
        return 0;
    }
    let Some(range) = range.or_else(|| FrameRange::of_action(action)) else {
        return 0;
    };

    let evaluator = PoseEvaluator::new();
    let hips_name = skeleton.bone(hips).name.clone();
    let mut raised = Vec::new();
    for frame in range.integer_frames() {
        let frame = frame as f32;
        let pose = evaluator.evaluate(skeleton, action, frame);
        let lowest = feet
            .iter()
            .map(|&i| {
                let tail = Vec3::new(0.0, skeleton.bone(i).length, 0.0);
                pose.world[i].transform_point3(tail).z
            })
            .fold(f32::MAX, f32::min);
        if lowest >= floor_z {
            continue;
        }
        let world: Mat4 = pose.world[hips];
        let lifted = with_translation(world, translation_of(&world) + Vec3::Z * (floor_z - lowest));
        let parent = skeleton.bone(hips).parent.map(|p| pose.world[p]);
        let basis = world_to_basis(skeleton, hips, &lifted, parent.as_ref());
        raised.push((frame, translation_of(&basis)));
    }
    for (frame, location) in &raised {
        action.insert_location(&hips_name, *frame, *location, InsertMode::Replace);
    }
    if !raised.is_empty() {
        log::info!("地面修正：{} 帧抬高 {}", raised.len(), hips_name);
    }
    raised.len()
}
