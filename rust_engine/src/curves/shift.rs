//! 整体偏移与位置固定

use glam::Mat4;

use super::range::FrameRange;
use crate::animation::{Action, ChannelKind, InsertMode};
use crate::skeleton::{PoseEvaluator, Skeleton};

/// 以当前姿态与第一个关键帧姿态之差左乘范围内每个关键帧；返回改写的帧数
pub fn shift_bone(
    skeleton: &Skeleton,
    action: &mut Action,
    index: usize,
    current: &Mat4,
    range: Option<FrameRange>,
) -> usize {
    let range = range.unwrap_or_else(FrameRange::all);
    let bone = skeleton.bone(index);
    let frames: Vec<f32> = action
        .keyed_frames(&bone.name)
        .into_iter()
        .filter(|&f| range.contains(f))
        .collect();
    let Some(&first) = frames.first() else {
        return 0;
    };
    let delta = *current * PoseEvaluator::bone_basis(skeleton, action, index, first).inverse();
    let with_location = action.has_channel(&bone.name, ChannelKind::Location);

    let shifted: Vec<(f32, Mat4)> = frames
        .iter()
        .map(|&f| (f, delta * PoseEvaluator::bone_basis(skeleton, action, index, f)))
        .collect();
    for (frame, basis) in &shifted {
        action.insert_basis(bone, *frame, basis, with_location, InsertMode::Replace);
    }
    shifted.len()
}

/// 把选中的位置分量在范围内固定为 `frame` 处的值；返回改写的关键帧数
pub fn fixate_location(
    action: &mut Action,
    bone: &str,
    components: [bool; 3],
    frame: f32,
    range: Option<FrameRange>,
) -> usize {
    let range = range.unwrap_or_else(FrameRange::all);
    let Some(pinned) = action.evaluate_location(bone, frame) else {
        return 0;
    };
    let mut changed = 0;
    for i in (0..3).filter(|&i| components[i]) {
        let Some(curve) = action.fcurve_mut(bone, ChannelKind::Location, i) else {
            continue;
        };
        for key in curve.keyframes_mut().iter_mut().filter(|k| range.contains(k.frame)) {
            key.value = pinned[i];
            key.handle_left = None;
            key.handle_right = None;
            changed += 1;
        }
    }
    changed
}
