//! 关键帧简化
//!
//! 有界误差折线简化：从首尾两帧开始，反复在每个保留区间内找出与线性插值
//! 偏差最大的关键帧，超过容差就加入保留集，直到不再增加。

use std::f32::consts::PI;

use super::range::FrameRange;
use crate::animation::{Action, ChannelKind, FCurve, Keyframe};
use crate::config::SimplifyConfig;

/// 每种通道的容差
pub fn channel_tolerance(kind: ChannelKind, config: &SimplifyConfig) -> f32 {
    match kind {
        ChannelKind::Location | ChannelKind::Scale => config.max_err_loc,
        ChannelKind::RotationEuler => config.max_err_rot * PI / 180.0,
        ChannelKind::RotationQuaternion => config.max_err_rot / 180.0,
    }
}

/// 需要保留的关键帧下标（升序）
pub fn keep_indices(keys: &[Keyframe], tolerance: f32) -> Vec<usize> {
    let n = keys.len();
    if n <= 2 {
        return (0..n).collect();
    }
    let mut keep = vec![0, n - 1];
    loop {
        let mut added = Vec::new();
        for pair in keep.windows(2) {
            let (i, j) = (pair[0], pair[1]);
            if let Some((index, deviation)) = max_deviation(keys, i, j) {
                if deviation > tolerance {
                    added.push(index);
                }
            }
        }
        if added.is_empty() {
            break;
        }
        keep.extend(added);
        keep.sort_unstable();
    }
    keep
}

/// (i, j) 之间偏离直线最远的关键帧
fn max_deviation(keys: &[Keyframe], i: usize, j: usize) -> Option<(usize, f32)> {
    let (a, b) = (&keys[i], &keys[j]);
    let span = b.frame - a.frame;
    (i + 1..j)
        .map(|k| {
            let t = if span.abs() < f32::EPSILON {
                0.0
            } else {
                (keys[k].frame - a.frame) / span
            };
            let line = a.value + (b.value - a.value) * t;
            (k, (keys[k].value - line).abs())
        })
        .max_by(|x, y| x.1.total_cmp(&y.1))
}

/// 简化一条曲线，范围外的关键帧原样保留；返回删除的关键帧数
pub fn simplify_curve(curve: &mut FCurve, tolerance: f32, range: FrameRange) -> usize {
    if curve.needs_resort() {
        curve.resort();
    }
    let (before, inside, after) = range.split(curve.keyframes());
    let keep = keep_indices(inside, tolerance);
    let removed = inside.len() - keep.len();
    if removed == 0 {
        return 0;
    }
    let mut keys = Vec::with_capacity(before.len() + keep.len() + after.len());
    keys.extend_from_slice(before);
    keys.extend(keep.iter().map(|&i| inside[i]));
    keys.extend_from_slice(after);
    curve.set_keyframes(keys);
    removed
}

/// 简化动作的所有曲线
pub fn simplify_action(action: &mut Action, config: &SimplifyConfig, range: Option<FrameRange>) -> usize {
    let range = range.unwrap_or_else(FrameRange::all);
    let mut removed = 0;
    for curve in action.fcurves_mut() {
        let Some(kind) = curve.channel() else { continue };
        removed += simplify_curve(curve, channel_tolerance(kind, config), range);
    }
    log::info!("简化动作 {}: 删除 {} 个关键帧", action.name, removed);
    removed
}
