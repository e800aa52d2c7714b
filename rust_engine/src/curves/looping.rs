//! 循环与重复
//!
//! 循环：在 t₀ 与 tₙ 两侧各取 δ 帧的对称窗口，对每个偏移 e ∈ [−δ, δ]
//! 混合 `p = v(t₀+e)` 与 `q = v(tₙ+e) − dv`，权重 `w = (1 + e/δ) / 2`，
//! 两侧写入同一个混合值（tₙ 一侧加回 dv），首尾因此无缝衔接。
//! 窗口外侧再用 δ 帧把与原曲线的差值线性收回到零，动作中的范围不会在窗口边缘跳变。

use std::f32::consts::{PI, TAU};

use super::range::FrameRange;
use crate::animation::{Action, ChannelKind, InsertMode, Keyframe, FRAME_EPSILON};
use crate::config::LoopConfig;
use crate::math::{translation_of, with_translation};
use crate::skeleton::{world_to_basis, PoseEvaluator, Skeleton};

type Values = [f32; 4];

fn sample(action: &Action, bone: &str, kind: ChannelKind, frame: f32) -> Values {
    let mut v = [0.0; 4];
    for (i, value) in v.iter_mut().enumerate().take(kind.components()) {
        *value = action
            .fcurve(bone, kind, i)
            .and_then(|c| c.evaluate_opt(frame))
            .unwrap_or_else(|| kind.default_value(i));
    }
    v
}

/// 把 `q` 调整到与 `p` 同一分支：欧拉角取最近的 2π 倍数，四元数取同一半球
fn align_branch(kind: ChannelKind, p: &Values, q: &mut Values) {
    match kind {
        ChannelKind::RotationEuler => {
            for i in 0..3 {
                q[i] += TAU * ((p[i] - q[i]) / TAU).round();
            }
        }
        ChannelKind::RotationQuaternion => {
            let dot: f32 = p.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
            if dot < 0.0 {
                q.iter_mut().for_each(|v| *v = -*v);
            }
        }
        _ => {}
    }
}

/// 首尾之差，只对位置曲线非零
fn loop_offset(kind: ChannelKind, first: &Values, last: &Values) -> Values {
    let mut dv = [0.0; 4];
    if kind == ChannelKind::Location {
        for i in 0..3 {
            dv[i] = last[i] - first[i];
        }
    }
    dv
}

fn channel_groups(action: &Action, filter: impl Fn(ChannelKind) -> bool) -> Vec<(String, ChannelKind)> {
    let mut groups: Vec<(String, ChannelKind)> = Vec::new();
    for curve in action.fcurves() {
        let (Some(bone), Some(kind)) = (curve.bone_name(), curve.channel()) else {
            continue;
        };
        if filter(kind) && !groups.iter().any(|(b, k)| b == bone && *k == kind) {
            groups.push((bone.to_string(), kind));
        }
    }
    groups
}

fn loop_channel(action: &mut Action, bone: &str, kind: ChannelKind, range: FrameRange, delta: i32, bounds: (f32, f32)) {
    let (t0, tn) = (range.min, range.max);
    let d = delta as f32;
    let dv = loop_offset(
        kind,
        &sample(action, bone, kind, t0),
        &sample(action, bone, kind, tn),
    );

    let mut keys = Vec::with_capacity(4 * delta as usize + 2);
    let mut edges = ([0.0; 4], [0.0; 4]);
    for e in -delta..=delta {
        let e = e as f32;
        let p = sample(action, bone, kind, t0 + e);
        let mut q = sample(action, bone, kind, tn + e);
        for i in 0..4 {
            q[i] -= dv[i];
        }
        align_branch(kind, &p, &mut q);
        let w = 0.5 * (1.0 + e / d);
        let mut g = [0.0; 4];
        for i in 0..4 {
            g[i] = w * p[i] + (1.0 - w) * q[i];
        }
        keys.push((t0 + e, g));
        let mut shifted = g;
        for i in 0..4 {
            shifted[i] += dv[i];
        }
        keys.push((tn + e, shifted));
        if e == -d {
            edges.0 = g;
        }
        if e == d {
            edges.1 = shifted;
        }
    }

    // 窗口外侧：原值加上按距离衰减的边缘差值
    let mut taper = |edge: f32, written: &Values, step: f32| {
        let original = sample(action, bone, kind, edge);
        for j in 1..=delta {
            let frame = edge + step * j as f32;
            if frame < bounds.0 || frame > bounds.1 {
                break;
            }
            let fade = 1.0 - j as f32 / (d + 1.0);
            let mut v = sample(action, bone, kind, frame);
            for i in 0..4 {
                v[i] += (written[i] - original[i]) * fade;
            }
            keys.push((frame, v));
        }
    };
    taper(t0 - d, &edges.0, -1.0);
    taper(tn + d, &edges.1, 1.0);

    for i in 0..kind.components() {
        let curve = action.ensure_fcurve(bone, kind, i);
        curve.remove_range(t0 - d, t0 + d);
        curve.remove_range(tn - d, tn + d);
        for (frame, v) in &keys {
            curve.insert(*frame, v[i], InsertMode::Fast);
        }
        curve.resort();
    }
}

/// 去掉位置曲线的线性漂移，使首尾帧的骨骼头部重合
pub fn loop_in_place(skeleton: &Skeleton, action: &mut Action, range: FrameRange) -> usize {
    let span = range.length();
    if span <= 0.0 {
        return 0;
    }
    let evaluator = PoseEvaluator::new();
    let mut corrected = 0;
    for &index in skeleton.sorted_indices() {
        let name = skeleton.bone(index).name.clone();
        if !action.has_channel(&name, ChannelKind::Location) {
            continue;
        }
        let head_at = |action: &Action, frame: f32| {
            translation_of(&evaluator.evaluate(skeleton, action, frame).world[index])
        };
        let drift = head_at(&*action, range.max) - head_at(&*action, range.min);
        let frames: Vec<f32> = action
            .keyed_frames(&name)
            .into_iter()
            .filter(|&f| range.contains(f))
            .collect();

        let mut locations = Vec::with_capacity(frames.len());
        for &frame in &frames {
            let pose = evaluator.evaluate(skeleton, action, frame);
            let world = pose.world[index];
            let head = translation_of(&world) - drift * (frame - range.min) / span;
            let parent = skeleton.bone(index).parent.map(|p| pose.world[p]);
            let basis = world_to_basis(skeleton, index, &with_translation(world, head), parent.as_ref());
            locations.push((frame, translation_of(&basis)));
        }
        for (frame, location) in locations {
            action.insert_location(&name, frame, location, InsertMode::Replace);
        }
        corrected += 1;
        log::debug!("骨骼 {} 去除漂移 {:?}", name, drift);
    }
    corrected
}

/// 首尾混合使动作可循环，返回处理的通道数
pub fn loop_action(skeleton: &Skeleton, action: &mut Action, config: &LoopConfig, range: Option<FrameRange>) -> usize {
    let Some(range) = range.or_else(|| FrameRange::of_action(action)) else {
        log::warn!("动作 {} 没有关键帧，跳过循环", action.name);
        return 0;
    };
    let delta = config.blend_range as i32;
    if delta < 1 || range.length() < 2.0 * delta as f32 {
        log::warn!(
            "循环范围 [{}, {}] 不足以容纳混合宽度 {}",
            range.min,
            range.max,
            delta
        );
        return 0;
    }

    if config.loop_in_place {
        loop_in_place(skeleton, action, range);
    }
    let bounds = action.frame_range().unwrap_or((range.min, range.max));

    let groups = channel_groups(action, |kind| match kind {
        ChannelKind::Location => config.loop_loc,
        ChannelKind::RotationQuaternion | ChannelKind::RotationEuler => config.loop_rot,
        ChannelKind::Scale => false,
    });
    for (bone, kind) in &groups {
        loop_channel(action, bone, *kind, range, delta, bounds);
    }
    log::info!("循环动作 {}: {} 个通道", action.name, groups.len());
    groups.len()
}

/// 重复 `count` 次，位置与欧拉角按首尾差逐次累加；返回新增的关键帧数
pub fn repeat_action(action: &mut Action, count: u32, range: Option<FrameRange>) -> usize {
    let Some(range) = range.or_else(|| FrameRange::of_action(action)) else {
        return 0;
    };
    let dt = range.length();
    if count < 2 || dt <= 0.0 {
        return 0;
    }
    let end = range.max + (count - 1) as f32 * dt;
    let mut added = 0;
    for curve in action.fcurves_mut() {
        let Some(kind) = curve.channel() else { continue };
        if curve.needs_resort() {
            curve.resort();
        }
        let dv = match kind {
            ChannelKind::Location | ChannelKind::RotationEuler => {
                curve.evaluate(range.max) - curve.evaluate(range.min)
            }
            _ => 0.0,
        };
        let (_, inside, _) = range.split(curve.keyframes());
        let at = |frame: f32| move |k: &Keyframe| (k.frame - frame).abs() <= FRAME_EPSILON;
        // tₙ 上已有关键帧时，t₀ 的副本与它重合，由 tₙ 的关键帧接缝
        let seam = inside.iter().any(at(range.max));
        let inside: Vec<Keyframe> = inside
            .iter()
            .filter(|k| !(seam && at(range.min)(*k)))
            .copied()
            .collect();
        curve.remove_range(range.max + 1e-3, end);
        for n in 1..count {
            let (shift, lift) = (n as f32 * dt, n as f32 * dv);
            for key in &inside {
                let mut copy = *key;
                copy.offset(shift, lift);
                curve.insert_key(copy, InsertMode::Fast);
                added += 1;
            }
        }
        curve.resort();
    }
    added
}

/// 欧拉角差值折回 (−π, π]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
