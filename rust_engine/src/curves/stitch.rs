//! 两段动作拼接
//!
//! 第二段整体平移 `F₁ − F₂ − δ` 帧；`(F₁−δ, F₁)` 之间对两段的局部姿态矩阵线性混合，
//! 再正交化并施加锁定与限制。

use glam::{Mat4, Vec3};

use crate::animation::{Action, ChannelKind, InsertMode};
use crate::config::StitchConfig;
use crate::math::{orthonormalize, rotation_part, translation_of, with_translation};
use crate::retarget::BoneCorrection;
use crate::skeleton::{PoseEvaluator, Skeleton};
use crate::{MocapError, Result};

/// 线性混合两个局部姿态，旋转部分重新正交化
pub fn blend_basis(a: &Mat4, b: &Mat4, eps: f32) -> Mat4 {
    let mixed = *a * (1.0 - eps) + *b * eps;
    let rotation = orthonormalize(rotation_part(&mixed));
    with_translation(Mat4::from_mat3(rotation), translation_of(&mixed))
}

/// 拼接 `first`（到 `first_end` 为止）与 `second`（从 `second_start` 开始）
pub fn stitch_actions(
    skeleton: &Skeleton,
    first: &Action,
    second: &Action,
    first_end: f32,
    second_start: f32,
    config: &StitchConfig,
) -> Result<Action> {
    let (Some((start, _)), Some((_, second_last))) = (first.frame_range(), second.frame_range()) else {
        return Err(MocapError::DegenerateGeometry(format!(
            "cannot stitch {} and {}: empty action",
            first.name, second.name
        )));
    };
    let delta = config.blend_range as f32;
    let shift = first_end - second_start - delta;
    let end = second_last + shift;

    let mut out = Action::new(format!("{}_{}", first.name, second.name));
    for index in 0..skeleton.len() {
        let bone = skeleton.bone(index);
        let keyed = |action: &Action| ChannelKind::ALL.iter().any(|&k| action.has_channel(&bone.name, k));
        if !keyed(first) && !keyed(second) {
            continue;
        }
        let with_location = first.has_channel(&bone.name, ChannelKind::Location)
            || second.has_channel(&bone.name, ChannelKind::Location);
        let correction = BoneCorrection::for_bone(bone, true, true);

        // 第二段的根位置接续第一段混合起点
        let offset = if config.match_location && bone.parent.is_none() {
            let a = PoseEvaluator::bone_basis(skeleton, first, index, first_end - delta);
            let b = PoseEvaluator::bone_basis(skeleton, second, index, second_start);
            translation_of(&a) - translation_of(&b)
        } else {
            Vec3::ZERO
        };
        let second_at = |frame: f32| {
            let m = PoseEvaluator::bone_basis(skeleton, second, index, frame - shift);
            with_translation(m, translation_of(&m) + offset)
        };

        let mut frame = start.ceil();
        while frame <= end + 1e-4 {
            let basis = if frame <= first_end - delta {
                PoseEvaluator::bone_basis(skeleton, first, index, frame)
            } else if frame >= first_end {
                second_at(frame)
            } else {
                let eps = (frame - first_end + delta) / delta;
                let a = PoseEvaluator::bone_basis(skeleton, first, index, frame);
                blend_basis(&a, &second_at(frame), eps)
            };
            let basis = match &correction {
                Some(c) => c.apply(&basis),
                None => basis,
            };
            out.insert_basis(bone, frame, &basis, with_location, InsertMode::Fast);
            frame += 1.0;
        }
    }
    out.resort();
    log::info!(
        "拼接 {} 与 {}：第二段平移 {} 帧，共 {} 帧",
        first.name,
        second.name,
        shift,
        (end - start.ceil()).max(0.0) as i32 + 1
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::test_chain;
    use glam::Quat;

    fn walk(name: &str, frames: std::ops::RangeInclusive<i32>, base: f32, spin: f32) -> Action {
        let mut action = Action::new(name);
        for frame in frames {
            let f = frame as f32;
            action.insert_location("root", f, Vec3::new(base + f, 0.0, 0.0), InsertMode::Replace);
            action.insert_quaternion("root", f, Quat::from_rotation_z(spin * f), InsertMode::Replace);
        }
        action
    }

    #[test]
    fn test_stitch_blends_over_window() {
        let sk = test_chain();
        let first = walk("a", 0..=20, 0.0, 0.01);
        let second = walk("b", 5..=25, 100.0, 0.02);
        let config = StitchConfig {
            blend_range: 4,
            match_location: false,
        };
        let out = stitch_actions(&sk, &first, &second, 20.0, 5.0, &config).unwrap();
        assert_eq!(out.name, "a_b");
        assert_eq!(out.frame_range(), Some((0.0, 36.0)));

        let loc = |f: f32| out.evaluate_location("root", f).unwrap();
        let rot = |f: f32| out.evaluate_quaternion("root", f).unwrap();
        assert!(loc(15.0).abs_diff_eq(Vec3::new(15.0, 0.0, 0.0), 1e-4));
        assert!(rot(15.0).angle_between(Quat::from_rotation_z(0.15)) < 1e-4);
        // ε = 1：第二段第 9 帧
        assert!(loc(20.0).abs_diff_eq(Vec3::new(109.0, 0.0, 0.0), 1e-4));
        assert!(rot(20.0).angle_between(Quat::from_rotation_z(0.18)) < 1e-4);
        // ε = 0.5：第一段第 18 帧与第二段第 7 帧各半
        assert!(loc(18.0).abs_diff_eq(Vec3::new(62.5, 0.0, 0.0), 1e-4));
        assert!(rot(18.0).angle_between(Quat::from_rotation_z(0.16)) < 1e-4);
    }

    #[test]
    fn test_match_location_continues_root() {
        let sk = test_chain();
        let first = walk("a", 0..=20, 0.0, 0.0);
        let second = walk("b", 5..=25, 100.0, 0.0);
        let out = stitch_actions(&sk, &first, &second, 20.0, 5.0, &StitchConfig {
            blend_range: 4,
            match_location: true,
        })
        .unwrap();
        // 第二段从第一段第 16 帧的位置接续
        let x16 = out.evaluate_location("root", 16.0).unwrap().x;
        let x17 = out.evaluate_location("root", 17.0).unwrap().x;
        assert!((x16 - 16.0).abs() < 1e-4);
        assert!((x17 - 17.0).abs() < 1e-4);
        assert!((out.evaluate_location("root", 30.0).unwrap().x - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_action_is_degenerate() {
        let sk = test_chain();
        let err = stitch_actions(&sk, &Action::new("a"), &walk("b", 0..=3, 0.0, 0.0), 2.0, 0.0, &StitchConfig::default())
            .unwrap_err();
        assert!(err.is_survivable());
    }
}
