//! 关节正向弯曲
//!
//! 肘、膝的 X 旋转为负时改为第 0 帧的值，使 IK 求解的弯曲方向一致。

use glam::Mat3;

use crate::animation::{Action, ChannelKind, InsertMode};
use crate::curves::FrameRange;
use crate::math::{euler_from_matrix, quat_from_euler, RotationOrder};
use crate::skeleton::Skeleton;

/// 返回改写的关键帧数
pub fn bend_positive(skeleton: &Skeleton, action: &mut Action, bones: &[usize], range: Option<FrameRange>) -> usize {
    let range = range.unwrap_or_else(FrameRange::all);
    let mut changed = 0;
    for &index in bones {
        let name = skeleton.bone(index).name.clone();
        if let Some(curve) = action.fcurve_mut(&name, ChannelKind::RotationEuler, 0) {
            let rest = curve.evaluate(0.0);
            for key in curve.keyframes_mut().iter_mut() {
                if range.contains(key.frame) && key.value < 0.0 {
                    key.value = rest;
                    changed += 1;
                }
            }
            continue;
        }

        let euler_at = |action: &Action, frame: f32| {
            action
                .evaluate_quaternion(&name, frame)
                .map(|q| euler_from_matrix(&Mat3::from_quat(q), RotationOrder::XYZ))
        };
        let Some(rest) = euler_at(&*action, 0.0) else {
            continue;
        };
        let mut fixed = Vec::new();
        for frame in action.keyed_frames(&name).into_iter().filter(|&f| range.contains(f)) {
            if let Some(mut euler) = euler_at(&*action, frame) {
                if euler.x < 0.0 {
                    euler.x = rest.x;
                    fixed.push((frame, quat_from_euler(euler, RotationOrder::XYZ)));
                }
            }
        }
        for (frame, q) in &fixed {
            action.insert_quaternion(&name, *frame, *q, InsertMode::Replace);
        }
        changed += fixed.len();
    }
    if changed > 0 {
        log::debug!("正向弯曲：改写 {} 个关键帧", changed);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Bone, Skeleton};
    use glam::{Quat, Vec3};

    fn rig() -> Skeleton {
        let mut sk = Skeleton::new("rig");
        sk.add_bone(
            Bone::new("elbow", Vec3::ZERO, Vec3::Y, 0.0).with_rotation_order(RotationOrder::XYZ),
            None,
        )
        .unwrap();
        sk.add_bone(Bone::new("knee", Vec3::ZERO, -Vec3::Z, 0.0), None).unwrap();
        sk
    }

    #[test]
    fn test_negative_x_reset_to_rest() {
        let sk = rig();
        let mut action = Action::new("a");
        for (f, x) in [(0.0, 0.1), (1.0, -0.2), (2.0, 0.3)] {
            action.insert_euler("elbow", f, Vec3::new(x, 0.0, 0.0), InsertMode::Replace);
        }
        for (f, x) in [(0.0, 0.0), (1.0, -0.4), (2.0, 0.5)] {
            action.insert_quaternion("knee", f, Quat::from_rotation_x(x), InsertMode::Replace);
        }
        assert_eq!(bend_positive(&sk, &mut action, &[0, 1], None), 2);

        let x = action.fcurve("elbow", ChannelKind::RotationEuler, 0).unwrap();
        assert!((x.evaluate(1.0) - 0.1).abs() < 1e-6);
        assert!((x.evaluate(2.0) - 0.3).abs() < 1e-6);
        let q1 = action.evaluate_quaternion("knee", 1.0).unwrap();
        assert!(q1.angle_between(Quat::IDENTITY) < 1e-5);
        let q2 = action.evaluate_quaternion("knee", 2.0).unwrap();
        assert!(q2.angle_between(Quat::from_rotation_x(0.5)) < 1e-5);
    }

    #[test]
    fn test_range_limits_changes() {
        let sk = rig();
        let mut action = Action::new("a");
        for (f, x) in [(0.0, 0.0), (1.0, -0.2), (5.0, -0.3)] {
            action.insert_euler("elbow", f, Vec3::new(x, 0.0, 0.0), InsertMode::Replace);
        }
        assert_eq!(bend_positive(&sk, &mut action, &[0], Some(FrameRange::new(3.0, 6.0))), 1);
        let x = action.fcurve("elbow", ChannelKind::RotationEuler, 0).unwrap();
        assert!((x.evaluate(1.0) + 0.2).abs() < 1e-6);
    }
}
