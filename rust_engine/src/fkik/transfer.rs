//! FK 与 IK 互相匹配
//!
//! 每帧先在 `ActionSink` 上求出整体姿态，计算出所有要写入的关键帧后再统一写入动作。

use glam::{Mat3, Mat4, Quat, Vec3};

use super::bend::bend_positive;
use super::chains::{ArmChain, LegChain, RigChains};
use super::pole::pole_target;
use super::reverse_foot::{reverse_foot, MarkerHeads};
use crate::animation::{Action, InsertMode};
use crate::config::FkIkConfig;
use crate::curves::FrameRange;
use crate::math::{rotation_part, translation_of, with_translation};
use crate::retarget::{ActionSink, FrameSink};
use crate::skeleton::{rotation_basis, world_to_basis, Pose, PoseEvaluator, Skeleton};
use crate::Result;

/// 待写入的关键帧
enum PendingKey {
    /// 旋转与位置
    Basis(usize, f32, Mat4),
    Rotation(usize, f32, Quat),
    Location(usize, f32, Vec3),
}

/// `from` 的世界旋转换算到 `to` 时使用的静止姿态差
fn rest_offset(skeleton: &Skeleton, from: usize, to: usize) -> Mat3 {
    skeleton.bone(from).rest_rotation().transpose() * skeleton.bone(to).rest_rotation()
}

fn parent_world(skeleton: &Skeleton, world: &[Mat4], index: usize) -> Option<Mat4> {
    skeleton.bone(index).parent.map(|p| world[p])
}

fn frames_of(action: &Action, range: Option<FrameRange>) -> Vec<f32> {
    range
        .or_else(|| FrameRange::of_action(action))
        .map(|r| r.integer_frames().into_iter().map(|f| f as f32).collect())
        .unwrap_or_default()
}

fn write_keys(skeleton: &Skeleton, action: &mut Action, keys: Vec<PendingKey>) {
    for key in keys {
        match key {
            PendingKey::Basis(i, f, m) => {
                action.insert_basis(skeleton.bone(i), f, &m, true, InsertMode::Fast)
            }
            PendingKey::Rotation(i, f, q) => {
                action.insert_basis(skeleton.bone(i), f, &Mat4::from_quat(q), false, InsertMode::Fast)
            }
            PendingKey::Location(i, f, v) => {
                action.insert_location(&skeleton.bone(i).name, f, v, InsertMode::Fast)
            }
        }
    }
    action.resort();
}

/// 把骨骼放到给定世界位置（旋转不变），返回局部位置
fn pole_location(skeleton: &Skeleton, pose: &Pose, pole: usize, target: Vec3) -> Vec3 {
    let world = with_translation(pose.world[pole], target);
    let parent = parent_world(skeleton, &pose.world, pole);
    translation_of(&world_to_basis(skeleton, pole, &world, parent.as_ref()))
}

/// 绕 Y 轴的扭转分量
fn twist_about_y(q: Quat) -> Quat {
    let twist = Quat::from_xyzw(0.0, q.y, 0.0, q.w);
    if twist.length_squared() < 1e-12 {
        Quat::IDENTITY
    } else {
        twist.normalize()
    }
}

fn arm_fk_to_ik(skeleton: &Skeleton, pose: &Pose, arm: &ArmChain, config: &FkIkConfig, frame: f32, keys: &mut Vec<PendingKey>) {
    let hand = pose.world[arm.hand_fk];
    let rotation = rotation_part(&hand) * rest_offset(skeleton, arm.hand_fk, arm.hand_ik);
    let world = with_translation(Mat4::from_mat3(rotation), translation_of(&hand));
    let parent = parent_world(skeleton, &pose.world, arm.hand_ik);
    let basis = world_to_basis(skeleton, arm.hand_ik, &world, parent.as_ref());
    keys.push(PendingKey::Basis(arm.hand_ik, frame, basis));

    let distance = config.pole_distance * skeleton.bone(arm.upper_fk).length;
    let target = pole_target(&pose.world[arm.upper_fk], &pose.world[arm.forearm_fk], distance);
    keys.push(PendingKey::Location(arm.pole, frame, pole_location(skeleton, pose, arm.pole, target)));
}

fn leg_fk_to_ik(skeleton: &Skeleton, pose: &Pose, leg: &LegChain, config: &FkIkConfig, frame: f32, keys: &mut Vec<PendingKey>) {
    let world = match (&leg.markers, config.ik_to_ankle) {
        (Some(markers), false) => {
            let head = |i: usize| translation_of(&pose.world[i]);
            let heads = MarkerHeads {
                ball: head(markers.ball),
                toe: head(markers.toe),
                heel: head(markers.heel),
            };
            reverse_foot(
                &pose.world[leg.toe_fk],
                skeleton.bone(leg.toe_fk).length,
                &heads,
                skeleton.bone(leg.leg_ik).length,
            )
        }
        _ => {
            let foot = pose.world[leg.foot_fk];
            let rotation = rotation_part(&foot) * rest_offset(skeleton, leg.foot_fk, leg.leg_ik);
            with_translation(Mat4::from_mat3(rotation), translation_of(&foot))
        }
    };
    let parent = parent_world(skeleton, &pose.world, leg.leg_ik);
    let basis = world_to_basis(skeleton, leg.leg_ik, &world, parent.as_ref());
    keys.push(PendingKey::Basis(leg.leg_ik, frame, basis));

    let distance = config.pole_distance * skeleton.bone(leg.thigh_fk).length;
    let target = pole_target(&pose.world[leg.thigh_fk], &pose.world[leg.shin_fk], distance);
    keys.push(PendingKey::Location(leg.pole, frame, pole_location(skeleton, pose, leg.pole, target)));

    // 小腿 IK 的扭转跟随 FK
    let shin = Quat::from_mat3(&rotation_part(&pose.basis[leg.shin_fk])).normalize();
    keys.push(PendingKey::Rotation(leg.shin_ik, frame, twist_about_y(shin)));
}

/// FK 姿态写入 IK 控制器与极向目标，返回处理的帧数
pub fn fk_to_ik(skeleton: &Skeleton, action: &mut Action, config: &FkIkConfig, range: Option<FrameRange>) -> Result<usize> {
    let chains = RigChains::resolve(skeleton, config).map_err(|e| e.in_category("Transfer FK to IK"))?;
    let frames = frames_of(action, range);
    if frames.is_empty() {
        log::warn!("动作 {} 没有可转换的帧", action.name);
        return Ok(0);
    }

    let mut keys = Vec::new();
    {
        let mut sink = ActionSink::new(skeleton, action, PoseEvaluator::new());
        for &frame in &frames {
            sink.set_frame(frame as i32);
            let pose = sink.pose();
            for arm in &chains.arms {
                arm_fk_to_ik(skeleton, pose, arm, config, frame, &mut keys);
            }
            for leg in &chains.legs {
                leg_fk_to_ik(skeleton, pose, leg, config, frame, &mut keys);
            }
        }
    }
    write_keys(skeleton, action, keys);
    log::info!("FK → IK：{} 帧", frames.len());
    Ok(frames.len())
}

/// 按父子顺序把 IK 骨骼的世界旋转复制到 FK 骨骼
fn match_rotations(skeleton: &Skeleton, pose: &Pose, world: &mut [Mat4], pairs: &[(usize, usize)], frame: f32, keys: &mut Vec<PendingKey>) {
    for &(ik, fk) in pairs {
        let rotation = rotation_part(&pose.world[ik]) * rest_offset(skeleton, ik, fk);
        let parent = parent_world(skeleton, world, fk);
        let q = rotation_basis(skeleton, fk, rotation, parent.as_ref());
        let (scale, _, location) = pose.basis[fk].to_scale_rotation_translation();
        let basis = Mat4::from_scale_rotation_translation(scale, q, location);
        world[fk] = PoseEvaluator::world_matrix(skeleton, fk, &basis, parent.as_ref());
        keys.push(PendingKey::Rotation(fk, frame, q));
    }
}

/// IK 求解结果写回 FK 骨骼，返回处理的帧数
pub fn ik_to_fk(skeleton: &Skeleton, action: &mut Action, config: &FkIkConfig, range: Option<FrameRange>) -> Result<usize> {
    let chains = RigChains::resolve(skeleton, config).map_err(|e| e.in_category("Transfer IK to FK"))?;
    let frames = frames_of(action, range);
    if frames.is_empty() {
        log::warn!("动作 {} 没有可转换的帧", action.name);
        return Ok(0);
    }
    if config.bend_positive {
        bend_positive(skeleton, action, &chains.hinges(), range);
    }

    let mut keys = Vec::new();
    {
        let mut sink = ActionSink::new(skeleton, action, PoseEvaluator::with_ik(true));
        for &frame in &frames {
            sink.set_frame(frame as i32);
            let pose = sink.pose();
            let mut world = pose.world.clone();
            for arm in &chains.arms {
                match_rotations(skeleton, pose, &mut world, &arm.pairs(), frame, &mut keys);
            }
            for leg in &chains.legs {
                let pairs = [
                    (leg.thigh_ik, leg.thigh_fk),
                    (leg.shin_ik, leg.shin_fk),
                    (leg.foot_rev, leg.foot_fk),
                    (leg.toe_rev, leg.toe_fk),
                ];
                match_rotations(skeleton, pose, &mut world, &pairs, frame, &mut keys);
            }
        }
    }
    write_keys(skeleton, action, keys);
    log::info!("IK → FK：{} 帧", frames.len());
    Ok(frames.len())
}
