//! 姿态求值器（正向运动学 + 可选 IK）
//!
//! `world(b) = world(parent) · matrix_relative(b) · basis(b)`，根骨骼为 `matrix_rest · basis`。

use glam::{Mat3, Mat4, Quat, Vec3};

use super::armature::Skeleton;
use super::ik_solver::IkSolver;
use crate::animation::Action;
use crate::math::{matrix_from_euler, orthonormalize, rotation_part, RotationOrder};

/// 一帧的姿态
#[derive(Clone, Debug, Default)]
pub struct Pose {
    /// 局部姿态（相对父骨骼与静止姿态）
    pub basis: Vec<Mat4>,
    /// 骨架空间矩阵
    pub world: Vec<Mat4>,
}

impl Pose {
    pub fn rest(skeleton: &Skeleton) -> Self {
        let basis = vec![Mat4::IDENTITY; skeleton.len()];
        let world = PoseEvaluator::fk(skeleton, &basis);
        Self { basis, world }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PoseEvaluator {
    pub solve_ik: bool,
}

impl PoseEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ik(solve_ik: bool) -> Self {
        Self { solve_ik }
    }

    /// 从动作读取单根骨骼的局部姿态；缺失的通道取默认值
    pub fn bone_basis(skeleton: &Skeleton, action: &Action, index: usize, frame: f32) -> Mat4 {
        let bone = skeleton.bone(index);
        let location = action
            .evaluate_location(&bone.name, frame)
            .unwrap_or(Vec3::ZERO);
        let scale = action.evaluate_scale(&bone.name, frame).unwrap_or(Vec3::ONE);
        let rotation = match action.evaluate_quaternion(&bone.name, frame) {
            Some(q) => q,
            None => match action.evaluate_euler(&bone.name, frame) {
                Some(euler) => {
                    let order = if bone.rotation_order.is_euler() {
                        bone.rotation_order
                    } else {
                        RotationOrder::XYZ
                    };
                    Quat::from_mat3(&matrix_from_euler(euler, order)).normalize()
                }
                None => Quat::IDENTITY,
            },
        };
        Mat4::from_scale_rotation_translation(scale, rotation, location)
    }

    pub fn basis_at(skeleton: &Skeleton, action: &Action, frame: f32) -> Vec<Mat4> {
        (0..skeleton.len())
            .map(|i| Self::bone_basis(skeleton, action, i, frame))
            .collect()
    }

    /// 单根骨骼的世界矩阵
    pub fn world_matrix(skeleton: &Skeleton, index: usize, basis: &Mat4, parent_world: Option<&Mat4>) -> Mat4 {
        let bone = skeleton.bone(index);
        match parent_world {
            Some(parent) => *parent * bone.matrix_relative * *basis,
            None => bone.matrix_rest * *basis,
        }
    }

    /// 纯正向运动学
    pub fn fk(skeleton: &Skeleton, basis: &[Mat4]) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; skeleton.len()];
        for &i in skeleton.sorted_indices() {
            let parent = skeleton.bone(i).parent.map(|p| world[p]);
            world[i] = Self::world_matrix(skeleton, i, &basis[i], parent.as_ref());
        }
        world
    }

    /// 由局部姿态求整体姿态；开启 IK 时依次求解各 IK 约束并改写链上的局部旋转
    pub fn evaluate_basis(&self, skeleton: &Skeleton, basis: Vec<Mat4>) -> Pose {
        let mut basis = basis;
        let mut world = Self::fk(skeleton, &basis);
        if self.solve_ik {
            for &i in skeleton.sorted_indices() {
                let Some(solver) = IkSolver::from_bone(skeleton, i) else {
                    continue;
                };
                for (index, rotation) in solver.solve(skeleton, &world) {
                    let parent = skeleton.bone(index).parent.map(|p| world[p]);
                    let (scale, _, location) = basis[index].to_scale_rotation_translation();
                    let head = Self::world_matrix(skeleton, index, &basis[index], parent.as_ref())
                        .w_axis
                        .truncate();
                    let desired = Mat4::from_rotation_translation(rotation, head);
                    let local = world_to_basis(skeleton, index, &desired, parent.as_ref());
                    let local_rot = Quat::from_mat3(&orthonormalize(rotation_part(&local))).normalize();
                    basis[index] = Mat4::from_scale_rotation_translation(scale, local_rot, location);
                    world[index] = Self::world_matrix(skeleton, index, &basis[index], parent.as_ref());
                }
                world = Self::fk(skeleton, &basis);
            }
        }
        Pose { basis, world }
    }

    /// 求动作在某一帧的姿态
    pub fn evaluate(&self, skeleton: &Skeleton, action: &Action, frame: f32) -> Pose {
        self.evaluate_basis(skeleton, Self::basis_at(skeleton, action, frame))
    }
}

/// 世界矩阵转局部姿态：`rest⁻¹ · parentRest · parentWorld⁻¹ · world`
pub fn world_to_basis(skeleton: &Skeleton, index: usize, world: &Mat4, parent_world: Option<&Mat4>) -> Mat4 {
    let bone = skeleton.bone(index);
    match parent_world {
        Some(parent) => bone.matrix_relative.inverse() * parent.inverse() * *world,
        None => bone.matrix_rest.inverse() * *world,
    }
}

/// 只保留旋转的局部姿态
pub fn rotation_basis(skeleton: &Skeleton, index: usize, world_rotation: Mat3, parent_world: Option<&Mat4>) -> Quat {
    let world = Mat4::from_mat3(world_rotation);
    let local = world_to_basis(skeleton, index, &world, parent_world);
    Quat::from_mat3(&orthonormalize(rotation_part(&local))).normalize()
}
