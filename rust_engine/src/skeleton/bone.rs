//! 骨骼节点

use glam::{Mat3, Mat4, Quat, Vec3};

use super::constraint::{AxisLimit, Constraint, ConstraintKind, Space};
use super::roles::CanonicalRole;
use crate::math::{rotation_arc, RotationOrder};

/// 小于此长度的骨骼视为退化
pub const MIN_BONE_LENGTH: f32 = 1e-4;

/// 由头、尾与滚转角构造静止矩阵；局部 Y 轴指向尾部
pub fn rest_matrix(head: Vec3, tail: Vec3, roll: f32) -> Mat4 {
    let dir = (tail - head).normalize_or_zero();
    let align = if dir == Vec3::ZERO {
        Quat::IDENTITY
    } else if dir.y < -1.0 + 1e-6 {
        // 指向 -Y：绕 Z 转半圈
        Quat::from_rotation_z(std::f32::consts::PI)
    } else {
        rotation_arc(Vec3::Y, dir)
    };
    let rotation = align * Quat::from_rotation_y(roll);
    Mat4::from_rotation_translation(rotation.normalize(), head)
}

/// 由静止矩阵反求滚转角
pub fn roll_from_matrix(matrix: &Mat4) -> f32 {
    let y = matrix.y_axis.truncate().normalize_or_zero();
    let aligned = rest_matrix(Vec3::ZERO, y, 0.0);
    let x = aligned.x_axis.truncate();
    let actual_x = matrix.x_axis.truncate();
    crate::math::signed_angle(x, actual_x, y)
}

/// 骨骼
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    // 静止几何（骨架空间）
    pub head: Vec3,
    pub tail: Vec3,
    pub roll: f32,
    pub length: f32,
    pub matrix_rest: Mat4,
    /// parent.matrix_rest⁻¹ · matrix_rest，根骨骼等于 matrix_rest
    pub matrix_relative: Mat4,

    pub rotation_order: RotationOrder,
    pub lock_location: [bool; 3],
    pub lock_rotation: [bool; 3],
    pub constraints: Vec<Constraint>,

    /// 规范角色（mcp_bone）
    pub role: Option<CanonicalRole>,
    /// 重定向父级名称（mcp_parent），为空时使用层级父级
    pub retarget_parent: Option<String>,

    pub hidden: bool,
    pub connected: bool,
    pub deform: bool,
    /// 骨骼层位掩码
    pub layers: u32,
}

impl Bone {
    pub fn new(name: impl Into<String>, head: Vec3, tail: Vec3, roll: f32) -> Self {
        let mut bone = Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            head,
            tail,
            roll,
            length: 0.0,
            matrix_rest: Mat4::IDENTITY,
            matrix_relative: Mat4::IDENTITY,
            rotation_order: RotationOrder::Quaternion,
            lock_location: [false; 3],
            lock_rotation: [false; 3],
            constraints: Vec::new(),
            role: None,
            retarget_parent: None,
            hidden: false,
            connected: false,
            deform: true,
            layers: 1,
        };
        bone.set_bone(head, tail, roll);
        bone
    }

    /// 更新静止几何；matrix_relative 由骨架在 build_hierarchy 中刷新
    pub fn set_bone(&mut self, head: Vec3, tail: Vec3, roll: f32) {
        self.head = head;
        self.tail = tail;
        self.roll = roll;
        self.length = (tail - head).length();
        self.matrix_rest = rest_matrix(head, tail, roll);
    }

    pub fn with_role(mut self, role: CanonicalRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_rotation_order(mut self, order: RotationOrder) -> Self {
        self.rotation_order = order;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn is_degenerate(&self) -> bool {
        self.length < MIN_BONE_LENGTH
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn rest_rotation(&self) -> Mat3 {
        Mat3::from_mat4(self.matrix_rest)
    }

    /// 局部 Y 轴（骨骼方向）
    pub fn direction(&self) -> Vec3 {
        self.matrix_rest.y_axis.truncate()
    }

    /// 按比例缩放静止几何
    pub fn rescale(&mut self, scale: f32) {
        let (head, tail, roll) = (self.head * scale, self.tail * scale, self.roll);
        self.set_bone(head, tail, roll);
    }

    /// 局部空间中生效的旋转限制
    pub fn rotation_limits(&self) -> Option<([AxisLimit; 3], f32)> {
        self.constraints.iter().find_map(|c| match &c.kind {
            ConstraintKind::LimitRotation { limits } if c.owner_space == Space::Local && !c.mute => {
                Some((*limits, c.influence))
            }
            _ => None,
        })
    }

    pub fn ik_constraint(&self) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.is_ik())
    }

    /// 存在被静音的 IK 约束
    pub fn has_muted_ik(&self) -> bool {
        self.constraints.iter().any(|c| c.is_ik() && c.mute)
    }

    /// 存在影响度为零的约束
    pub fn has_zero_influence(&self) -> bool {
        self.constraints.iter().any(|c| c.influence == 0.0)
    }

    /// 蒙皮用的 (M, M⁻¹)
    pub fn bind_matrices(&self) -> (Mat4, Mat4) {
        (self.matrix_rest, self.matrix_rest.inverse())
    }
}

impl Default for Bone {
    fn default() -> Self {
        Self::new(String::new(), Vec3::ZERO, Vec3::Y, 0.0)
    }
}
