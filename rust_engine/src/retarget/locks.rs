//! 旋转锁定与旋转限制
//!
//! 局部姿态先按锁定方向选出的欧拉顺序分解，锁定分量置零，再按限制夹紧，
//! 最后重建矩阵并恢复平移列。

use glam::Mat4;

use crate::math::{
    euler_from_matrix, matrix_from_euler, orthonormalize, rotation_part, translation_of,
    with_translation, RotationOrder,
};
use crate::skeleton::{AxisLimit, Bone};

/// 限制约束的影响度必须超过该值才生效
const LIMIT_INFLUENCE_THRESHOLD: f32 = 0.5;

/// 由锁定标志选择欧拉顺序
pub fn lock_order(lock: [bool; 3]) -> RotationOrder {
    match lock {
        [true, true, false] => RotationOrder::YXZ,
        [_, true, _] => RotationOrder::YZX,
        [true, false, true] => RotationOrder::ZXY,
        [false, false, true] => RotationOrder::ZYX,
        _ => RotationOrder::XYZ,
    }
}

/// 单根骨骼的锁定与限制
#[derive(Clone, Debug, PartialEq)]
pub struct BoneCorrection {
    pub order: RotationOrder,
    pub locked: [bool; 3],
    pub limits: Option<[AxisLimit; 3]>,
}

impl BoneCorrection {
    /// 没有任何锁定或限制时返回 None
    pub fn for_bone(bone: &Bone, use_locks: bool, use_limits: bool) -> Option<Self> {
        let locked = if use_locks {
            bone.lock_rotation
        } else {
            [false; 3]
        };
        let limits = if use_limits {
            bone.rotation_limits()
                .filter(|(_, influence)| *influence > LIMIT_INFLUENCE_THRESHOLD)
                .map(|(limits, _)| limits)
        } else {
            None
        };
        if !locked.iter().any(|&l| l) && limits.is_none() {
            return None;
        }
        let order = if locked.iter().any(|&l| l) {
            lock_order(locked)
        } else if bone.rotation_order.is_euler() {
            bone.rotation_order
        } else {
            RotationOrder::XYZ
        };
        Some(Self {
            order,
            locked,
            limits,
        })
    }

    pub fn apply(&self, local: &Mat4) -> Mat4 {
        let rotation = orthonormalize(rotation_part(local));
        let mut euler = euler_from_matrix(&rotation, self.order);
        for axis in 0..3 {
            if self.locked[axis] {
                euler[axis] = 0.0;
            }
            if let Some(limits) = &self.limits {
                euler[axis] = limits[axis].clamp(euler[axis]);
            }
        }
        let rebuilt = Mat4::from_mat3(matrix_from_euler(euler, self.order));
        with_translation(rebuilt, translation_of(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Constraint;
    use glam::{Mat3, Vec3};
    use pretty_assertions::assert_eq;

    fn bone() -> Bone {
        Bone::new("b", Vec3::ZERO, Vec3::Y, 0.0)
    }

    #[test]
    fn test_lock_orders() {
        assert_eq!(lock_order([false, true, false]), RotationOrder::YZX);
        assert_eq!(lock_order([true, true, false]), RotationOrder::YXZ);
        assert_eq!(lock_order([false, true, true]), RotationOrder::YZX);
        assert_eq!(lock_order([false, false, true]), RotationOrder::ZYX);
        assert_eq!(lock_order([true, false, true]), RotationOrder::ZXY);
        assert_eq!(lock_order([true, false, false]), RotationOrder::XYZ);
    }

    #[test]
    fn test_no_correction_without_locks_or_limits() {
        assert_eq!(BoneCorrection::for_bone(&bone(), true, true), None);
        let mut locked = bone();
        locked.lock_rotation = [false, true, false];
        assert_eq!(BoneCorrection::for_bone(&locked, false, true), None);
    }

    #[test]
    fn test_locked_axis_is_zeroed_and_translation_kept() {
        let mut b = bone();
        b.lock_rotation = [false, true, false];
        let c = BoneCorrection::for_bone(&b, true, false).unwrap();
        let euler = Vec3::new(0.3, 0.5, -0.2);
        let m = with_translation(
            Mat4::from_mat3(matrix_from_euler(euler, RotationOrder::YZX)),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let out = c.apply(&m);
        let expected = matrix_from_euler(Vec3::new(0.3, 0.0, -0.2), RotationOrder::YZX);
        assert!(Mat3::from_mat4(out).abs_diff_eq(expected, 1e-5));
        assert_eq!(translation_of(&out), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_limits_clamp_and_low_influence_ignored() {
        let limits = [AxisLimit::new(-0.1, 0.1), AxisLimit::default(), AxisLimit::new(0.0, 0.0)];
        let b = bone().with_constraint(Constraint::limit_rotation(limits));
        let c = BoneCorrection::for_bone(&b, true, true).unwrap();
        let m = Mat4::from_mat3(matrix_from_euler(Vec3::new(0.5, 0.2, 0.4), RotationOrder::XYZ));
        let e = euler_from_matrix(&Mat3::from_mat4(c.apply(&m)), RotationOrder::XYZ);
        assert!(e.abs_diff_eq(Vec3::new(0.1, 0.2, 0.0), 1e-5), "{:?}", e);

        let weak = bone().with_constraint(Constraint::limit_rotation(limits).with_influence(0.4));
        assert_eq!(BoneCorrection::for_bone(&weak, true, true), None);
    }
}
