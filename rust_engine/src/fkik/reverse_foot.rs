//! 反向脚求解
//!
//! 根据三个标记骨骼的高度判断脚的状态，求出腿部 IK 控制器的世界矩阵。
//! 控制器的尾部落在 FK 脚趾尾部，头部沿 Y 轴后退自身长度。

use glam::{Mat4, Vec3};

use crate::math::{axis_x, axis_y, translation_of};

/// X 轴竖直分量上限，保持脚部直立
const MAX_X_TILT: f32 = 0.7;

/// 标记骨骼的世界头部位置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerHeads {
    pub ball: Vec3,
    pub toe: Vec3,
    pub heel: Vec3,
}

impl MarkerHeads {
    /// 脚跟高于脚掌与脚尖
    pub fn is_flat(&self) -> bool {
        self.heel.z > self.ball.z && self.heel.z > self.toe.z
    }
}

/// 去掉 X 在 Y 上的分量，并把竖直分量限制在 `MAX_X_TILT` 以内
fn upright_x(x: Vec3, y: Vec3) -> Vec3 {
    let mut x = (x - y * x.dot(y)).normalize_or_zero();
    if x == Vec3::ZERO {
        x = y.cross(Vec3::Z).normalize_or_zero();
    }
    if x.z.abs() >= MAX_X_TILT {
        let horizontal = Vec3::new(x.x, x.y, 0.0).normalize_or_zero();
        let tilt = (MAX_X_TILT - 1e-3).copysign(x.z);
        let clamped = horizontal * (1.0 - tilt * tilt).sqrt() + Vec3::Z * tilt;
        x = (clamped - y * clamped.dot(y)).normalize_or_zero();
    }
    x
}

/// 腿部 IK 控制器的世界矩阵
pub fn reverse_foot(fk_toe: &Mat4, fk_toe_length: f32, markers: &MarkerHeads, leg_ik_length: f32) -> Mat4 {
    let toe_y = axis_y(fk_toe);
    let tail = translation_of(fk_toe) + toe_y * fk_toe_length;

    let (x, y, z) = if markers.is_flat() {
        let flat = Vec3::new(toe_y.x, toe_y.y, 0.0).normalize_or_zero();
        let y = if flat == Vec3::ZERO { Vec3::Y } else { flat };
        let x = y.cross(Vec3::Z).normalize();
        (x, y, x.cross(y))
    } else {
        let y = (tail - markers.heel).normalize_or_zero();
        let y = if y == Vec3::ZERO { toe_y } else { y };
        let x = upright_x(axis_x(fk_toe), y);
        (x, y, x.cross(y))
    };
    let head = tail - y * leg_ik_length;
    Mat4::from_cols(
        x.extend(0.0),
        y.extend(0.0),
        z.extend(0.0),
        head.extend(1.0),
    )
}
