//! 极向目标位置

use glam::{Mat4, Vec3};

use crate::math::{axis_y, translation_of};

/// 上下两节的 Y 轴近乎平行时无法确定弯曲平面
const PARALLEL_EPSILON: f32 = 1e-4;

/// 由上节 `above` 与下节 `below` 的世界矩阵求极向目标：
/// 在弯曲平面内，从下节头部沿 `above.y − below.y` 去掉法向分量后的方向移动 `distance`
pub fn pole_target(above: &Mat4, below: &Mat4, distance: f32) -> Vec3 {
    let (ya, yb) = (axis_y(above), axis_y(below));
    let head = translation_of(below);
    let n = ya.cross(yb);
    if n.length() <= PARALLEL_EPSILON {
        return head;
    }
    let n = n.normalize();
    let d = ya - yb;
    let z = (d - n * d.dot(n)).normalize_or_zero();
    head + z * distance
}
