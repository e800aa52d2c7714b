//! 数学内核：欧拉角、仿射矩阵辅助函数、Catmull-Rom 样条段

mod affine;
mod catmull_rom;
mod euler;

pub use affine::{
    axis_x, axis_y, axis_z, compose, is_rotation, orthonormalize, rotation_part, rotation_arc,
    signed_angle, translation_of, with_translation, RotationCheck,
};
pub use catmull_rom::{CatmullRom, Segment};
pub use euler::{euler_from_matrix, matrix_from_euler, quat_from_euler, RotationOrder};

/// 从 FCurve 读回四元数时使用的归一化（零四元数退化为单位四元数）
pub fn normalized_quat(w: f32, x: f32, y: f32, z: f32) -> glam::Quat {
    let q = glam::Quat::from_xyzw(x, y, z, w);
    if q.length_squared() < 1e-12 {
        glam::Quat::IDENTITY
    } else {
        q.normalize()
    }
}
