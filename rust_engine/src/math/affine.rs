//! 4x4 仿射矩阵辅助函数

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

/// 旋转矩阵检查结果
#[derive(Clone, Copy, Debug)]
pub struct RotationCheck {
    pub determinant: f32,
    /// ‖R·Rᵀ − I‖∞
    pub orthonormal_error: f32,
}

impl RotationCheck {
    pub const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

    pub fn is_valid(&self) -> bool {
        self.determinant > 0.0 && self.orthonormal_error <= Self::ORTHONORMAL_TOLERANCE
    }
}

pub fn is_rotation(m: &Mat3) -> RotationCheck {
    let rrt = *m * m.transpose();
    let diff = rrt - Mat3::IDENTITY;
    let orthonormal_error = [diff.x_axis, diff.y_axis, diff.z_axis]
        .iter()
        .map(|c| c.abs().max_element())
        .fold(0.0f32, f32::max);
    RotationCheck {
        determinant: m.determinant(),
        orthonormal_error,
    }
}

#[inline]
pub fn axis_x(m: &Mat4) -> Vec3 {
    m.x_axis.truncate()
}

#[inline]
pub fn axis_y(m: &Mat4) -> Vec3 {
    m.y_axis.truncate()
}

#[inline]
pub fn axis_z(m: &Mat4) -> Vec3 {
    m.z_axis.truncate()
}

#[inline]
pub fn translation_of(m: &Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// 替换平移列
pub fn with_translation(m: Mat4, translation: Vec3) -> Mat4 {
    let mut out = m;
    out.w_axis = Vec4::new(translation.x, translation.y, translation.z, 1.0);
    out
}

#[inline]
pub fn rotation_part(m: &Mat4) -> Mat3 {
    Mat3::from_mat4(*m)
}

pub fn compose(location: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, location)
}

/// Gram-Schmidt 正交化，以 Y 轴为主轴（骨骼方向保持不变）
pub fn orthonormalize(m: Mat3) -> Mat3 {
    let y = m.y_axis.normalize_or_zero();
    if y == Vec3::ZERO {
        return Mat3::IDENTITY;
    }
    let mut x = m.x_axis - y * m.x_axis.dot(y);
    if x.length_squared() < 1e-12 {
        x = y.any_orthonormal_vector();
    }
    let x = x.normalize();
    let z = x.cross(y);
    Mat3::from_cols(x, y, z)
}

/// 最短弧旋转（输入不要求归一化）
pub fn rotation_arc(from: Vec3, to: Vec3) -> Quat {
    let a = from.normalize_or_zero();
    let b = to.normalize_or_zero();
    if a == Vec3::ZERO || b == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(a, b)
}

/// 绕 axis 从 a 转到 b 的有符号角
pub fn signed_angle(a: Vec3, b: Vec3, axis: Vec3) -> f32 {
    let axis = axis.normalize_or_zero();
    let pa = (a - axis * a.dot(axis)).normalize_or_zero();
    let pb = (b - axis * b.dot(axis)).normalize_or_zero();
    if pa == Vec3::ZERO || pb == Vec3::ZERO {
        return 0.0;
    }
    let sin = axis.dot(pa.cross(pb));
    let cos = pa.dot(pb).clamp(-1.0, 1.0);
    sin.atan2(cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_check() {
        let r = Mat3::from_rotation_z(0.7) * Mat3::from_rotation_x(-0.2);
        assert!(is_rotation(&r).is_valid());

        let mirrored = Mat3::from_diagonal(Vec3::new(-1.0, 1.0, 1.0));
        assert!(!is_rotation(&mirrored).is_valid());

        let sheared = Mat3::from_cols(Vec3::X, Vec3::new(0.1, 1.0, 0.0), Vec3::Z);
        assert!(!is_rotation(&sheared).is_valid());
    }

    #[test]
    fn test_orthonormalize_keeps_y() {
        let m = Mat3::from_cols(Vec3::new(1.0, 0.3, 0.0), Vec3::new(0.0, 2.0, 0.0), Vec3::Z);
        let o = orthonormalize(m);
        assert!(o.y_axis.abs_diff_eq(Vec3::Y, 1e-6));
        assert!(is_rotation(&o).is_valid());
    }

    #[test]
    fn test_signed_angle() {
        let angle = signed_angle(Vec3::X, Vec3::Y, Vec3::Z);
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        let angle = signed_angle(Vec3::X, Vec3::Y, -Vec3::Z);
        assert!((angle + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
