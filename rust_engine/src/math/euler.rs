//! 欧拉角与旋转矩阵互转
//!
//! 旋转顺序 `ABC` 表示在固定坐标系中依次绕 A、B、C 轴旋转，
//! 即矩阵 `R = R_C · R_B · R_A`（静态坐标系 `sabc` 约定）。
//! glam 的 `EulerRot` 是内旋约定，因此这里自行实现分解。

use std::fmt;
use std::str::FromStr;

use glam::{Mat3, Quat, Vec3};

const EPS: f32 = 1e-6;

/// 骨骼旋转模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RotationOrder {
    #[default]
    XYZ,
    XZY,
    YXZ,
    YZX,
    ZXY,
    ZYX,
    /// 四元数模式；需要欧拉角时按 XYZ 处理
    Quaternion,
}

impl RotationOrder {
    pub const EULER_ORDERS: [RotationOrder; 6] = [
        RotationOrder::XYZ,
        RotationOrder::XZY,
        RotationOrder::YXZ,
        RotationOrder::YZX,
        RotationOrder::ZXY,
        RotationOrder::ZYX,
    ];

    /// (首轴, 奇偶性)，对应 transformations 风格的轴元组
    fn axis_tuple(self) -> (usize, bool) {
        match self {
            RotationOrder::XYZ | RotationOrder::Quaternion => (0, false),
            RotationOrder::XZY => (0, true),
            RotationOrder::YZX => (1, false),
            RotationOrder::YXZ => (1, true),
            RotationOrder::ZXY => (2, false),
            RotationOrder::ZYX => (2, true),
        }
    }

    /// 按应用顺序返回三个轴的索引
    pub fn axes(self) -> [usize; 3] {
        const NEXT_AXIS: [usize; 4] = [1, 2, 0, 1];
        let (i, parity) = self.axis_tuple();
        let p = parity as usize;
        let j = NEXT_AXIS[i + p];
        let k = NEXT_AXIS[i + 1 - p];
        [i, j, k]
    }

    pub fn is_euler(self) -> bool {
        self != RotationOrder::Quaternion
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RotationOrder::XYZ => "XYZ",
            RotationOrder::XZY => "XZY",
            RotationOrder::YXZ => "YXZ",
            RotationOrder::YZX => "YZX",
            RotationOrder::ZXY => "ZXY",
            RotationOrder::ZYX => "ZYX",
            RotationOrder::Quaternion => "QUATERNION",
        }
    }
}

impl fmt::Display for RotationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XYZ" | "SXYZ" => Ok(RotationOrder::XYZ),
            "XZY" | "SXZY" => Ok(RotationOrder::XZY),
            "YXZ" | "SYXZ" => Ok(RotationOrder::YXZ),
            "YZX" | "SYZX" => Ok(RotationOrder::YZX),
            "ZXY" | "SZXY" => Ok(RotationOrder::ZXY),
            "ZYX" | "SZYX" => Ok(RotationOrder::ZYX),
            "QUATERNION" | "QUAT" => Ok(RotationOrder::Quaternion),
            other => Err(format!("unknown rotation order {}", other)),
        }
    }
}

#[inline]
fn at(m: &Mat3, row: usize, col: usize) -> f32 {
    m.col(col)[row]
}

/// 分解旋转矩阵为欧拉角，返回值按 (x, y, z) 排列
pub fn euler_from_matrix(m: &Mat3, order: RotationOrder) -> Vec3 {
    let (_, parity) = order.axis_tuple();
    let [i, j, k] = order.axes();

    let cy = (at(m, i, i) * at(m, i, i) + at(m, j, i) * at(m, j, i)).sqrt();
    let (mut ai, mut aj, mut ak) = if cy > EPS {
        (
            at(m, k, j).atan2(at(m, k, k)),
            (-at(m, k, i)).atan2(cy),
            at(m, j, i).atan2(at(m, i, i)),
        )
    } else {
        (
            (-at(m, j, k)).atan2(at(m, j, j)),
            (-at(m, k, i)).atan2(cy),
            0.0,
        )
    };
    if parity {
        ai = -ai;
        aj = -aj;
        ak = -ak;
    }

    let mut euler = [0.0f32; 3];
    euler[i] = ai;
    euler[j] = aj;
    euler[k] = ak;
    Vec3::from_array(euler)
}

fn axis_rotation(axis: usize, angle: f32) -> Mat3 {
    match axis {
        0 => Mat3::from_rotation_x(angle),
        1 => Mat3::from_rotation_y(angle),
        _ => Mat3::from_rotation_z(angle),
    }
}

/// 由欧拉角 (x, y, z) 构造旋转矩阵
pub fn matrix_from_euler(euler: Vec3, order: RotationOrder) -> Mat3 {
    let [i, j, k] = order.axes();
    axis_rotation(k, euler[k]) * axis_rotation(j, euler[j]) * axis_rotation(i, euler[i])
}

pub fn quat_from_euler(euler: Vec3, order: RotationOrder) -> Quat {
    Quat::from_mat3(&matrix_from_euler(euler, order)).normalize()
}
