//! T-pose：每根骨骼一个局部旋转
//!
//! JSON 格式为 `[[骨骼名, [w, x, y, z]], ...]`，只保存非单位旋转。

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;
use std::path::Path;

use glam::{Mat3, Mat4, Quat, Vec3};
use serde_json::{json, Value};

use crate::math::{axis_y, matrix_from_euler, rotation_part, RotationOrder};
use crate::skeleton::{rotation_basis, CanonicalRole, PoseEvaluator, Side, Skeleton};
use crate::{MocapError, Result};

/// 与单位四元数的距离超过该值才视为已定义
const DEFINED_EPSILON: f32 = 1e-4;

/// 自动 T-pose 中四肢骨骼的目标朝向（欧拉角，作用于骨骼 Y 轴）
fn auto_target(role: &CanonicalRole) -> Option<Vec3> {
    use CanonicalRole::*;
    let side_sign = |s: &Side| match s {
        Side::Left => -1.0,
        Side::Right => 1.0,
    };
    match role {
        Shoulder(s) | UpperArm(s) | Forearm(s) | Hand(s) => {
            Some(Vec3::new(0.0, 0.0, side_sign(s) * FRAC_PI_2))
        }
        Thigh(_) | Shin(_) => Some(Vec3::new(-FRAC_PI_2, 0.0, 0.0)),
        _ => None,
    }
}

fn is_defined(q: Quat) -> bool {
    let d = (q - Quat::IDENTITY).length().min((q + Quat::IDENTITY).length());
    d > DEFINED_EPSILON
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TPose {
    rotations: BTreeMap<String, Quat>,
}

impl TPose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bone: &str) -> Option<Quat> {
        self.rotations.get(bone).copied()
    }

    pub fn set(&mut self, bone: impl Into<String>, rotation: Quat) {
        self.rotations.insert(bone.into(), rotation.normalize());
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    /// 自动求解：四肢骨骼转到水平手臂、竖直腿的朝向，保持各自的滚转
    pub fn auto(skeleton: &Skeleton) -> Self {
        let mut tpose = Self::new();
        let mut world = vec![Mat4::IDENTITY; skeleton.len()];
        for &i in skeleton.sorted_indices() {
            let bone = skeleton.bone(i);
            let parent = bone.parent.map(|p| world[p]);
            let current = PoseEvaluator::world_matrix(skeleton, i, &Mat4::IDENTITY, parent.as_ref());
            let basis = match bone.role.as_ref().and_then(auto_target) {
                Some(euler) => {
                    let direction = matrix_from_euler(euler, RotationOrder::XYZ) * Vec3::Y;
                    let current_rot = Quat::from_mat3(&rotation_part(&current)).normalize();
                    let arc = Quat::from_rotation_arc(axis_y(&current).normalize(), direction);
                    let desired = Mat3::from_quat((arc * current_rot).normalize());
                    let q = rotation_basis(skeleton, i, desired, parent.as_ref());
                    if is_defined(q) {
                        tpose.set(bone.name.clone(), q);
                    }
                    Mat4::from_quat(q)
                }
                None => Mat4::IDENTITY,
            };
            world[i] = PoseEvaluator::world_matrix(skeleton, i, &basis, parent.as_ref());
        }
        tpose
    }

    /// 由局部姿态记录
    pub fn from_basis(skeleton: &Skeleton, basis: &[Mat4]) -> Self {
        let mut tpose = Self::new();
        for (bone, m) in skeleton.bones().iter().zip(basis) {
            let q = Quat::from_mat3(&rotation_part(m)).normalize();
            if is_defined(q) {
                tpose.set(bone.name.clone(), q);
            }
        }
        tpose
    }

    /// 各骨骼的局部姿态（未定义的为单位矩阵）
    pub fn basis(&self, skeleton: &Skeleton) -> Vec<Mat4> {
        skeleton
            .bones()
            .iter()
            .map(|b| self.get(&b.name).map(Mat4::from_quat).unwrap_or(Mat4::IDENTITY))
            .collect()
    }

    /// T-pose 下的骨架空间矩阵
    pub fn world(&self, skeleton: &Skeleton) -> Vec<Mat4> {
        PoseEvaluator::fk(skeleton, &self.basis(skeleton))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let entries = value
            .as_array()
            .ok_or_else(|| MocapError::input("T-pose JSON must be an array", None))?;
        let mut tpose = Self::new();
        for (i, entry) in entries.iter().enumerate() {
            let bad = || MocapError::input(format!("T-pose entry {} is not [name, [w, x, y, z]]", i), None);
            let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(bad)?;
            let name = pair[0].as_str().ok_or_else(bad)?;
            let q = pair[1]
                .as_array()
                .filter(|q| q.len() == 4)
                .ok_or_else(bad)?
                .iter()
                .map(|v| v.as_f64().map(|v| v as f32).ok_or_else(bad))
                .collect::<Result<Vec<f32>>>()?;
            tpose.set(name, Quat::from_xyzw(q[1], q[2], q[3], q[0]));
        }
        Ok(tpose)
    }

    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<Value> = self
            .rotations
            .iter()
            .filter(|(_, q)| is_defined(**q))
            .map(|(name, q)| json!([name, [q.w, q.x, q.y, q.z]]))
            .collect();
        Ok(serde_json::to_string_pretty(&Value::Array(entries))?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| e.in_category("Load T-pose"))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::translation_of;
    use crate::rig::{test_humanoid, AutoIdentifier};

    fn identified() -> Skeleton {
        let mut sk = test_humanoid();
        AutoIdentifier::new().apply(&mut sk).unwrap();
        sk
    }

    #[test]
    fn test_auto_tpose_straightens_limbs() {
        let mut sk = identified();
        // 手臂下垂的 A-pose
        let upper = sk.find_bone("upperarm_L").unwrap();
        let head = sk.bone(upper).head;
        let drooped = head + Vec3::new(0.2, 0.0, -0.2);
        sk.bone_mut(upper).set_bone(head, drooped, 0.0);
        sk.build_hierarchy();

        let tpose = TPose::auto(&sk);
        let world = tpose.world(&sk);
        assert!(axis_y(&world[upper]).abs_diff_eq(Vec3::X, 1e-4), "{:?}", axis_y(&world[upper]));
        let shin = sk.find_bone("shin_R").unwrap();
        assert!(axis_y(&world[shin]).abs_diff_eq(-Vec3::Z, 1e-4));
        // 头部不参与
        let head_bone = sk.find_bone("head").unwrap();
        assert!(world[head_bone].abs_diff_eq(sk.bone(head_bone).matrix_rest, 1e-5));
        assert!(translation_of(&world[upper]).abs_diff_eq(head, 1e-5));
    }

    #[test]
    fn test_json_round_trip() {
        let sk = identified();
        let mut tpose = TPose::auto(&sk);
        tpose.set("neck", Quat::from_rotation_y(0.3));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpose.json");
        tpose.save(&path).unwrap();

        let loaded = TPose::load(&path).unwrap();
        let before = tpose.basis(&sk);
        let after = loaded.basis(&sk);
        for (i, (a, b)) in before.iter().zip(&after).enumerate() {
            let qa = Quat::from_mat4(a);
            let qb = Quat::from_mat4(b);
            assert!(1.0 - qa.dot(qb).abs() < 1e-5, "bone {}", sk.bone(i).name);
        }
    }

    #[test]
    fn test_identity_is_not_written() {
        let mut tpose = TPose::new();
        tpose.set("a", Quat::IDENTITY);
        tpose.set("b", Quat::from_rotation_x(0.5));
        let text = tpose.to_json().unwrap();
        assert!(!text.contains("\"a\""));
        assert_eq!(TPose::from_json(&text).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_json_is_input_error() {
        let err = TPose::from_json("[[\"a\", [1, 0, 0]]]").unwrap_err();
        assert!(matches!(err, MocapError::InputFormat { .. }));
        assert!(matches!(TPose::from_json("{").unwrap_err(), MocapError::Json(_)));
    }
}
