//! 动作：FCurve 的有序集合

use glam::{Mat4, Quat, Vec3};

use super::fcurve::{ChannelKind, FCurve, InsertMode};
use crate::math::{euler_from_matrix, normalized_quat, orthonormalize, rotation_part};
use crate::skeleton::Bone;
use crate::{MocapError, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Action {
    pub name: String,
    fcurves: Vec<FCurve>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fcurves: Vec::new(),
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn fcurves(&self) -> &[FCurve] {
        &self.fcurves
    }

    pub fn fcurves_mut(&mut self) -> &mut [FCurve] {
        &mut self.fcurves
    }

    pub fn is_empty(&self) -> bool {
        self.fcurves.iter().all(FCurve::is_empty)
    }

    pub fn fcurve(&self, bone: &str, kind: ChannelKind, index: usize) -> Option<&FCurve> {
        self.fcurves.iter().find(|c| c.matches(bone, kind, index))
    }

    pub fn fcurve_mut(&mut self, bone: &str, kind: ChannelKind, index: usize) -> Option<&mut FCurve> {
        self.fcurves.iter_mut().find(|c| c.matches(bone, kind, index))
    }

    /// 查找或新建曲线
    pub fn ensure_fcurve(&mut self, bone: &str, kind: ChannelKind, index: usize) -> &mut FCurve {
        let pos = match self.fcurves.iter().position(|c| c.matches(bone, kind, index)) {
            Some(pos) => pos,
            None => {
                self.fcurves.push(FCurve::new(bone, kind, index));
                self.fcurves.len() - 1
            }
        };
        &mut self.fcurves[pos]
    }

    pub fn has_channel(&self, bone: &str, kind: ChannelKind) -> bool {
        (0..kind.components()).any(|i| self.fcurve(bone, kind, i).is_some())
    }

    pub fn insert_key(
        &mut self,
        bone: &str,
        kind: ChannelKind,
        index: usize,
        frame: f32,
        value: f32,
        mode: InsertMode,
    ) {
        self.ensure_fcurve(bone, kind, index)
            .insert(frame, value, mode);
    }

    pub fn insert_location(&mut self, bone: &str, frame: f32, location: Vec3, mode: InsertMode) {
        for i in 0..3 {
            self.insert_key(bone, ChannelKind::Location, i, frame, location[i], mode);
        }
    }

    /// 四元数按 (w, x, y, z) 存入分量 0..4
    pub fn insert_quaternion(&mut self, bone: &str, frame: f32, q: Quat, mode: InsertMode) {
        for (i, v) in [q.w, q.x, q.y, q.z].into_iter().enumerate() {
            self.insert_key(bone, ChannelKind::RotationQuaternion, i, frame, v, mode);
        }
    }

    pub fn insert_euler(&mut self, bone: &str, frame: f32, euler: Vec3, mode: InsertMode) {
        for i in 0..3 {
            self.insert_key(bone, ChannelKind::RotationEuler, i, frame, euler[i], mode);
        }
    }

    pub fn insert_scale(&mut self, bone: &str, frame: f32, scale: Vec3, mode: InsertMode) {
        for i in 0..3 {
            self.insert_key(bone, ChannelKind::Scale, i, frame, scale[i], mode);
        }
    }

    /// 最近插入的四元数关键帧（用于保持符号连续）
    fn last_quaternion(&self, bone: &str) -> Option<Quat> {
        let mut v = [0.0f32; 4];
        for (i, value) in v.iter_mut().enumerate() {
            *value = self
                .fcurve(bone, ChannelKind::RotationQuaternion, i)?
                .keyframes()
                .last()?
                .value;
        }
        Some(normalized_quat(v[0], v[1], v[2], v[3]))
    }

    /// 把局部姿态写成关键帧：旋转按骨骼的旋转模式写入四元数或欧拉角，
    /// `with_location` 时同时写入位置
    pub fn insert_basis(&mut self, bone: &Bone, frame: f32, basis: &Mat4, with_location: bool, mode: InsertMode) {
        let rotation = orthonormalize(rotation_part(basis));
        if bone.rotation_order.is_euler() {
            let euler = euler_from_matrix(&rotation, bone.rotation_order);
            self.insert_euler(&bone.name, frame, euler, mode);
        } else {
            let mut q = Quat::from_mat3(&rotation).normalize();
            if let Some(prev) = self.last_quaternion(&bone.name) {
                if prev.dot(q) < 0.0 {
                    q = -q;
                }
            }
            self.insert_quaternion(&bone.name, frame, q, mode);
        }
        if with_location {
            self.insert_location(&bone.name, frame, basis.w_axis.truncate(), mode);
        }
    }

    fn evaluate_channel(&self, bone: &str, kind: ChannelKind, frame: f32) -> Option<[f32; 4]> {
        if !self.has_channel(bone, kind) {
            return None;
        }
        let mut values = [0.0f32; 4];
        for (i, value) in values.iter_mut().enumerate().take(kind.components()) {
            *value = self
                .fcurve(bone, kind, i)
                .and_then(|c| c.evaluate_opt(frame))
                .unwrap_or_else(|| kind.default_value(i));
        }
        Some(values)
    }

    pub fn evaluate_location(&self, bone: &str, frame: f32) -> Option<Vec3> {
        self.evaluate_channel(bone, ChannelKind::Location, frame)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    /// 读回的四元数总是归一化
    pub fn evaluate_quaternion(&self, bone: &str, frame: f32) -> Option<Quat> {
        self.evaluate_channel(bone, ChannelKind::RotationQuaternion, frame)
            .map(|v| normalized_quat(v[0], v[1], v[2], v[3]))
    }

    pub fn evaluate_euler(&self, bone: &str, frame: f32) -> Option<Vec3> {
        self.evaluate_channel(bone, ChannelKind::RotationEuler, frame)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    pub fn evaluate_scale(&self, bone: &str, frame: f32) -> Option<Vec3> {
        self.evaluate_channel(bone, ChannelKind::Scale, frame)
            .map(|v| Vec3::new(v[0], v[1], v[2]))
    }

    /// 快速插入之后统一排序
    pub fn resort(&mut self) {
        for curve in &mut self.fcurves {
            if curve.needs_resort() {
                curve.resort();
            }
        }
    }

    /// 所有曲线的 [first, last]
    pub fn frame_range(&self) -> Option<(f32, f32)> {
        self.fcurves
            .iter()
            .filter_map(FCurve::frame_range)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    /// 出现过的骨骼名（按首次出现顺序）
    pub fn bone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for curve in &self.fcurves {
            if let Some(bone) = curve.bone_name() {
                if !names.iter().any(|n| n == bone) {
                    names.push(bone.to_string());
                }
            }
        }
        names
    }

    /// 某骨骼所有曲线上出现过的帧（升序去重）
    pub fn keyed_frames(&self, bone: &str) -> Vec<f32> {
        let mut frames: Vec<f32> = self
            .fcurves
            .iter()
            .filter(|c| c.bone_name() == Some(bone))
            .flat_map(|c| c.keyframes().iter().map(|k| k.frame))
            .collect();
        frames.sort_by(f32::total_cmp);
        frames.dedup_by(|a, b| (*a - *b).abs() < 1e-4);
        frames
    }

    pub fn remove_bone(&mut self, bone: &str) {
        self.fcurves.retain(|c| c.bone_name() != Some(bone));
    }

    pub fn remove_channel(&mut self, bone: &str, kind: ChannelKind) {
        self.fcurves
            .retain(|c| !(c.bone_name() == Some(bone) && c.channel() == Some(kind)));
    }

    pub fn rename_bone(&mut self, old: &str, new: &str) {
        for curve in &mut self.fcurves {
            if curve.bone_name() == Some(old) {
                curve.set_bone_name(new);
            }
        }
    }

    /// 位置曲线按比例缩放
    pub fn scale_locations(&mut self, factor: f32) {
        for curve in &mut self.fcurves {
            if curve.channel() == Some(ChannelKind::Location) {
                for key in curve.keyframes_mut() {
                    key.value *= factor;
                    if let Some(h) = key.handle_left.as_mut() {
                        h.y *= factor;
                    }
                    if let Some(h) = key.handle_right.as_mut() {
                        h.y *= factor;
                    }
                }
            }
        }
    }
}

/// 目标骨架拥有的动作库，至多一个活动动作
#[derive(Clone, Debug, Default)]
pub struct ActionLibrary {
    actions: Vec<Action>,
    active: Option<usize>,
}

impl ActionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.position(name).map(|i| &self.actions[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Action> {
        let i = self.position(name)?;
        Some(&mut self.actions[i])
    }

    /// `name`、`name.001`、`name.002` ...
    pub fn unique_name(&self, base: &str) -> String {
        if self.position(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}.{:03}", base, n))
            .find(|candidate| self.position(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// 添加动作（名称冲突时自动改名），返回最终名称
    pub fn add(&mut self, mut action: Action) -> String {
        action.name = self.unique_name(&action.name);
        let name = action.name.clone();
        self.actions.push(action);
        name
    }

    /// 添加并设为活动动作，替换之前的活动动作
    pub fn add_active(&mut self, action: Action) -> String {
        let name = self.add(action);
        self.active = Some(self.actions.len() - 1);
        name
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let i = self
            .position(name)
            .ok_or_else(|| MocapError::StateViolation(format!("no action named {}", name)))?;
        self.active = Some(i);
        Ok(())
    }

    pub fn active(&self) -> Option<&Action> {
        self.active.map(|i| &self.actions[i])
    }

    pub fn active_mut(&mut self) -> Option<&mut Action> {
        match self.active {
            Some(i) => self.actions.get_mut(i),
            None => None,
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.position(new).is_some() {
            return Err(MocapError::StateViolation(format!(
                "action {} already exists",
                new
            )));
        }
        let i = self
            .position(old)
            .ok_or_else(|| MocapError::StateViolation(format!("no action named {}", old)))?;
        self.actions[i].rename(new);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<Action> {
        let i = self
            .position(name)
            .ok_or_else(|| MocapError::StateViolation(format!("no action named {}", name)))?;
        self.active = match self.active {
            Some(a) if a == i => None,
            Some(a) if a > i => Some(a - 1),
            other => other,
        };
        Ok(self.actions.remove(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quaternion_read_back_is_normalized() {
        let mut action = Action::new("a");
        action.insert_quaternion("b", 1.0, Quat::IDENTITY, InsertMode::Replace);
        action.insert_quaternion(
            "b",
            3.0,
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            InsertMode::Replace,
        );
        let q = action.evaluate_quaternion("b", 2.0).unwrap();
        assert!((q.length() - 1.0).abs() < 1e-6);
        assert!((q.to_axis_angle().1 - std::f32::consts::FRAC_PI_4).abs() < 1e-3);
        assert_eq!(action.evaluate_location("b", 2.0), None);
    }

    #[test]
    fn test_insert_basis_follows_rotation_mode() {
        use crate::math::RotationOrder;
        let quat_bone = Bone::new("q", Vec3::ZERO, Vec3::Z, 0.0);
        let euler_bone = Bone::new("e", Vec3::ZERO, Vec3::Z, 0.0).with_rotation_order(RotationOrder::ZXY);
        let mut action = Action::new("a");
        let r = Quat::from_rotation_z(0.5);
        let basis = Mat4::from_rotation_translation(r, Vec3::new(1.0, 2.0, 3.0));
        action.insert_basis(&quat_bone, 1.0, &basis, true, InsertMode::Replace);
        action.insert_basis(&euler_bone, 1.0, &basis, false, InsertMode::Replace);
        // 符号与上一帧保持一致
        action.insert_basis(&quat_bone, 2.0, &Mat4::from_quat(-r), false, InsertMode::Replace);

        assert!(action.has_channel("e", ChannelKind::RotationEuler));
        assert!(!action.has_channel("e", ChannelKind::Location));
        assert!((action.evaluate_euler("e", 1.0).unwrap().z - 0.5).abs() < 1e-5);
        assert_eq!(action.evaluate_location("q", 1.0), Some(Vec3::new(1.0, 2.0, 3.0)));
        let w = action.fcurve("q", ChannelKind::RotationQuaternion, 0).unwrap();
        assert!(w.keyframes().iter().all(|k| k.value > 0.0));
    }

    #[test]
    fn test_frame_range_and_bones() {
        let mut action = Action::new("a");
        action.insert_location("hips", 2.0, Vec3::ONE, InsertMode::Replace);
        action.insert_location("spine", 9.0, Vec3::ONE, InsertMode::Replace);
        assert_eq!(action.frame_range(), Some((2.0, 9.0)));
        assert_eq!(action.bone_names(), vec!["hips".to_string(), "spine".to_string()]);
        action.rename_bone("spine", "chest");
        assert!(action.has_channel("chest", ChannelKind::Location));
        action.remove_bone("chest");
        assert_eq!(action.bone_names(), vec!["hips".to_string()]);
    }

    #[test]
    fn test_library_unique_names_and_active() {
        let mut lib = ActionLibrary::new();
        assert_eq!(lib.add_active(Action::new("walk")), "walk");
        assert_eq!(lib.add_active(Action::new("walk")), "walk.001");
        assert_eq!(lib.active().unwrap().name, "walk.001");
        lib.set_active("walk").unwrap();
        lib.delete("walk").unwrap();
        assert!(lib.active().is_none());
        assert!(lib.rename("walk.001", "run").is_ok());
        assert_eq!(lib.names(), vec!["run"]);
        assert!(lib.set_active("nope").is_err());
    }
}
