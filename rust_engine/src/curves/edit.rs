//! 位移编辑
//!
//! 编辑开始时保存动作快照；用户在若干帧上输入新值，记录其与快照曲线的差。
//! 确认时每条被编辑的曲线用 Catmull-Rom 插值这些差（范围两端锚定为零），
//! 加到范围内的每个原始关键帧上。

use std::collections::BTreeMap;

use super::range::FrameRange;
use crate::animation::{Action, ChannelKind, FCurve, InsertMode, Keyframe};
use crate::math::CatmullRom;
use crate::{MocapError, Result};

type CurveId = (String, ChannelKind, usize);

#[derive(Debug, Default)]
pub struct EditSession {
    snapshot: Option<Action>,
    displacements: BTreeMap<CurveId, Vec<(f32, f32)>>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.snapshot.is_some()
    }

    fn snapshot(&self) -> Result<&Action> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| MocapError::StateViolation("no edit in progress".into()))
    }

    pub fn start_edit(&mut self, action: &Action) -> Result<()> {
        if let Some(pending) = &self.snapshot {
            return Err(MocapError::StateViolation(format!(
                "an edit of {} is already in progress",
                pending.name
            )));
        }
        self.snapshot = Some(action.clone());
        self.displacements.clear();
        Ok(())
    }

    /// 记录 `frame` 处的用户值，并同步写入当前动作；返回位移量
    pub fn insert_displacement(
        &mut self,
        action: &mut Action,
        bone: &str,
        kind: ChannelKind,
        index: usize,
        frame: f32,
        value: f32,
    ) -> Result<f32> {
        let original = self
            .snapshot()?
            .fcurve(bone, kind, index)
            .and_then(|c| c.evaluate_opt(frame))
            .unwrap_or_else(|| kind.default_value(index));
        let displacement = value - original;
        let points = self
            .displacements
            .entry((bone.to_string(), kind, index))
            .or_default();
        points.retain(|(f, _)| (f - frame).abs() > 1e-4);
        points.push((frame, displacement));
        action.insert_key(bone, kind, index, frame, value, InsertMode::Replace);
        Ok(displacement)
    }

    /// 应用所有位移并结束编辑，返回改写的曲线数
    pub fn confirm_edit(&mut self, action: &mut Action, range: FrameRange) -> Result<usize> {
        let snapshot = self.snapshot()?;
        let mut edited = Vec::with_capacity(self.displacements.len());
        for ((bone, kind, index), points) in &self.displacements {
            let base = snapshot
                .fcurve(bone, *kind, *index)
                .cloned()
                .unwrap_or_else(|| FCurve::new(bone, *kind, *index));
            let mut anchors = vec![(range.min, 0.0), (range.max, 0.0)];
            anchors.extend(points.iter().filter(|(f, _)| range.contains(*f)));
            let spline = CatmullRom::new(&anchors);

            let (before, inside, after) = range.split(base.keyframes());
            let mut keys: Vec<Keyframe> = before.to_vec();
            keys.extend(inside.iter().map(|k| {
                let mut k = *k;
                k.offset(0.0, spline.evaluate(k.frame));
                k
            }));
            keys.extend(
                points
                    .iter()
                    .filter(|(f, _)| range.contains(*f))
                    .map(|&(f, d)| Keyframe::new(f, base.evaluate_opt(f).unwrap_or_else(|| kind.default_value(*index)) + d)),
            );
            keys.extend_from_slice(after);
            edited.push(((bone.clone(), *kind, *index), keys));
        }

        for ((bone, kind, index), keys) in edited {
            action.ensure_fcurve(&bone, kind, index).set_keyframes(keys);
        }
        let count = self.displacements.len();
        self.snapshot = None;
        self.displacements.clear();
        log::debug!("确认位移编辑：{} 条曲线", count);
        Ok(count)
    }

    /// 放弃编辑，恢复快照
    pub fn undo_edit(&mut self, action: &mut Action) -> Result<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| MocapError::StateViolation("no edit to undo".into()))?;
        *action = snapshot;
        self.displacements.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> Action {
        let mut action = Action::new("a");
        for f in 0..=20 {
            action.insert_key("hips", ChannelKind::Location, 0, f as f32, 0.0, InsertMode::Replace);
        }
        action
    }

    #[test]
    fn test_displacement_spreads_smoothly() {
        let mut action = flat();
        let mut edit = EditSession::new();
        edit.start_edit(&action).unwrap();
        let d = edit
            .insert_displacement(&mut action, "hips", ChannelKind::Location, 0, 10.0, 1.0)
            .unwrap();
        assert_eq!(d, 1.0);
        assert_eq!(edit.confirm_edit(&mut action, FrameRange::new(0.0, 20.0)).unwrap(), 1);
        assert!(!edit.is_pending());

        let curve = action.fcurve("hips", ChannelKind::Location, 0).unwrap();
        assert_eq!(curve.len(), 21);
        assert!((curve.evaluate(10.0) - 1.0).abs() < 1e-6);
        assert!(curve.evaluate(0.0).abs() < 1e-6);
        assert!(curve.evaluate(20.0).abs() < 1e-6);
        let v5 = curve.evaluate(5.0);
        assert!(v5 > 0.0 && v5 < 1.0, "{}", v5);
    }

    #[test]
    fn test_state_violations() {
        let mut action = flat();
        let mut edit = EditSession::new();
        let err = edit.undo_edit(&mut action).unwrap_err();
        assert!(matches!(err, MocapError::StateViolation(_)));
        assert!(edit
            .insert_displacement(&mut action, "hips", ChannelKind::Location, 0, 1.0, 1.0)
            .is_err());

        edit.start_edit(&action).unwrap();
        assert!(matches!(edit.start_edit(&action), Err(MocapError::StateViolation(_))));
    }

    #[test]
    fn test_undo_restores_snapshot() {
        let mut action = flat();
        let before = action.clone();
        let mut edit = EditSession::new();
        edit.start_edit(&action).unwrap();
        edit.insert_displacement(&mut action, "hips", ChannelKind::Location, 0, 4.0, 3.0)
            .unwrap();
        assert_ne!(action, before);
        edit.undo_edit(&mut action).unwrap();
        assert_eq!(action, before);
        assert!(!edit.is_pending());
    }
}
