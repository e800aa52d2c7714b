//! 曲线操作的帧范围

use crate::animation::{Action, Keyframe, FRAME_EPSILON};
use crate::{MocapError, Result};

/// 时间轴标记
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub name: String,
    pub frame: f32,
    pub selected: bool,
}

impl Marker {
    pub fn new(name: impl Into<String>, frame: f32) -> Self {
        Self {
            name: name.into(),
            frame,
            selected: false,
        }
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }
}

/// 闭区间 [min, max]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRange {
    pub min: f32,
    pub max: f32,
}

impl FrameRange {
    pub fn new(a: f32, b: f32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// 不限范围
    pub fn all() -> Self {
        Self {
            min: f32::MIN,
            max: f32::MAX,
        }
    }

    pub fn contains(&self, frame: f32) -> bool {
        frame >= self.min - FRAME_EPSILON && frame <= self.max + FRAME_EPSILON
    }

    pub fn length(&self) -> f32 {
        self.max - self.min
    }

    pub fn of_action(action: &Action) -> Option<Self> {
        action.frame_range().map(|(a, b)| Self::new(a, b))
    }

    /// 前两个选中标记之间的范围
    pub fn from_markers(markers: &[Marker]) -> Result<Self> {
        let mut selected = markers.iter().filter(|m| m.selected);
        match (selected.next(), selected.next()) {
            (Some(a), Some(b)) => Ok(Self::new(a.frame, b.frame)),
            _ => Err(MocapError::StateViolation(
                "two markers must be selected to define the frame range".into(),
            )),
        }
    }

    /// 选中标记或整个动作的范围
    pub fn resolve(action: &Action, use_markers: bool, markers: &[Marker]) -> Result<Option<Self>> {
        if use_markers {
            Self::from_markers(markers).map(Some)
        } else {
            Ok(Self::of_action(action))
        }
    }

    /// 已排序关键帧切分为 (之前, 之内, 之后)
    pub fn split<'a>(&self, keys: &'a [Keyframe]) -> (&'a [Keyframe], &'a [Keyframe], &'a [Keyframe]) {
        let start = keys.partition_point(|k| k.frame < self.min - FRAME_EPSILON);
        let end = keys.partition_point(|k| k.frame <= self.max + FRAME_EPSILON);
        (&keys[..start], &keys[start..end], &keys[end..])
    }

    /// 范围内的整数帧
    pub fn integer_frames(&self) -> Vec<i32> {
        let start = (self.min - FRAME_EPSILON).ceil() as i32;
        let end = (self.max + FRAME_EPSILON).floor() as i32;
        (start..=end).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_keeps_outside_keys() {
        let keys: Vec<Keyframe> = (0..6).map(|i| Keyframe::new(i as f32 * 2.0, 0.0)).collect();
        let (before, inside, after) = FrameRange::new(7.0, 2.0).split(&keys);
        assert_eq!(before.len(), 1);
        assert_eq!(inside.iter().map(|k| k.frame).collect::<Vec<_>>(), vec![2.0, 4.0, 6.0]);
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_markers() {
        let markers = vec![
            Marker::new("a", 30.0).selected(),
            Marker::new("b", 12.0),
            Marker::new("c", 10.0).selected(),
        ];
        assert_eq!(FrameRange::from_markers(&markers).unwrap(), FrameRange::new(10.0, 30.0));
        let err = FrameRange::from_markers(&markers[1..]).unwrap_err();
        assert!(matches!(err, MocapError::StateViolation(_)));
        assert_eq!(FrameRange::new(0.5, 3.0).integer_frames(), vec![1, 2, 3]);
    }
}
