//! 重定向期间的临时属性覆盖
//!
//! 守卫创建时保存并覆盖属性，离开作用域时（包括错误返回）恢复。

use super::sink::FrameSink;
use crate::skeleton::Skeleton;

/// 约束影响度与图层可见性的覆盖
pub struct OverrideGuard<'a> {
    skeleton: &'a mut Skeleton,
    /// (骨骼, 约束, 影响度, 静音)
    saved: Vec<(usize, usize, f32, bool)>,
    visible_layers: u32,
}

impl<'a> OverrideGuard<'a> {
    /// 旋转限制与 IK 的影响度置零，所有图层可见
    pub fn new(skeleton: &'a mut Skeleton) -> Self {
        let mut saved = Vec::new();
        for b in 0..skeleton.len() {
            let bone = skeleton.bone_mut(b);
            for (c, constraint) in bone.constraints.iter_mut().enumerate() {
                if constraint.is_ik() || constraint.is_limit_rotation() {
                    saved.push((b, c, constraint.influence, constraint.mute));
                    constraint.influence = 0.0;
                }
            }
        }
        let visible_layers = skeleton.visible_layers;
        skeleton.visible_layers = u32::MAX;
        Self {
            skeleton,
            saved,
            visible_layers,
        }
    }

    pub fn skeleton(&self) -> &Skeleton {
        &*self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut *self.skeleton
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        for &(b, c, influence, mute) in &self.saved {
            if let Some(constraint) = self.skeleton.bone_mut(b).constraints.get_mut(c) {
                constraint.influence = influence;
                constraint.mute = mute;
            }
        }
        self.skeleton.visible_layers = self.visible_layers;
    }
}

/// 保存并恢复帧游标
pub struct FrameGuard<'a, S: FrameSink + ?Sized> {
    sink: &'a mut S,
    saved: i32,
}

impl<'a, S: FrameSink + ?Sized> FrameGuard<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        let saved = sink.current_frame();
        Self { sink, saved }
    }

    pub fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }
}

impl<S: FrameSink + ?Sized> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        self.sink.set_frame(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retarget::sink::FnSink;
    use crate::skeleton::{AxisLimit, Constraint};
    use glam::Mat4;

    #[test]
    fn test_overrides_restored_on_drop() {
        let mut sk = crate::skeleton::test_chain();
        sk.visible_layers = 0b101;
        sk.bone_mut(2)
            .constraints
            .push(Constraint::ik("root", None, 1).with_influence(0.7));
        sk.bone_mut(1)
            .constraints
            .push(Constraint::limit_rotation([AxisLimit::new(-1.0, 1.0); 3]));
        {
            let guard = OverrideGuard::new(&mut sk);
            let sk = guard.skeleton();
            assert_eq!(sk.visible_layers, u32::MAX);
            assert_eq!(sk.bone(2).constraints[0].influence, 0.0);
            assert_eq!(sk.bone(1).constraints[0].influence, 0.0);
        }
        assert_eq!(sk.visible_layers, 0b101);
        assert_eq!(sk.bone(2).constraints[0].influence, 0.7);
        assert_eq!(sk.bone(1).constraints[0].influence, 1.0);
    }

    #[test]
    fn test_frame_restored_on_early_return() {
        fn walk(sink: &mut dyn FrameSink) -> Result<(), String> {
            let mut guard = FrameGuard::new(sink);
            guard.sink().set_frame(40);
            Err("stopped".into())
        }
        let mut sink = FnSink::new(|_, _| Mat4::IDENTITY);
        sink.set_frame(7);
        assert!(walk(&mut sink).is_err());
        assert_eq!(sink.current_frame(), 7);
    }
}
