//! 帧游标接口
//!
//! 重定向通过 `FrameSink` 设置当前帧并读回源骨骼的骨架空间矩阵，
//! 不依赖具体的宿主场景。

use glam::Mat4;

use crate::animation::Action;
use crate::skeleton::{Pose, PoseEvaluator, Skeleton};

pub trait FrameSink {
    fn set_frame(&mut self, frame: i32);

    fn current_frame(&self) -> i32;

    /// 当前帧某骨骼的骨架空间矩阵
    fn evaluate_bone(&mut self, bone: usize) -> Mat4;
}

/// 用姿态求值器在动作上求值
pub struct ActionSink<'a> {
    skeleton: &'a Skeleton,
    action: &'a Action,
    evaluator: PoseEvaluator,
    frame: i32,
    pose: Pose,
}

impl<'a> ActionSink<'a> {
    pub fn new(skeleton: &'a Skeleton, action: &'a Action, evaluator: PoseEvaluator) -> Self {
        Self {
            skeleton,
            action,
            evaluator,
            frame: 0,
            pose: Pose::rest(skeleton),
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }
}

impl FrameSink for ActionSink<'_> {
    fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
        self.pose = self
            .evaluator
            .evaluate(self.skeleton, self.action, frame as f32);
    }

    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn evaluate_bone(&mut self, bone: usize) -> Mat4 {
        self.pose.world.get(bone).copied().unwrap_or(Mat4::IDENTITY)
    }
}

/// 以纯函数 `(帧, 骨骼) -> 矩阵` 作为游标
pub struct FnSink<F> {
    frame: i32,
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(i32, usize) -> Mat4,
{
    pub fn new(f: F) -> Self {
        Self { frame: 0, f }
    }
}

impl<F> FrameSink for FnSink<F>
where
    F: FnMut(i32, usize) -> Mat4,
{
    fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }

    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn evaluate_bone(&mut self, bone: usize) -> Mat4 {
        (self.f)(self.frame, bone)
    }
}
