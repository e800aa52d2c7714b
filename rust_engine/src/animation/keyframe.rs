//! 动画关键帧

use glam::Vec2;

/// 关键帧到下一关键帧之间的插值方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Constant,
    #[default]
    Linear,
    Bezier,
}

/// 单个关键帧 (time, value)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    pub frame: f32,
    pub value: f32,
    pub interpolation: Interpolation,
    /// 贝塞尔控制点（绝对坐标 (frame, value)）
    pub handle_left: Option<Vec2>,
    pub handle_right: Option<Vec2>,
}

impl Keyframe {
    pub fn new(frame: f32, value: f32) -> Self {
        Self {
            frame,
            value,
            interpolation: Interpolation::Linear,
            handle_left: None,
            handle_right: None,
        }
    }

    pub fn constant(frame: f32, value: f32) -> Self {
        Self {
            interpolation: Interpolation::Constant,
            ..Self::new(frame, value)
        }
    }

    pub fn co(&self) -> Vec2 {
        Vec2::new(self.frame, self.value)
    }

    /// 平移关键帧及其控制点
    pub fn offset(&mut self, dt: f32, dv: f32) {
        let delta = Vec2::new(dt, dv);
        self.frame += dt;
        self.value += dv;
        if let Some(h) = self.handle_left.as_mut() {
            *h += delta;
        }
        if let Some(h) = self.handle_right.as_mut() {
            *h += delta;
        }
    }
}

/// 在 `key` 与 `next` 之间求值
pub fn interpolate(key: &Keyframe, next: &Keyframe, frame: f32) -> f32 {
    let span = next.frame - key.frame;
    if span.abs() < f32::EPSILON {
        return next.value;
    }
    match key.interpolation {
        Interpolation::Constant => key.value,
        Interpolation::Linear => key.value + (next.value - key.value) * (frame - key.frame) / span,
        Interpolation::Bezier => match (key.handle_right, next.handle_left) {
            (Some(h1), Some(h2)) => bezier_segment(key.co(), h1, h2, next.co(), frame),
            _ => key.value + (next.value - key.value) * (frame - key.frame) / span,
        },
    }
}

/// 三次贝塞尔段：牛顿法求解 x(s) = frame，返回 y(s)
fn bezier_segment(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, frame: f32) -> f32 {
    // 控制点横坐标限制在区间内，保证 x(s) 单调
    let clamp_x = |p: Vec2| Vec2::new(p.x.clamp(p0.x, p3.x), p.y);
    let (p1, p2) = (clamp_x(p1), clamp_x(p2));

    let point = |s: f32| {
        let t = 1.0 - s;
        p0 * (t * t * t) + p1 * (3.0 * t * t * s) + p2 * (3.0 * t * s * s) + p3 * (s * s * s)
    };
    let dx = |s: f32| {
        let t = 1.0 - s;
        3.0 * t * t * (p1.x - p0.x) + 6.0 * t * s * (p2.x - p1.x) + 3.0 * s * s * (p3.x - p2.x)
    };

    let mut s = ((frame - p0.x) / (p3.x - p0.x)).clamp(0.0, 1.0);
    for _ in 0..15 {
        let x = point(s).x;
        let d = dx(s);
        if d.abs() < 1e-6 {
            break;
        }
        let new_s = (s - (x - frame) / d).clamp(0.0, 1.0);
        if (new_s - s).abs() < 1e-6 {
            s = new_s;
            break;
        }
        s = new_s;
    }
    point(s).y
}
