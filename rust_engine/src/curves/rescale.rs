//! 时间缩放

use std::f32::consts::PI;

use super::range::FrameRange;
use crate::animation::{Action, ChannelKind, FCurve, Keyframe};
use crate::{MocapError, Result};

/// 欧拉角跨越 ±π 的判定阈值
const WRAP_THRESHOLD: f32 = 0.8 * PI;
/// 跨越点两侧插入关键帧的半宽（帧）
const WRAP_GAP: f32 = 0.01;

/// 欧拉角曲线在 ±π 处的跳变：在跨越点两侧插入 ±π 关键帧
fn insert_wrap_keys(keys: &[Keyframe]) -> (Vec<Keyframe>, usize) {
    let mut out = Vec::with_capacity(keys.len());
    let mut inserted = 0;
    for (i, key) in keys.iter().enumerate() {
        if let Some(prev) = i.checked_sub(1).map(|p| &keys[p]) {
            let forward = prev.value > WRAP_THRESHOLD && key.value < -WRAP_THRESHOLD;
            let backward = prev.value < -WRAP_THRESHOLD && key.value > WRAP_THRESHOLD;
            if forward || backward {
                let (edge, unwrapped) = if forward {
                    (PI, key.value + 2.0 * PI)
                } else {
                    (-PI, key.value - 2.0 * PI)
                };
                let span = key.frame - prev.frame;
                let s = (edge - prev.value) / (unwrapped - prev.value);
                let crossing = prev.frame + s * span;
                let gap = WRAP_GAP.min(span / 4.0);
                out.push(Keyframe::new(crossing - gap, edge));
                out.push(Keyframe::new(crossing + gap, -edge));
                inserted += 2;
            }
        }
        out.push(*key);
    }
    (out, inserted)
}

/// 以范围内第一个关键帧为中心缩放时间，范围之后的关键帧整体平移；
/// 返回插入的跨越关键帧数
pub fn rescale_curve(curve: &mut FCurve, factor: f32, range: FrameRange) -> usize {
    if curve.needs_resort() {
        curve.resort();
    }
    let (before, inside, after) = range.split(curve.keyframes());
    let (Some(first), Some(last)) = (inside.first(), inside.last()) else {
        return 0;
    };
    let origin = first.frame;
    let shift = (last.frame - origin) * (factor - 1.0);

    let (mut scaled, inserted) = if curve.channel() == Some(ChannelKind::RotationEuler) {
        insert_wrap_keys(inside)
    } else {
        (inside.to_vec(), 0)
    };
    for key in &mut scaled {
        key.frame = origin + (key.frame - origin) * factor;
        key.handle_left = None;
        key.handle_right = None;
    }

    let mut keys = before.to_vec();
    keys.extend(scaled);
    keys.extend(after.iter().map(|k| {
        let mut k = *k;
        k.offset(shift, 0.0);
        k
    }));
    curve.set_keyframes(keys);
    inserted
}

pub fn rescale_action(action: &mut Action, factor: f32, range: Option<FrameRange>) -> Result<usize> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(MocapError::input(format!("invalid time scale factor {}", factor), None));
    }
    let range = range.unwrap_or_else(FrameRange::all);
    let inserted = action
        .fcurves_mut()
        .iter_mut()
        .map(|c| rescale_curve(c, factor, range))
        .sum();
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::InsertMode;
    use pretty_assertions::assert_eq;

    fn frames(curve: &FCurve) -> Vec<f32> {
        curve.keyframes().iter().map(|k| k.frame).collect()
    }

    #[test]
    fn test_rescale_about_first_key_and_shift_after() {
        let mut curve = FCurve::new("hips", ChannelKind::Location, 0);
        for (f, v) in [(0.0, 9.0), (10.0, 0.0), (20.0, 1.0), (30.0, 2.0)] {
            curve.insert(f, v, InsertMode::Replace);
        }
        rescale_curve(&mut curve, 0.5, FrameRange::new(10.0, 20.0));
        assert_eq!(frames(&curve), vec![0.0, 10.0, 15.0, 25.0]);
        assert_eq!(curve.evaluate(15.0), 1.0);
    }

    #[test]
    fn test_euler_wrap_keeps_angular_path() {
        let mut curve = FCurve::new("hips", ChannelKind::RotationEuler, 2);
        curve.insert(0.0, 0.9 * PI, InsertMode::Replace);
        curve.insert(2.0, -0.9 * PI, InsertMode::Replace);
        let inserted = rescale_curve(&mut curve, 2.0, FrameRange::all());
        assert_eq!(inserted, 2);
        assert_eq!(curve.len(), 4);
        // 中途经过 +π 而不是 0
        let v = curve.evaluate(1.0);
        assert!(v > 0.9 * PI && v <= PI, "{}", v);
        let v = curve.evaluate(3.0);
        assert!(v < -0.9 * PI && v >= -PI, "{}", v);
        assert!((curve.evaluate(4.0) + 0.9 * PI).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_factor() {
        let mut action = Action::new("a");
        assert!(rescale_action(&mut action, 0.0, None).is_err());
        assert_eq!(rescale_action(&mut action, 2.0, None).unwrap(), 0);
    }
}
