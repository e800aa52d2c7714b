//! 动画曲线：单个 (骨骼, 通道, 分量) 上的关键帧序列

use std::fmt;
use std::str::FromStr;

use super::keyframe::{interpolate, Keyframe};

/// 同一帧判定容差
pub const FRAME_EPSILON: f32 = 1e-4;

/// 通道类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    Location,
    RotationQuaternion,
    RotationEuler,
    Scale,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Location,
        ChannelKind::RotationQuaternion,
        ChannelKind::RotationEuler,
        ChannelKind::Scale,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Location => "location",
            ChannelKind::RotationQuaternion => "rotation_quaternion",
            ChannelKind::RotationEuler => "rotation_euler",
            ChannelKind::Scale => "scale",
        }
    }

    /// 分量个数
    pub fn components(self) -> usize {
        match self {
            ChannelKind::RotationQuaternion => 4,
            _ => 3,
        }
    }

    pub fn is_rotation(self) -> bool {
        matches!(
            self,
            ChannelKind::RotationQuaternion | ChannelKind::RotationEuler
        )
    }

    /// 各分量的默认值
    pub fn default_value(self, index: usize) -> f32 {
        match (self, index) {
            (ChannelKind::RotationQuaternion, 0) | (ChannelKind::Scale, _) => 1.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown channel {}", s))
    }
}

/// 构造数据路径 `pose.bones["name"].channel`
pub fn data_path(bone: &str, kind: ChannelKind) -> String {
    format!("pose.bones[\"{}\"].{}", bone, kind.as_str())
}

/// 解析数据路径，返回 (骨骼名, 通道)
pub fn parse_data_path(path: &str) -> Option<(&str, ChannelKind)> {
    let rest = path.strip_prefix("pose.bones[\"")?;
    let end = rest.find("\"]")?;
    let bone = &rest[..end];
    let channel = rest[end + 2..].strip_prefix('.')?;
    Some((bone, channel.parse().ok()?))
}

/// 插入模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// 有序插入，同帧替换
    #[default]
    Replace,
    /// 直接追加，结束后需要 resort
    Fast,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FCurve {
    pub data_path: String,
    pub array_index: usize,
    keyframes: Vec<Keyframe>,
    unsorted: bool,
}

impl FCurve {
    pub fn new(bone: &str, kind: ChannelKind, array_index: usize) -> Self {
        Self {
            data_path: data_path(bone, kind),
            array_index,
            keyframes: Vec::new(),
            unsorted: false,
        }
    }

    pub fn bone_name(&self) -> Option<&str> {
        parse_data_path(&self.data_path).map(|(bone, _)| bone)
    }

    pub fn channel(&self) -> Option<ChannelKind> {
        parse_data_path(&self.data_path).map(|(_, kind)| kind)
    }

    pub fn matches(&self, bone: &str, kind: ChannelKind, array_index: usize) -> bool {
        self.array_index == array_index
            && parse_data_path(&self.data_path) == Some((bone, kind))
    }

    pub fn set_bone_name(&mut self, bone: &str) {
        if let Some(kind) = self.channel() {
            self.data_path = data_path(bone, kind);
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// 直接修改关键帧；调用者负责保持有序或随后调用 resort
    pub fn keyframes_mut(&mut self) -> &mut Vec<Keyframe> {
        &mut self.keyframes
    }

    pub fn set_keyframes(&mut self, keyframes: Vec<Keyframe>) {
        self.keyframes = keyframes;
        self.resort();
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn needs_resort(&self) -> bool {
        self.unsorted
    }

    pub fn insert(&mut self, frame: f32, value: f32, mode: InsertMode) {
        self.insert_key(Keyframe::new(frame, value), mode);
    }

    pub fn insert_key(&mut self, key: Keyframe, mode: InsertMode) {
        match mode {
            InsertMode::Fast => {
                self.keyframes.push(key);
                self.unsorted = true;
            }
            InsertMode::Replace => {
                if self.unsorted {
                    self.resort();
                }
                let pos = self
                    .keyframes
                    .partition_point(|k| k.frame < key.frame - FRAME_EPSILON);
                match self.keyframes.get_mut(pos) {
                    Some(existing) if (existing.frame - key.frame).abs() <= FRAME_EPSILON => {
                        *existing = key;
                    }
                    _ => self.keyframes.insert(pos, key),
                }
            }
        }
    }

    /// 稳定排序；同一帧保留最后插入的关键帧
    pub fn resort(&mut self) {
        self.keyframes.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        let mut deduped: Vec<Keyframe> = Vec::with_capacity(self.keyframes.len());
        for key in self.keyframes.drain(..) {
            match deduped.last_mut() {
                Some(last) if (last.frame - key.frame).abs() <= FRAME_EPSILON => *last = key,
                _ => deduped.push(key),
            }
        }
        self.keyframes = deduped;
        self.unsorted = false;
    }

    /// 求值；区间外取端点值，空曲线返回 None
    pub fn evaluate_opt(&self, frame: f32) -> Option<f32> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if frame <= first.frame {
            return Some(first.value);
        }
        if frame >= last.frame {
            return Some(last.value);
        }
        let next = self.keyframes.partition_point(|k| k.frame <= frame);
        let key = &self.keyframes[next - 1];
        Some(interpolate(key, &self.keyframes[next], frame))
    }

    pub fn evaluate(&self, frame: f32) -> f32 {
        self.evaluate_opt(frame).unwrap_or(0.0)
    }

    pub fn frame_range(&self) -> Option<(f32, f32)> {
        Some((self.keyframes.first()?.frame, self.keyframes.last()?.frame))
    }

    /// 某一帧上的关键帧下标
    pub fn key_index_at(&self, frame: f32) -> Option<usize> {
        self.keyframes
            .iter()
            .position(|k| (k.frame - frame).abs() <= FRAME_EPSILON)
    }

    /// 删除 [min, max] 内的关键帧
    pub fn remove_range(&mut self, min: f32, max: f32) -> usize {
        let before = self.keyframes.len();
        self.keyframes
            .retain(|k| k.frame < min - FRAME_EPSILON || k.frame > max + FRAME_EPSILON);
        before - self.keyframes.len()
    }
}
