//! Mocap Engine - BVH 动作捕捉重定向引擎
//!
//! 提供完整的重定向流水线：
//! - BVH / MHP 文件加载
//! - 源骨架自动识别（髋部、脊柱、四肢）
//! - T-pose 对齐与逐帧姿态传递
//! - 动画曲线操作（简化、循环、重复、拼接、位移编辑）
//! - FK/IK 互相匹配

pub mod animation;
pub mod config;
pub mod curves;
pub mod fkik;
pub mod math;
pub mod retarget;
pub mod rig;
pub mod skeleton;

pub use animation::{Action, ActionLibrary, BvhFile, ChannelKind, FCurve, Keyframe, MhpFile};
pub use config::McpSettings;
pub use retarget::{FrameSink, RetargetSession};
pub use rig::{CanonicalRole, RigManifest};
pub use skeleton::{Bone, Constraint, PoseEvaluator, Skeleton};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MocapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}", format_input_error(.message, .line))]
    InputFormat { message: String, line: Option<usize> },

    #[error("Rig mismatch: {message}")]
    RigMismatch { message: String, bone: Option<String> },

    #[error("Missing bone \"{bone}\" (referenced by {referenced_by})")]
    MissingBone { bone: String, referenced_by: String },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("State violation: {0}")]
    StateViolation(String),

    #[error("Category: {category}\n{source}")]
    Categorized {
        category: String,
        source: Box<MocapError>,
    },
}

fn format_input_error(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("Input format error at line {}: {}", line, message),
        None => format!("Input format error: {}", message),
    }
}

impl MocapError {
    pub fn input(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::InputFormat {
            message: message.into(),
            line,
        }
    }

    pub fn rig_mismatch(message: impl Into<String>, bone: Option<&str>) -> Self {
        Self::RigMismatch {
            message: message.into(),
            bone: bone.map(str::to_string),
        }
    }

    pub fn missing_bone(bone: impl Into<String>, referenced_by: impl Into<String>) -> Self {
        Self::MissingBone {
            bone: bone.into(),
            referenced_by: referenced_by.into(),
        }
    }

    /// 附加当前操作的类别（"Load BVH file" 等），已有类别时保持最内层
    pub fn in_category(self, category: impl Into<String>) -> Self {
        match self {
            categorized @ Self::Categorized { .. } => categorized,
            other => Self::Categorized {
                category: category.into(),
                source: Box::new(other),
            },
        }
    }

    /// 错误所指向的骨骼名称
    pub fn offending_bone(&self) -> Option<&str> {
        match self {
            Self::RigMismatch { bone, .. } => bone.as_deref(),
            Self::MissingBone { bone, .. } => Some(bone),
            Self::Categorized { source, .. } => source.offending_bone(),
            _ => None,
        }
    }

    /// 去掉类别包装后的错误
    pub fn kind(&self) -> &MocapError {
        match self {
            Self::Categorized { source, .. } => source.kind(),
            other => other,
        }
    }

    /// 可恢复的错误只需要警告（缺失骨骼、退化几何）
    pub fn is_survivable(&self) -> bool {
        matches!(
            self.kind(),
            Self::MissingBone { .. } | Self::DegenerateGeometry(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MocapError>;
