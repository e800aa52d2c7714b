//! 骨骼约束记录
//!
//! 重定向本身不执行约束，只读取它们（旋转限制、重定向父级、IK 链），
//! 并在重定向期间临时修改影响度。

/// 约束的计算空间
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Space {
    #[default]
    World,
    Pose,
    LocalWithParent,
    Local,
}

/// 单轴旋转限制
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct AxisLimit {
    pub enabled: bool,
    pub min: f32,
    pub max: f32,
}

impl AxisLimit {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            enabled: true,
            min,
            max,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if self.enabled {
            value.clamp(self.min.min(self.max), self.max.max(self.min))
        } else {
            value
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintKind {
    CopyRotation {
        subtarget: String,
        use_axes: [bool; 3],
    },
    CopyLocation {
        subtarget: String,
        use_axes: [bool; 3],
    },
    CopyTransforms {
        subtarget: String,
    },
    StretchTo {
        subtarget: String,
        /// 加载时由骨骼几何重新计算，不持久化
        rest_length: f32,
    },
    DampedTrack {
        subtarget: String,
    },
    TrackTo {
        subtarget: String,
    },
    LimitRotation {
        limits: [AxisLimit; 3],
    },
    LimitLocation {
        limits: [AxisLimit; 3],
    },
    Ik {
        subtarget: String,
        pole_subtarget: Option<String>,
        pole_angle: f32,
        chain_count: usize,
        iterations: u32,
    },
    ChildOf {
        subtarget: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub influence: f32,
    pub owner_space: Space,
    pub target_space: Space,
    pub mute: bool,
}

impl Constraint {
    pub fn new(name: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            name: name.into(),
            kind,
            influence: 1.0,
            owner_space: Space::World,
            target_space: Space::World,
            mute: false,
        }
    }

    pub fn with_influence(mut self, influence: f32) -> Self {
        self.influence = influence.clamp(0.0, 1.0);
        self
    }

    pub fn with_owner_space(mut self, space: Space) -> Self {
        self.owner_space = space;
        self
    }

    pub fn muted(mut self) -> Self {
        self.mute = true;
        self
    }

    pub fn ik(subtarget: &str, pole: Option<&str>, chain_count: usize) -> Self {
        Self::new(
            "IK",
            ConstraintKind::Ik {
                subtarget: subtarget.to_string(),
                pole_subtarget: pole.map(str::to_string),
                pole_angle: 0.0,
                chain_count,
                iterations: 500,
            },
        )
    }

    pub fn limit_rotation(limits: [AxisLimit; 3]) -> Self {
        Self::new("Limit Rotation", ConstraintKind::LimitRotation { limits })
            .with_owner_space(Space::Local)
    }

    pub fn is_ik(&self) -> bool {
        matches!(self.kind, ConstraintKind::Ik { .. })
    }

    pub fn is_limit_rotation(&self) -> bool {
        matches!(self.kind, ConstraintKind::LimitRotation { .. })
    }

    /// COPY_* 类约束
    pub fn is_copy(&self) -> bool {
        matches!(
            self.kind,
            ConstraintKind::CopyRotation { .. }
                | ConstraintKind::CopyLocation { .. }
                | ConstraintKind::CopyTransforms { .. }
        )
    }

    /// 是否处于有效状态
    pub fn is_active(&self) -> bool {
        !self.mute && self.influence > 0.0
    }

    /// 主目标骨骼
    pub fn subtarget(&self) -> Option<&str> {
        use ConstraintKind::*;
        match &self.kind {
            CopyRotation { subtarget, .. }
            | CopyLocation { subtarget, .. }
            | CopyTransforms { subtarget }
            | StretchTo { subtarget, .. }
            | DampedTrack { subtarget }
            | TrackTo { subtarget }
            | Ik { subtarget, .. }
            | ChildOf { subtarget } => Some(subtarget.as_str()),
            LimitRotation { .. } | LimitLocation { .. } => None,
        }
    }

    /// 所有引用的骨骼（主目标 + 极向目标）
    pub fn referenced_bones(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.subtarget().into_iter().collect();
        if let ConstraintKind::Ik {
            pole_subtarget: Some(pole),
            ..
        } = &self.kind
        {
            names.push(pole.as_str());
        }
        names
    }

    /// 按映射改写引用的骨骼名称
    pub fn rename_references(&mut self, rename: impl Fn(&str) -> Option<String>) {
        use ConstraintKind::*;
        match &mut self.kind {
            CopyRotation { subtarget, .. }
            | CopyLocation { subtarget, .. }
            | CopyTransforms { subtarget }
            | StretchTo { subtarget, .. }
            | DampedTrack { subtarget }
            | TrackTo { subtarget }
            | ChildOf { subtarget } => {
                if let Some(new_name) = rename(subtarget) {
                    *subtarget = new_name;
                }
            }
            Ik {
                subtarget,
                pole_subtarget,
                ..
            } => {
                if let Some(new_name) = rename(subtarget) {
                    *subtarget = new_name;
                }
                if let Some(pole) = pole_subtarget {
                    if let Some(new_name) = rename(pole) {
                        *pole = new_name;
                    }
                }
            }
            LimitRotation { .. } | LimitLocation { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_and_rename() {
        let mut c = Constraint::ik("hand.ik.L", Some("elbow.pt.L"), 2);
        assert_eq!(c.referenced_bones(), vec!["hand.ik.L", "elbow.pt.L"]);
        c.rename_references(|name| name.strip_suffix(".L").map(|b| format!("{}_left", b)));
        assert_eq!(c.referenced_bones(), vec!["hand.ik_left", "elbow.pt_left"]);
    }

    #[test]
    fn test_axis_limit_clamp() {
        let limit = AxisLimit::new(-0.5, 1.0);
        assert_eq!(limit.clamp(2.0), 1.0);
        assert_eq!(limit.clamp(-2.0), -0.5);
        assert_eq!(AxisLimit::default().clamp(9.0), 9.0);
    }

    #[test]
    fn test_active_flags() {
        let c = Constraint::limit_rotation([AxisLimit::default(); 3]);
        assert!(c.is_active());
        assert!(c.is_limit_rotation());
        assert!(!c.clone().muted().is_active());
        assert!(!c.with_influence(0.0).is_active());
    }
}
