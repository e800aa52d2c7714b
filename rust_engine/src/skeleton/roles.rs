//! 规范骨骼角色（重定向时用于配对源骨骼与目标骨骼）

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn suffix(self) -> &'static str {
        match self {
            Side::Left => ".L",
            Side::Right => ".R",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// 规范角色；未知名称落入 `Custom`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalRole {
    Hips,
    Spine,
    Spine1,
    Chest,
    Chest1,
    Neck,
    Head,
    Shoulder(Side),
    UpperArm(Side),
    Forearm(Side),
    Hand(Side),
    Hip(Side),
    Thigh(Side),
    Shin(Side),
    Foot(Side),
    Toe(Side),
    Custom(String),
}

impl CanonicalRole {
    pub fn is_custom(&self) -> bool {
        matches!(self, CanonicalRole::Custom(_))
    }

    pub fn side(&self) -> Option<Side> {
        use CanonicalRole::*;
        match self {
            Shoulder(s) | UpperArm(s) | Forearm(s) | Hand(s) | Hip(s) | Thigh(s) | Shin(s)
            | Foot(s) | Toe(s) => Some(*s),
            _ => None,
        }
    }

    /// 左右镜像
    pub fn mirrored(&self) -> CanonicalRole {
        use CanonicalRole::*;
        match self {
            Shoulder(s) => Shoulder(s.opposite()),
            UpperArm(s) => UpperArm(s.opposite()),
            Forearm(s) => Forearm(s.opposite()),
            Hand(s) => Hand(s.opposite()),
            Hip(s) => Hip(s.opposite()),
            Thigh(s) => Thigh(s.opposite()),
            Shin(s) => Shin(s.opposite()),
            Foot(s) => Foot(s.opposite()),
            Toe(s) => Toe(s.opposite()),
            other => other.clone(),
        }
    }

    pub fn name(&self) -> String {
        use CanonicalRole::*;
        let (base, side) = match self {
            Hips => ("hips", None),
            Spine => ("spine", None),
            Spine1 => ("spine-1", None),
            Chest => ("chest", None),
            Chest1 => ("chest-1", None),
            Neck => ("neck", None),
            Head => ("head", None),
            Shoulder(s) => ("shoulder", Some(*s)),
            UpperArm(s) => ("upper_arm", Some(*s)),
            Forearm(s) => ("forearm", Some(*s)),
            Hand(s) => ("hand", Some(*s)),
            Hip(s) => ("hip", Some(*s)),
            Thigh(s) => ("thigh", Some(*s)),
            Shin(s) => ("shin", Some(*s)),
            Foot(s) => ("foot", Some(*s)),
            Toe(s) => ("toe", Some(*s)),
            Custom(name) => return name.clone(),
        };
        match side {
            Some(side) => format!("{}{}", base, side.suffix()),
            None => base.to_string(),
        }
    }

    /// 全部内置角色
    pub fn all() -> Vec<CanonicalRole> {
        use CanonicalRole::*;
        let mut roles = vec![Hips, Spine, Spine1, Chest, Chest1, Neck, Head];
        for side in [Side::Left, Side::Right] {
            roles.extend([
                Shoulder(side),
                UpperArm(side),
                Forearm(side),
                Hand(side),
                Hip(side),
                Thigh(side),
                Shin(side),
                Foot(side),
                Toe(side),
            ]);
        }
        roles
    }
}

impl fmt::Display for CanonicalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for CanonicalRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use CanonicalRole::*;
        let s = s.trim();
        let (base, side) = if let Some(base) = s.strip_suffix(".L") {
            (base, Some(Side::Left))
        } else if let Some(base) = s.strip_suffix(".R") {
            (base, Some(Side::Right))
        } else {
            (s, None)
        };
        let role = match (base, side) {
            ("hips", None) => Hips,
            ("spine", None) => Spine,
            ("spine-1", None) => Spine1,
            ("chest", None) => Chest,
            ("chest-1", None) => Chest1,
            ("neck", None) => Neck,
            ("head", None) => Head,
            ("shoulder", Some(side)) => Shoulder(side),
            ("upper_arm", Some(side)) => UpperArm(side),
            ("forearm", Some(side)) => Forearm(side),
            ("hand", Some(side)) => Hand(side),
            ("hip", Some(side)) => Hip(side),
            ("thigh", Some(side)) => Thigh(side),
            ("shin", Some(side)) => Shin(side),
            ("foot", Some(side)) => Foot(side),
            ("toe", Some(side)) => Toe(side),
            _ => Custom(s.to_string()),
        };
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for role in CanonicalRole::all() {
            let parsed: CanonicalRole = role.name().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_unknown_falls_through() {
        let role: CanonicalRole = "tail-3".parse().unwrap();
        assert_eq!(role, CanonicalRole::Custom("tail-3".into()));
        assert!(role.is_custom());
        assert_eq!(role.side(), None);
    }

    #[test]
    fn test_mirror() {
        assert_eq!(
            CanonicalRole::Thigh(Side::Left).mirrored(),
            CanonicalRole::Thigh(Side::Right)
        );
        assert_eq!(CanonicalRole::Neck.mirrored(), CanonicalRole::Neck);
    }
}
