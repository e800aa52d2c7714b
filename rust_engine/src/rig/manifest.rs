//! 骨架描述文件（.src 源骨架 / .trg 目标骨架）
//!
//! ```text
//! Name: CMU
//! T-pose: tposes/cmu.json
//!
//! Armature:
//!   Hips      hips
//!   LeftUpLeg thigh.L
//!
//! IkBones:
//!   hand.ik.L hand.L
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::skeleton::{CanonicalRole, Skeleton};
use crate::{MocapError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManifestKind {
    #[default]
    Source,
    Target,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Bones,
    IkBones,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RigManifest {
    pub name: String,
    pub kind: ManifestKind,
    /// (骨骼名, 角色)
    pub bones: Vec<(String, CanonicalRole)>,
    pub ik_bones: Vec<(String, CanonicalRole)>,
    pub t_pose: Option<PathBuf>,
}

/// `骨骼名 角色`，骨骼名可以包含空格
fn parse_pair(line: &str, line_no: usize) -> Result<(String, CanonicalRole)> {
    let (bone, role) = line
        .trim()
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| MocapError::input(format!("expected \"bone role\", got {:?}", line.trim()), Some(line_no)))?;
    let role: CanonicalRole = match role.parse() {
        Ok(role) => role,
        Err(never) => match never {},
    };
    Ok((bone.trim().to_string(), role))
}

impl RigManifest {
    pub fn new(name: impl Into<String>, kind: ManifestKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// 加载描述文件；类型由扩展名决定，T-pose 路径相对于描述文件所在目录
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let kind = match path.extension().and_then(|e| e.to_str()) {
            Some("trg") => ManifestKind::Target,
            Some("src") => ManifestKind::Source,
            _ => {
                return Err(MocapError::input(
                    format!("{} is not a .src or .trg file", path.display()),
                    None,
                ))
            }
        };
        let text = std::fs::read_to_string(path)?;
        let mut manifest = Self::parse(&text, kind)?;
        if let (Some(t_pose), Some(dir)) = (manifest.t_pose.as_mut(), path.parent()) {
            if t_pose.is_relative() {
                *t_pose = dir.join(&*t_pose);
            }
        }
        if manifest.name.is_empty() {
            manifest.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(manifest)
    }

    pub fn parse(text: &str, kind: ManifestKind) -> Result<Self> {
        let mut manifest = Self::new(String::new(), kind);
        let mut block = Block::None;

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.starts_with('#') {
                continue;
            }
            if line.is_empty() {
                block = Block::None;
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                match key.trim() {
                    "Name" => {
                        manifest.name = value.to_string();
                        continue;
                    }
                    "T-pose" => {
                        manifest.t_pose = (!value.is_empty()).then(|| PathBuf::from(value));
                        continue;
                    }
                    "Armature" | "Bones" if value.is_empty() => {
                        block = Block::Bones;
                        continue;
                    }
                    "IkBones" if value.is_empty() => {
                        block = Block::IkBones;
                        continue;
                    }
                    _ if block == Block::None => {
                        log::warn!("描述文件第 {} 行未知键: {}", line_no, key.trim());
                        continue;
                    }
                    _ => {}
                }
            }
            match block {
                Block::Bones => manifest.bones.push(parse_pair(line, line_no)?),
                Block::IkBones => manifest.ik_bones.push(parse_pair(line, line_no)?),
                Block::None => {
                    return Err(MocapError::input(
                        format!("unexpected line outside of a block: {:?}", line),
                        Some(line_no),
                    ))
                }
            }
        }
        Ok(manifest)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Name: {}", self.name);
        if let Some(t_pose) = &self.t_pose {
            let _ = writeln!(out, "T-pose: {}", t_pose.display());
        }
        out.push_str("\nArmature:\n");
        for (bone, role) in &self.bones {
            let _ = writeln!(out, "  {} {}", bone, role.name());
        }
        if !self.ik_bones.is_empty() {
            out.push_str("\nIkBones:\n");
            for (bone, role) in &self.ik_bones {
                let _ = writeln!(out, "  {} {}", bone, role.name());
            }
        }
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn role_of(&self, bone: &str) -> Option<&CanonicalRole> {
        self.bones.iter().find(|(b, _)| b == bone).map(|(_, r)| r)
    }

    pub fn bone_for(&self, role: &CanonicalRole) -> Option<&str> {
        self.bones
            .iter()
            .find(|(_, r)| r == role)
            .map(|(b, _)| b.as_str())
    }

    /// 描述文件中的骨骼在骨架里出现的比例
    pub fn match_fraction(&self, skeleton: &Skeleton) -> f32 {
        if self.bones.is_empty() {
            return 0.0;
        }
        let found = self
            .bones
            .iter()
            .filter(|(b, _)| skeleton.find_bone(b).is_some())
            .count();
        found as f32 / self.bones.len() as f32
    }

    /// 写入角色，返回写入数；缺失的骨骼只警告
    pub fn apply(&self, skeleton: &mut Skeleton) -> Result<usize> {
        skeleton.clear_roles();
        let mut applied = 0;
        for (bone, role) in &self.bones {
            match skeleton.bone_by_name_mut(bone) {
                Some(b) => {
                    b.role = Some(role.clone());
                    applied += 1;
                }
                None => {
                    let err = MocapError::missing_bone(bone, format!("rig {}", self.name));
                    log::warn!("{}", err);
                }
            }
        }
        if applied == 0 && !self.bones.is_empty() {
            return Err(MocapError::rig_mismatch(
                format!("rig {} matches no bone of {}", self.name, skeleton.name),
                None,
            ));
        }
        Ok(applied)
    }
}
