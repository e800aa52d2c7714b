//! 已知骨架描述的注册表

use std::path::Path;

use super::auto_identify::AutoIdentifier;
use super::manifest::{ManifestKind, RigManifest};
use crate::skeleton::Skeleton;
use crate::{MocapError, Result};

/// 认定为同一骨架所需的最小骨骼匹配比例
pub const MATCH_THRESHOLD: f32 = 0.9;

/// 目标骨架的选择方式
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TargetChoice {
    /// 先自动识别，失败时再找匹配的描述文件
    #[default]
    Automatic,
    Named(String),
}

/// 角色来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleSource {
    AutoIdentified,
    Manifest(String),
}

#[derive(Clone, Debug, Default)]
pub struct RigRegistry {
    sources: Vec<RigManifest>,
    targets: Vec<RigManifest>,
}

impl RigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, manifest: RigManifest) {
        let list = match manifest.kind {
            ManifestKind::Source => &mut self.sources,
            ManifestKind::Target => &mut self.targets,
        };
        list.retain(|m| m.name != manifest.name);
        list.push(manifest);
    }

    /// 读取目录下所有 .src / .trg 文件，返回读取数量；解析失败的文件警告后跳过
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("src" | "trg")))
            .collect();
        entries.sort();
        let mut count = 0;
        for path in entries {
            match RigManifest::load(&path) {
                Ok(manifest) => {
                    self.add(manifest);
                    count += 1;
                }
                Err(e) => log::warn!("跳过描述文件 {}: {}", path.display(), e),
            }
        }
        log::info!(
            "已加载 {} 个骨架描述（源 {}，目标 {}）",
            count,
            self.sources.len(),
            self.targets.len()
        );
        Ok(count)
    }

    pub fn sources(&self) -> &[RigManifest] {
        &self.sources
    }

    pub fn targets(&self) -> &[RigManifest] {
        &self.targets
    }

    pub fn source(&self, name: &str) -> Option<&RigManifest> {
        self.sources.iter().find(|m| m.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&RigManifest> {
        self.targets.iter().find(|m| m.name == name)
    }

    fn best_match<'a>(list: &'a [RigManifest], skeleton: &Skeleton) -> Option<&'a RigManifest> {
        list.iter()
            .map(|m| (m.match_fraction(skeleton), m))
            .filter(|(f, _)| *f >= MATCH_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, m)| m)
    }

    /// 匹配比例最高（且不低于阈值）的源骨架描述
    pub fn find_source_rig(&self, skeleton: &Skeleton) -> Option<&RigManifest> {
        Self::best_match(&self.sources, skeleton)
    }

    pub fn find_target_rig(&self, skeleton: &Skeleton) -> Option<&RigManifest> {
        Self::best_match(&self.targets, skeleton)
    }

    /// 源骨架：优先使用匹配的描述文件，否则自动识别
    pub fn assign_source_roles(&self, skeleton: &mut Skeleton, identifier: &AutoIdentifier) -> Result<RoleSource> {
        if let Some(manifest) = self.find_source_rig(skeleton) {
            manifest.apply(skeleton)?;
            log::info!("源骨架 {} 使用描述 {}", skeleton.name, manifest.name);
            return Ok(RoleSource::Manifest(manifest.name.clone()));
        }
        identifier.apply(skeleton)?;
        Ok(RoleSource::AutoIdentified)
    }

    /// 目标骨架："Automatic" 时自动识别优先，描述文件其次
    pub fn assign_target_roles(
        &self,
        skeleton: &mut Skeleton,
        choice: &TargetChoice,
        identifier: &AutoIdentifier,
    ) -> Result<RoleSource> {
        match choice {
            TargetChoice::Named(name) => {
                let manifest = self.target(name).ok_or_else(|| {
                    MocapError::rig_mismatch(format!("unknown target rig {}", name), None)
                })?;
                manifest.apply(skeleton)?;
                Ok(RoleSource::Manifest(name.clone()))
            }
            TargetChoice::Automatic => match identifier.apply(skeleton) {
                Ok(_) => Ok(RoleSource::AutoIdentified),
                Err(auto_err) => match self.find_target_rig(skeleton) {
                    Some(manifest) => {
                        log::warn!("自动识别失败，改用描述 {}: {}", manifest.name, auto_err);
                        manifest.apply(skeleton)?;
                        Ok(RoleSource::Manifest(manifest.name.clone()))
                    }
                    None => Err(auto_err),
                },
            },
        }
    }
}
