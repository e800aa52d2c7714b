//! 骨架识别：自动识别、骨架描述文件与注册表

mod auto_identify;
mod manifest;
mod registry;

pub use crate::skeleton::{CanonicalRole, Side};
pub use auto_identify::AutoIdentifier;
pub use manifest::{ManifestKind, RigManifest};
pub use registry::{RigRegistry, RoleSource, TargetChoice, MATCH_THRESHOLD};

#[cfg(test)]
pub(crate) use auto_identify::tests::humanoid as test_humanoid;
