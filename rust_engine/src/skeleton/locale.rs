//! 骨骼名称本地化映射

use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::armature::Skeleton;
use crate::{MocapError, Result};

/// 不可变的重命名表，加载一次后整体应用
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocaleMap {
    renames: HashMap<String, String>,
}

impl LocaleMap {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            renames: pairs
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// 每行 `旧名 新名`，`#` 开头为注释
    pub fn parse(text: &str) -> Result<Self> {
        let mut renames = HashMap::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() != 2 {
                return Err(MocapError::input(
                    format!("expected `old new`, got {:?}", line),
                    Some(line_no + 1),
                ));
            }
            renames.insert(words[0].to_string(), words[1].to_string());
        }
        Ok(Self { renames })
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.renames.get(name).map(String::as_str)
    }

    /// 重命名骨骼及所有约束引用；先整体校验，失败时骨架保持不变
    pub fn apply(&self, skeleton: &mut Skeleton) -> Result<usize> {
        let applicable: HashMap<String, String> = self
            .renames
            .iter()
            .filter(|(old, new)| old != new && skeleton.find_bone(old).is_some())
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();

        let mut final_names = HashSet::new();
        for bone in skeleton.bones() {
            let name = applicable.get(&bone.name).unwrap_or(&bone.name);
            if !final_names.insert(name.clone()) {
                return Err(MocapError::rig_mismatch(
                    format!("rename produces duplicate bone name {}", name),
                    Some(&bone.name),
                ));
            }
        }
        skeleton.check_references()?;

        skeleton.apply_renames(&applicable);
        log::info!("骨骼重命名: {} 个", applicable.len());
        Ok(applicable.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::armature::tests::chain;
    use crate::skeleton::constraint::Constraint;

    #[test]
    fn test_rename_rewrites_subtargets() {
        let mut sk = chain();
        sk.bone_mut(0)
            .constraints
            .push(Constraint::ik("tip", Some("mid"), 2));
        let map = LocaleMap::parse("# comment\nmid Elbow\ntip Hand\nmissing X\n").unwrap();
        assert_eq!(map.apply(&mut sk).unwrap(), 2);
        assert_eq!(sk.find_bone("Elbow"), Some(1));
        assert_eq!(sk.find_bone("mid"), None);
        assert_eq!(
            sk.bone(0).constraints[0].referenced_bones(),
            vec!["Hand", "Elbow"]
        );
    }

    #[test]
    fn test_collision_leaves_skeleton_untouched() {
        let mut sk = chain();
        let map = LocaleMap::new([("mid", "tip")]);
        assert!(map.apply(&mut sk).is_err());
        assert_eq!(sk.find_bone("mid"), Some(1));
        assert_eq!(sk.find_bone("tip"), Some(2));
    }

    #[test]
    fn test_parse_rejects_bad_line() {
        let err = LocaleMap::parse("a b\nc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
