//! 骨架（骨骼森林）

use std::collections::HashMap;

use glam::Mat4;

use super::bone::Bone;
use super::constraint::ConstraintKind;
use super::roles::CanonicalRole;
use crate::{MocapError, Result};

/// 重定向父级判定：COPY_* 约束的最低影响度
const COPY_PARENT_INFLUENCE: f32 = 0.8;

/// 骨架
///
/// 添加骨骼时父骨骼必须已存在，因此骨骼图始终是森林。
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    pub name: String,
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    roots: Vec<usize>,
    /// 父骨骼在前的遍历顺序
    sorted_indices: Vec<usize>,
    /// 可见骨骼层位掩码
    pub visible_layers: u32,
}

impl Skeleton {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible_layers: 1,
            ..Default::default()
        }
    }

    /// 添加骨骼；父骨骼按名称引用且必须已存在
    pub fn add_bone(&mut self, mut bone: Bone, parent: Option<&str>) -> Result<usize> {
        if self.name_to_index.contains_key(&bone.name) {
            return Err(MocapError::input(
                format!("duplicate bone name {}", bone.name),
                None,
            ));
        }
        let parent_index = match parent {
            Some(parent_name) => Some(
                self.find_bone(parent_name)
                    .ok_or_else(|| MocapError::missing_bone(parent_name, &bone.name))?,
            ),
            None => None,
        };
        let index = self.bones.len();
        bone.parent = parent_index;
        bone.children.clear();
        self.name_to_index.insert(bone.name.clone(), index);
        self.bones.push(bone);
        self.build_hierarchy();
        Ok(index)
    }

    /// 修改父级；新父级不能是自身的后代
    pub fn set_parent(&mut self, index: usize, parent: Option<usize>) -> Result<()> {
        if let Some(p) = parent {
            if p == index || self.is_ancestor(index, p) {
                return Err(MocapError::rig_mismatch(
                    format!(
                        "cannot parent {} to its descendant {}",
                        self.bones[index].name, self.bones[p].name
                    ),
                    Some(&self.bones[index].name),
                ));
            }
        }
        self.bones[index].parent = parent;
        self.build_hierarchy();
        Ok(())
    }

    /// ancestor 是否为 index 的祖先
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut current = self.bones.get(index).and_then(|b| b.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.bones[p].parent;
        }
        false
    }

    /// 重建子列表、遍历顺序与相对矩阵
    pub fn build_hierarchy(&mut self) {
        for bone in &mut self.bones {
            bone.children.clear();
        }
        self.roots.clear();
        for i in 0..self.bones.len() {
            match self.bones[i].parent {
                Some(p) => self.bones[p].children.push(i),
                None => self.roots.push(i),
            }
        }

        self.sorted_indices.clear();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            self.sorted_indices.push(i);
            stack.extend(self.bones[i].children.iter().rev().copied());
        }

        for i in 0..self.bones.len() {
            self.bones[i].matrix_relative = self.relative_matrix(i);
        }
        self.refresh_stretch_lengths();
    }

    /// StretchTo 的 rest_length 始终由当前几何计算
    fn refresh_stretch_lengths(&mut self) {
        for i in 0..self.bones.len() {
            let head = self.bones[i].head;
            let mut updates = Vec::new();
            for (ci, c) in self.bones[i].constraints.iter().enumerate() {
                if let ConstraintKind::StretchTo { subtarget, .. } = &c.kind {
                    if let Some(target) = self.bone_by_name(subtarget) {
                        updates.push((ci, (target.head - head).length()));
                    }
                }
            }
            for (ci, length) in updates {
                if let ConstraintKind::StretchTo { rest_length, .. } =
                    &mut self.bones[i].constraints[ci].kind
                {
                    *rest_length = length;
                }
            }
        }
    }

    /// parent.rest⁻¹ · rest；根骨骼返回 rest
    pub fn relative_matrix(&self, index: usize) -> Mat4 {
        let bone = &self.bones[index];
        match bone.parent {
            Some(p) => self.bones[p].matrix_rest.inverse() * bone.matrix_rest,
            None => bone.matrix_rest,
        }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// 修改非结构属性（层级改动请用 set_parent）
    pub fn bone_mut(&mut self, index: usize) -> &mut Bone {
        &mut self.bones[index]
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.find_bone(name).map(|i| &self.bones[i])
    }

    pub fn bone_by_name_mut(&mut self, name: &str) -> Option<&mut Bone> {
        let index = self.find_bone(name)?;
        Some(&mut self.bones[index])
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// 父骨骼在前的顺序
    pub fn sorted_indices(&self) -> &[usize] {
        &self.sorted_indices
    }

    pub fn children(&self, index: usize) -> &[usize] {
        &self.bones[index].children
    }

    /// 按比例缩放整个骨架
    pub fn rescale(&mut self, scale: f32) {
        for bone in &mut self.bones {
            bone.rescale(scale);
        }
        self.build_hierarchy();
    }

    /// 骨骼头尾的竖直跨度（Z 轴向上）
    pub fn height(&self) -> f32 {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for bone in &self.bones {
            min = min.min(bone.head.z).min(bone.tail.z);
            max = max.max(bone.head.z).max(bone.tail.z);
        }
        if self.bones.is_empty() {
            0.0
        } else {
            max - min
        }
    }

    /// 按角色查找骨骼
    pub fn find_role(&self, role: &CanonicalRole) -> Option<usize> {
        self.bones.iter().position(|b| b.role.as_ref() == Some(role))
    }

    pub fn role_map(&self) -> HashMap<CanonicalRole, usize> {
        self.bones
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.role.clone().map(|r| (r, i)))
            .collect()
    }

    pub fn clear_roles(&mut self) {
        for bone in &mut self.bones {
            bone.role = None;
        }
    }

    /// 重定向父级：显式覆盖，否则为最近的有角色祖先，
    /// 或祖先上高影响度 COPY_* 约束的目标骨骼
    pub fn retarget_parent(&self, index: usize) -> Option<usize> {
        let bone = &self.bones[index];
        if let Some(name) = &bone.retarget_parent {
            if let Some(p) = self.find_bone(name) {
                if p != index && !self.is_ancestor(index, p) {
                    return Some(p);
                }
            }
            log::warn!("骨骼 {} 的重定向父级 {} 无效", bone.name, name);
        }
        let mut current = bone.parent;
        while let Some(p) = current {
            let ancestor = &self.bones[p];
            if ancestor.role.is_some() {
                return Some(p);
            }
            for c in &ancestor.constraints {
                if c.is_copy() && c.influence > COPY_PARENT_INFLUENCE && !c.mute {
                    if let Some(target) = c.subtarget().and_then(|n| self.find_bone(n)) {
                        if target != index && !self.is_ancestor(index, target) {
                            return Some(target);
                        }
                    }
                }
            }
            current = ancestor.parent;
        }
        None
    }

    /// 重命名（由 LocaleMap 批量调用以保证原子性）
    pub(crate) fn apply_renames(&mut self, renames: &HashMap<String, String>) {
        let lookup = |name: &str| renames.get(name).cloned();
        for bone in &mut self.bones {
            if let Some(new_name) = lookup(&bone.name) {
                bone.name = new_name;
            }
            if let Some(parent) = bone.retarget_parent.as_mut() {
                if let Some(new_name) = lookup(parent) {
                    *parent = new_name;
                }
            }
            for c in &mut bone.constraints {
                c.rename_references(lookup);
            }
        }
        self.name_to_index = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();
    }

    /// 检查所有约束引用的骨骼都存在
    pub fn check_references(&self) -> Result<()> {
        for bone in &self.bones {
            for c in &bone.constraints {
                for name in c.referenced_bones() {
                    if self.find_bone(name).is_none() {
                        return Err(MocapError::missing_bone(name, &bone.name));
                    }
                }
            }
        }
        Ok(())
    }
}
