//! 源骨架自动识别
//!
//! 找到有三个有效子骨骼的髋部，按末端关节的 X 坐标区分右腿、脊柱、左腿，
//! 再沿唯一子骨骼向下（腿）或向上（脊柱、手臂、颈部）行走并写入规范角色。

use crate::skeleton::{CanonicalRole, Side, Skeleton};
use crate::{MocapError, Result};

/// 自动识别器
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoIdentifier {
    /// 腿链的第一节总是视为髋骨（`Hip`）
    pub reverse_hip: bool,
}

/// 有效骨骼：未隐藏、不受静音 IK 驱动、约束影响度不为零
fn is_valid(skeleton: &Skeleton, index: usize) -> bool {
    let bone = skeleton.bone(index);
    !bone.hidden && !bone.has_muted_ik() && !bone.has_zero_influence()
}

fn valid_children(skeleton: &Skeleton, index: usize) -> Vec<usize> {
    skeleton
        .children(index)
        .iter()
        .copied()
        .filter(|&c| is_valid(skeleton, c))
        .collect()
}

/// 沿唯一子骨骼行走，遇到分叉或叶子停止（链包含停止处的骨骼）
fn walk_unique(skeleton: &Skeleton, start: usize) -> Vec<usize> {
    let mut chain = vec![start];
    let mut node = start;
    loop {
        match valid_children(skeleton, node).as_slice() {
            [only] => {
                node = *only;
                chain.push(node);
            }
            _ => return chain,
        }
    }
}

/// 沿子骨骼行走；分叉时选最长的骨骼
fn walk_longest(skeleton: &Skeleton, start: usize) -> Vec<usize> {
    let mut chain = vec![start];
    let mut node = start;
    loop {
        let children = valid_children(skeleton, node);
        let next = children.iter().copied().max_by(|&a, &b| {
            skeleton
                .bone(a)
                .length
                .total_cmp(&skeleton.bone(b).length)
        });
        match next {
            Some(next) => {
                node = next;
                chain.push(node);
            }
            None => return chain,
        }
    }
}

/// 链末端关节（骨骼尾部）的 X 坐标
fn terminal_x(skeleton: &Skeleton, start: usize) -> f32 {
    let chain = walk_unique(skeleton, start);
    let last = chain[chain.len() - 1];
    skeleton.bone(last).tail.x
}

/// 按末端 X 排序三个子骨骼：(最小, 中间, 最大)
fn sort_by_terminal_x(skeleton: &Skeleton, children: &[usize]) -> (usize, usize, usize) {
    let mut sorted: Vec<(f32, usize)> = children
        .iter()
        .map(|&c| (terminal_x(skeleton, c), c))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    (sorted[0].1, sorted[1].1, sorted[2].1)
}

fn describe_candidates(skeleton: &Skeleton, candidates: &[usize]) -> String {
    candidates
        .iter()
        .map(|&i| {
            format!(
                "{}({})",
                skeleton.bone(i).name,
                valid_children(skeleton, i).len()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl AutoIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reverse_hip(reverse_hip: bool) -> Self {
        Self { reverse_hip }
    }

    /// 寻找髋部：有三个有效子骨骼的第一个骨骼
    pub fn find_hips(&self, skeleton: &Skeleton) -> Result<usize> {
        let mut visited = Vec::new();
        for &root in skeleton.roots() {
            if !is_valid(skeleton, root) {
                continue;
            }
            let mut node = root;
            loop {
                visited.push(node);
                let children = valid_children(skeleton, node);
                match children.len() {
                    3 => return Ok(node),
                    1 => node = children[0],
                    _ => break,
                }
            }
        }
        let bone = visited.last().map(|&i| skeleton.bone(i).name.clone());
        Err(MocapError::rig_mismatch(
            format!(
                "no bone with three valid children; walked {}",
                describe_candidates(skeleton, &visited)
            ),
            bone.as_deref(),
        ))
    }

    /// 识别全部角色，不修改骨架
    pub fn identify(&self, skeleton: &Skeleton) -> Result<Vec<(usize, CanonicalRole)>> {
        let mut roles = Vec::new();
        let hips = self.find_hips(skeleton)?;
        roles.push((hips, CanonicalRole::Hips));

        let (right_leg, spine, left_leg) = sort_by_terminal_x(skeleton, &valid_children(skeleton, hips));
        self.identify_leg(skeleton, right_leg, Side::Right, &mut roles)?;
        self.identify_leg(skeleton, left_leg, Side::Left, &mut roles)?;
        let top = self.identify_spine(skeleton, spine, &mut roles)?;

        let (right_arm, neck, left_arm) = sort_by_terminal_x(skeleton, &valid_children(skeleton, top));
        self.identify_arm(skeleton, right_arm, Side::Right, &mut roles)?;
        self.identify_arm(skeleton, left_arm, Side::Left, &mut roles)?;
        self.identify_neck(skeleton, neck, &mut roles);

        log::debug!(
            "骨架 {} 识别出 {} 个角色，髋部为 {}",
            skeleton.name,
            roles.len(),
            skeleton.bone(hips).name
        );
        Ok(roles)
    }

    /// 识别并写回角色，返回写入的骨骼数
    pub fn apply(&self, skeleton: &mut Skeleton) -> Result<usize> {
        let roles = self
            .identify(skeleton)
            .map_err(|e| e.in_category("Identify source armature"))?;
        skeleton.clear_roles();
        for (index, role) in &roles {
            skeleton.bone_mut(*index).role = Some(role.clone());
        }
        Ok(roles.len())
    }

    fn identify_leg(
        &self,
        skeleton: &Skeleton,
        start: usize,
        side: Side,
        roles: &mut Vec<(usize, CanonicalRole)>,
    ) -> Result<()> {
        let mut chain = walk_longest(skeleton, start);
        if self.reverse_hip || chain.len() >= 5 {
            roles.push((chain.remove(0), CanonicalRole::Hip(side)));
        }
        match chain.len() {
            0..=2 => Err(MocapError::rig_mismatch(
                format!(
                    "leg chain starting at {} has {} bones, need thigh, shin and foot",
                    skeleton.bone(start).name,
                    chain.len()
                ),
                Some(&skeleton.bone(start).name),
            )),
            n => {
                roles.push((chain[0], CanonicalRole::Thigh(side)));
                roles.push((chain[1], CanonicalRole::Shin(side)));
                roles.push((chain[2], CanonicalRole::Foot(side)));
                if n >= 4 {
                    roles.push((chain[n - 1], CanonicalRole::Toe(side)));
                } else {
                    log::warn!("腿 {} 没有脚趾骨骼", skeleton.bone(start).name);
                }
                Ok(())
            }
        }
    }

    /// 返回脊柱顶端（手臂与颈部的共同父骨骼）
    fn identify_spine(
        &self,
        skeleton: &Skeleton,
        start: usize,
        roles: &mut Vec<(usize, CanonicalRole)>,
    ) -> Result<usize> {
        let chain = walk_unique(skeleton, start);
        let top = chain[chain.len() - 1];
        let count = valid_children(skeleton, top).len();
        if count != 3 {
            return Err(MocapError::rig_mismatch(
                format!(
                    "spine top {} has {} valid children, expected 3 (arms and neck)",
                    skeleton.bone(top).name,
                    count
                ),
                Some(&skeleton.bone(top).name),
            ));
        }

        use CanonicalRole::*;
        let labels: Vec<CanonicalRole> = match chain.len() {
            1 => vec![Spine],
            2 => vec![Spine, Chest],
            3 => vec![Spine, Spine1, Chest],
            _ => vec![Spine, Spine1, Chest, Chest1],
        };
        if chain.len() > 4 {
            roles.push((chain[0], Spine));
            roles.push((chain[1], Spine1));
            roles.push((chain[chain.len() - 2], Chest));
            roles.push((chain[chain.len() - 1], Chest1));
        } else {
            roles.extend(chain.iter().copied().zip(labels));
        }
        Ok(top)
    }

    fn identify_arm(
        &self,
        skeleton: &Skeleton,
        start: usize,
        side: Side,
        roles: &mut Vec<(usize, CanonicalRole)>,
    ) -> Result<()> {
        let chain = walk_unique(skeleton, start);
        let labels = [
            CanonicalRole::Shoulder(side),
            CanonicalRole::UpperArm(side),
            CanonicalRole::Forearm(side),
            CanonicalRole::Hand(side),
        ];
        match chain.len() {
            0..=2 => Err(MocapError::rig_mismatch(
                format!(
                    "arm chain starting at {} has {} bones, need upper arm, forearm and hand",
                    skeleton.bone(start).name,
                    chain.len()
                ),
                Some(&skeleton.bone(start).name),
            )),
            3 => {
                roles.extend(chain.iter().copied().zip(labels[1..].iter().cloned()));
                Ok(())
            }
            _ => {
                roles.extend(chain.iter().copied().zip(labels));
                Ok(())
            }
        }
    }

    fn identify_neck(&self, skeleton: &Skeleton, start: usize, roles: &mut Vec<(usize, CanonicalRole)>) {
        let chain = walk_unique(skeleton, start);
        if chain.len() == 1 {
            roles.push((start, CanonicalRole::Head));
        } else {
            roles.push((chain[0], CanonicalRole::Neck));
            roles.push((chain[chain.len() - 1], CanonicalRole::Head));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::skeleton::{Bone, Constraint};
    use glam::Vec3;

    fn add(sk: &mut Skeleton, name: &str, head: Vec3, tail: Vec3, parent: Option<&str>) {
        sk.add_bone(Bone::new(name, head, tail, 0.0), parent).unwrap();
    }

    /// 类 BVH 人体骨架：root -> pelvis(三子) -> 腿/脊柱，胸部(三子) -> 手臂/颈部
    pub(crate) fn humanoid() -> Skeleton {
        let mut sk = Skeleton::new("mocap");
        add(&mut sk, "root", Vec3::new(0.0, 0.0, 0.9), Vec3::new(0.0, 0.0, 1.0), None);
        add(&mut sk, "pelvis", Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.1), Some("root"));
        for (side, x) in [("L", 1.0f32), ("R", -1.0f32)] {
            let hx = x * 0.15;
            let thigh = format!("thigh_{}", side);
            let shin = format!("shin_{}", side);
            let foot = format!("foot_{}", side);
            let toe = format!("toe_{}", side);
            add(&mut sk, &thigh, Vec3::new(hx, 0.0, 1.0), Vec3::new(hx, 0.0, 0.55), Some("pelvis"));
            add(&mut sk, &shin, Vec3::new(hx, 0.0, 0.55), Vec3::new(hx, 0.0, 0.1), Some(&thigh));
            add(&mut sk, &foot, Vec3::new(hx, 0.0, 0.1), Vec3::new(hx, -0.12, 0.02), Some(&shin));
            add(&mut sk, &toe, Vec3::new(hx, -0.12, 0.02), Vec3::new(x, -0.2, 0.0), Some(&foot));
        }
        add(&mut sk, "spine", Vec3::new(0.0, 0.0, 1.1), Vec3::new(0.0, 0.0, 1.3), Some("pelvis"));
        add(&mut sk, "chest", Vec3::new(0.0, 0.0, 1.3), Vec3::new(0.0, 0.0, 1.5), Some("spine"));
        for (side, x) in [("L", 1.0f32), ("R", -1.0f32)] {
            let clav = format!("clavicle_{}", side);
            let upper = format!("upperarm_{}", side);
            let lower = format!("lowerarm_{}", side);
            let hand = format!("hand_{}", side);
            add(&mut sk, &clav, Vec3::new(0.0, 0.0, 1.5), Vec3::new(x * 0.2, 0.0, 1.5), Some("chest"));
            add(&mut sk, &upper, Vec3::new(x * 0.2, 0.0, 1.5), Vec3::new(x * 0.5, 0.0, 1.5), Some(&clav));
            add(&mut sk, &lower, Vec3::new(x * 0.5, 0.0, 1.5), Vec3::new(x * 0.75, 0.0, 1.5), Some(&upper));
            add(&mut sk, &hand, Vec3::new(x * 0.75, 0.0, 1.5), Vec3::new(x * 0.85, 0.0, 1.5), Some(&lower));
            for finger in ["thumb", "index"] {
                let name = format!("{}_{}", finger, side);
                add(&mut sk, &name, Vec3::new(x * 0.85, 0.0, 1.5), Vec3::new(x * 0.9, 0.0, 1.5), Some(&hand));
            }
        }
        add(&mut sk, "neck", Vec3::new(0.0, 0.0, 1.5), Vec3::new(0.0, 0.0, 1.6), Some("chest"));
        add(&mut sk, "head", Vec3::new(0.0, 0.0, 1.6), Vec3::new(0.0, 0.0, 1.8), Some("neck"));
        sk
    }

    fn role_of(sk: &Skeleton, name: &str) -> Option<CanonicalRole> {
        sk.bone_by_name(name).and_then(|b| b.role.clone())
    }

    #[test]
    fn test_hips_found_through_single_child() {
        let mut sk = humanoid();
        let count = AutoIdentifier::new().apply(&mut sk).unwrap();
        assert_eq!(role_of(&sk, "pelvis"), Some(CanonicalRole::Hips));
        assert_eq!(role_of(&sk, "root"), None);
        // 末端 X 最大的链为左腿
        assert_eq!(role_of(&sk, "thigh_L"), Some(CanonicalRole::Thigh(Side::Left)));
        assert_eq!(role_of(&sk, "toe_L"), Some(CanonicalRole::Toe(Side::Left)));
        assert_eq!(role_of(&sk, "thigh_R"), Some(CanonicalRole::Thigh(Side::Right)));
        assert_eq!(role_of(&sk, "shin_R"), Some(CanonicalRole::Shin(Side::Right)));
        assert_eq!(role_of(&sk, "spine"), Some(CanonicalRole::Spine));
        assert_eq!(role_of(&sk, "chest"), Some(CanonicalRole::Chest));
        assert_eq!(role_of(&sk, "clavicle_L"), Some(CanonicalRole::Shoulder(Side::Left)));
        assert_eq!(role_of(&sk, "hand_R"), Some(CanonicalRole::Hand(Side::Right)));
        assert_eq!(role_of(&sk, "neck"), Some(CanonicalRole::Neck));
        assert_eq!(role_of(&sk, "head"), Some(CanonicalRole::Head));
        assert_eq!(role_of(&sk, "thumb_L"), None);
        assert_eq!(count, 1 + 4 * 2 + 2 + 4 * 2 + 2);
    }

    #[test]
    fn test_reverse_hip_labels_first_leg_bone() {
        let sk = humanoid();
        let roles = AutoIdentifier::with_reverse_hip(true).identify(&sk).unwrap();
        let thigh_l = sk.find_bone("thigh_L").unwrap();
        assert!(roles.contains(&(thigh_l, CanonicalRole::Hip(Side::Left))));
        let shin_l = sk.find_bone("shin_L").unwrap();
        assert!(roles.contains(&(shin_l, CanonicalRole::Thigh(Side::Left))));
    }

    #[test]
    fn test_hidden_and_muted_children_are_ignored() {
        let mut sk = humanoid();
        add(&mut sk, "tail", Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.3, 1.0), Some("pelvis"));
        add(&mut sk, "prop", Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.3, 0.9), Some("pelvis"));
        sk.bone_by_name_mut("tail").unwrap().hidden = true;
        sk.bone_by_name_mut("prop")
            .unwrap()
            .constraints
            .push(Constraint::ik("head", None, 1).muted());
        let hips = AutoIdentifier::new().find_hips(&sk).unwrap();
        assert_eq!(sk.bone(hips).name, "pelvis");
    }

    #[test]
    fn test_mismatch_names_bone_and_counts() {
        let mut sk = Skeleton::new("stick");
        add(&mut sk, "a", Vec3::ZERO, Vec3::Z, None);
        add(&mut sk, "b", Vec3::Z, Vec3::Z * 2.0, Some("a"));
        add(&mut sk, "c", Vec3::Z * 2.0, Vec3::new(1.0, 0.0, 2.0), Some("b"));
        add(&mut sk, "d", Vec3::Z * 2.0, Vec3::new(-1.0, 0.0, 2.0), Some("b"));
        let err = AutoIdentifier::new().apply(&mut sk).unwrap_err();
        assert_eq!(err.offending_bone(), Some("b"));
        let text = err.to_string();
        assert!(text.starts_with("Category: Identify source armature"));
        assert!(text.contains("a(1), b(2)"), "{}", text);
    }
}
