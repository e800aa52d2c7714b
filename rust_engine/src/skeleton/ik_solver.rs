//! IK 求解器
//!
//! 两节链且有极向目标时使用解析解，其余情况使用 CCD 迭代。
//! 求解器只计算链上骨骼的目标世界旋转，写回局部姿态由调用方完成。

use glam::{Mat4, Quat, Vec3};

use super::armature::Skeleton;
use super::constraint::ConstraintKind;
use crate::math::{rotation_arc, rotation_part, translation_of};

/// 单次 CCD 步进的最大角度
const DEFAULT_LIMIT_ANGLE: f32 = 0.5;

/// IK 求解器
#[derive(Clone, Debug)]
pub struct IkSolver {
    /// 约束所在骨骼（链末端）
    pub bone_index: usize,
    /// 链上骨骼，末端在前
    pub chain: Vec<usize>,
    pub target: usize,
    pub pole: Option<usize>,
    pub pole_angle: f32,
    pub iterations: u32,
    pub limit_angle: f32,
    pub influence: f32,
}

impl IkSolver {
    /// 从骨骼上生效的 IK 约束创建
    pub fn from_bone(skeleton: &Skeleton, bone_index: usize) -> Option<Self> {
        let bone = skeleton.get_bone(bone_index)?;
        let constraint = bone
            .constraints
            .iter()
            .find(|c| c.is_ik() && c.is_active())?;
        let ConstraintKind::Ik {
            subtarget,
            pole_subtarget,
            pole_angle,
            chain_count,
            iterations,
        } = &constraint.kind
        else {
            return None;
        };

        let target = skeleton.find_bone(subtarget)?;
        let pole = pole_subtarget.as_deref().and_then(|p| skeleton.find_bone(p));

        let mut chain = vec![bone_index];
        let mut current = bone.parent;
        while let Some(p) = current {
            if *chain_count > 0 && chain.len() >= *chain_count {
                break;
            }
            chain.push(p);
            current = skeleton.bone(p).parent;
        }
        // 目标骨骼不能受链自身驱动
        if chain.iter().any(|&c| c == target || skeleton.is_ancestor(c, target)) {
            log::warn!("IK 目标 {} 位于链 {} 之下，跳过", subtarget, bone.name);
            return None;
        }

        Some(Self {
            bone_index,
            chain,
            target,
            pole,
            pole_angle: *pole_angle,
            iterations: (*iterations).max(1),
            limit_angle: DEFAULT_LIMIT_ANGLE,
            influence: constraint.influence,
        })
    }

    /// 求解，返回链上骨骼（根在前）的目标世界旋转
    pub fn solve(&self, skeleton: &Skeleton, world: &[Mat4]) -> Vec<(usize, Quat)> {
        let goal = translation_of(&world[self.target]);
        let original: Vec<Quat> = self
            .chain
            .iter()
            .map(|&i| Quat::from_mat3(&rotation_part(&world[i])).normalize())
            .collect();

        let solved = match (self.chain.len(), self.pole) {
            (2, Some(pole)) => self
                .solve_two_bone(skeleton, world, goal, translation_of(&world[pole]))
                .unwrap_or_else(|| self.solve_ccd(skeleton, world, goal)),
            _ => self.solve_ccd(skeleton, world, goal),
        };

        let mut out: Vec<(usize, Quat)> = self
            .chain
            .iter()
            .zip(original.iter().zip(solved))
            .map(|(&i, (&from, to))| (i, from.slerp(to, self.influence).normalize()))
            .collect();
        out.reverse();
        out
    }

    /// 两节链解析解；末端在 chain[0]，上臂在 chain[1]
    fn solve_two_bone(
        &self,
        skeleton: &Skeleton,
        world: &[Mat4],
        goal: Vec3,
        pole: Vec3,
    ) -> Option<Vec<Quat>> {
        let (lower, upper) = (self.chain[0], self.chain[1]);
        let l1 = skeleton.bone(upper).length;
        let l2 = skeleton.bone(lower).length;
        let root = translation_of(&world[upper]);
        let to_goal = goal - root;
        let dir = to_goal.normalize_or_zero();
        if dir == Vec3::ZERO || l1 < 1e-6 || l2 < 1e-6 {
            return None;
        }
        let d = to_goal.length().clamp((l1 - l2).abs() + 1e-5, l1 + l2 - 1e-5);

        let to_pole = pole - root;
        let mut bend = to_pole - dir * to_pole.dot(dir);
        if bend.length_squared() < 1e-10 {
            // 极向目标在链轴上：沿用当前肘部方向
            let elbow = translation_of(&world[lower]) - root;
            bend = elbow - dir * elbow.dot(dir);
        }
        let bend = Quat::from_axis_angle(dir, self.pole_angle) * bend.normalize_or_zero();
        if bend == Vec3::ZERO {
            return None;
        }

        let cos_a = ((l1 * l1 + d * d - l2 * l2) / (2.0 * l1 * d)).clamp(-1.0, 1.0);
        let sin_a = (1.0 - cos_a * cos_a).sqrt();
        let knee = root + dir * (l1 * cos_a) + bend * (l1 * sin_a);
        let tip = root + dir * d;

        let aim = |index: usize, new_y: Vec3| {
            let current = Quat::from_mat3(&rotation_part(&world[index])).normalize();
            let current_y = current * Vec3::Y;
            (rotation_arc(current_y, new_y) * current).normalize()
        };
        let upper_rot = aim(upper, knee - root);
        // 下节的当前方向先随上节一起转动
        let lower_current = Quat::from_mat3(&rotation_part(&world[lower])).normalize();
        let upper_current = Quat::from_mat3(&rotation_part(&world[upper])).normalize();
        let carried = (upper_rot * upper_current.inverse() * lower_current).normalize();
        let lower_rot = (rotation_arc(carried * Vec3::Y, tip - knee) * carried).normalize();

        Some(vec![lower_rot, upper_rot])
    }

    /// CCD 迭代（保留最佳结果）
    fn solve_ccd(&self, skeleton: &Skeleton, world: &[Mat4], goal: Vec3) -> Vec<Quat> {
        let mut rotations: Vec<Quat> = self
            .chain
            .iter()
            .map(|&i| Quat::from_mat3(&rotation_part(&world[i])).normalize())
            .collect();
        let mut heads: Vec<Vec3> = self.chain.iter().map(|&i| translation_of(&world[i])).collect();
        let tip_length = skeleton.bone(self.chain[0]).length;
        let effector = |rotations: &[Quat], heads: &[Vec3]| heads[0] + rotations[0] * Vec3::Y * tip_length;

        let mut best = rotations.clone();
        let mut best_dist = (effector(&rotations, &heads) - goal).length();

        for _ in 0..self.iterations {
            for link in 0..self.chain.len() {
                let pivot = heads[link];
                let eff = effector(&rotations, &heads);
                let v1 = (eff - pivot).normalize_or_zero();
                let v2 = (goal - pivot).normalize_or_zero();
                if v1 == Vec3::ZERO || v2 == Vec3::ZERO {
                    continue;
                }
                let angle = v1.dot(v2).clamp(-1.0, 1.0).acos();
                if angle < 1e-5 {
                    continue;
                }
                let axis = v1.cross(v2).normalize_or_zero();
                if axis == Vec3::ZERO {
                    continue;
                }
                let rot = Quat::from_axis_angle(axis, angle.min(self.limit_angle));
                // 当前节及其下方所有节绕 pivot 转动
                for k in 0..=link {
                    rotations[k] = (rot * rotations[k]).normalize();
                    heads[k] = pivot + rot * (heads[k] - pivot);
                }
            }

            let dist = (effector(&rotations, &heads) - goal).length();
            if dist < best_dist {
                best_dist = dist;
                best = rotations.clone();
            } else {
                break;
            }
            if dist < 1e-5 {
                break;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::bone::Bone;
    use crate::skeleton::constraint::Constraint;

    /// 竖直两节腿，IK 目标偏离腿轴
    fn leg(chain_count: usize, pole: bool) -> Skeleton {
        let mut sk = Skeleton::new("leg");
        sk.add_bone(Bone::new("thigh", Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 1.0), 0.0), None)
            .unwrap();
        let ik = Constraint::ik("target", pole.then_some("pole"), chain_count);
        sk.add_bone(
            Bone::new("shin", Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, -0.01, 0.0), 0.0)
                .with_constraint(ik),
            Some("thigh"),
        )
        .unwrap();
        sk.add_bone(Bone::new("target", Vec3::new(0.0, -0.5, 0.8), Vec3::new(0.0, -0.5, 1.0), 0.0), None)
            .unwrap();
        sk.add_bone(Bone::new("pole", Vec3::new(0.0, -3.0, 1.0), Vec3::new(0.0, -3.0, 1.2), 0.0), None)
            .unwrap();
        sk
    }

    fn rest_world(sk: &Skeleton) -> Vec<Mat4> {
        sk.bones().iter().map(|b| b.matrix_rest).collect()
    }

    fn tip_after(sk: &Skeleton, world: &[Mat4], rotations: &[(usize, Quat)]) -> Vec3 {
        let (upper, ru) = rotations[0];
        let (lower, rl) = rotations[1];
        let root = translation_of(&world[upper]);
        let knee = root + ru * Vec3::Y * sk.bone(upper).length;
        knee + rl * Vec3::Y * sk.bone(lower).length
    }

    #[test]
    fn test_chain_collection() {
        let sk = leg(2, true);
        let solver = IkSolver::from_bone(&sk, 1).unwrap();
        assert_eq!(solver.chain, vec![1, 0]);
        assert_eq!(solver.target, 2);
        assert_eq!(solver.pole, Some(3));
    }

    #[test]
    fn test_two_bone_reaches_goal_and_bends_to_pole() {
        let sk = leg(2, true);
        let world = rest_world(&sk);
        let solver = IkSolver::from_bone(&sk, 1).unwrap();
        let result = solver.solve(&sk, &world);
        let tip = tip_after(&sk, &world, &result);
        assert!((tip - Vec3::new(0.0, -0.5, 0.8)).length() < 1e-3, "{:?}", tip);
        let knee = Vec3::new(0.0, 0.0, 2.0) + result[0].1 * Vec3::Y;
        assert!(knee.y < 0.0, "knee should point toward the pole: {:?}", knee);
    }

    #[test]
    fn test_ccd_reaches_goal() {
        let sk = leg(2, false);
        let world = rest_world(&sk);
        let solver = IkSolver::from_bone(&sk, 1).unwrap();
        let result = solver.solve(&sk, &world);
        let tip = tip_after(&sk, &world, &result);
        assert!((tip - Vec3::new(0.0, -0.5, 0.8)).length() < 1e-2, "{:?}", tip);
    }
}
