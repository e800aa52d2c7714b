//! 骨骼系统：骨骼、约束、骨架、角色、姿态求值和 IK 求解器

mod armature;
mod bone;
mod constraint;
mod evaluator;
mod ik_solver;
mod locale;
mod roles;

pub use armature::Skeleton;
pub use bone::{rest_matrix, roll_from_matrix, Bone, MIN_BONE_LENGTH};
pub use constraint::{AxisLimit, Constraint, ConstraintKind, Space};
pub use evaluator::{rotation_basis, world_to_basis, Pose, PoseEvaluator};
pub use ik_solver::IkSolver;
pub use locale::LocaleMap;
pub use roles::{CanonicalRole, Side};

#[cfg(test)]
pub(crate) use armature::tests::chain as test_chain;
