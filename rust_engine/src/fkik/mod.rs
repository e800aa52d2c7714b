//! FK/IK 转换

mod bend;
mod chains;
mod pole;
mod reverse_foot;
mod transfer;

pub use bend::bend_positive;
pub use chains::{ArmChain, FootMarkers, LegChain, RigChains};
pub use pole::pole_target;
pub use reverse_foot::{reverse_foot, MarkerHeads};
pub use transfer::{fk_to_ik, ik_to_fk};
