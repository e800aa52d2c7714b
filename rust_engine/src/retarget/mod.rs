//! 重定向：T-pose 对齐、逐帧姿态传递、锁定与限制

mod guard;
mod locks;
mod progress;
mod session;
mod sink;
mod tpose;

pub use guard::{FrameGuard, OverrideGuard};
pub use locks::{lock_order, BoneCorrection};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use session::{alignment, BonePair, RetargetReport, RetargetSession};
pub use sink::{ActionSink, FnSink, FrameSink};
pub use tpose::TPose;
