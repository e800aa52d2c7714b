//! 动画曲线操作：简化、时间缩放、循环、重复、拼接、偏移、位移编辑、地面修正
//!
//! 所有操作只改动范围内的关键帧，范围外的关键帧原样保留。

mod edit;
mod floor;
mod looping;
mod range;
mod rescale;
mod shift;
mod simplify;
mod stitch;

pub use edit::EditSession;
pub use floor::keep_above_floor;
pub use looping::{loop_action, loop_in_place, repeat_action, wrap_angle};
pub use range::{FrameRange, Marker};
pub use rescale::{rescale_action, rescale_curve};
pub use shift::{fixate_location, shift_bone};
pub use simplify::{channel_tolerance, keep_indices, simplify_action, simplify_curve};
pub use stitch::{blend_basis, stitch_actions};
