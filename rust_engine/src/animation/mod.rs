//! 动画系统
//!
//! 提供动作（FCurve 集合）、关键帧插值、BVH 与 MHP 文件解析。

mod action;
mod bvh_loader;
mod fcurve;
mod keyframe;
mod mhp_file;

pub use action::{Action, ActionLibrary};
pub use bvh_loader::{load_bvh, BvhChannel, BvhFile, BvhNode, ChannelType};
pub use fcurve::{data_path, parse_data_path, ChannelKind, FCurve, InsertMode, FRAME_EPSILON};
pub use keyframe::{interpolate, Interpolation, Keyframe};
pub use mhp_file::{MhpEntry, MhpFile};
