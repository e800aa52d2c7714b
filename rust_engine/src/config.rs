//! 重定向配置
//!
//! 各操作显式接收配置结构体；进程内另保存一份当前配置，供宿主读取和修改。
//! 配置文件每行一个 `键 值`，`#` 开头为注释。

use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::RwLock;

use crate::{MocapError, Result};

/// BVH 加载配置
#[derive(Debug, Clone, PartialEq)]
pub struct BvhLoadConfig {
    /// 缩放系数（auto_scale 关闭时使用）
    pub scale: f32,
    /// 按目标骨架高度自动缩放
    pub auto_scale: bool,
    /// Y 轴向上转换为 Z 轴向上
    pub flip_yz: bool,
    /// 首帧（从 1 开始计数）
    pub start_frame: u32,
    /// 末帧（包含）
    pub end_frame: u32,
    /// 显式降采样系数
    pub subsample: u32,
    /// 按目标帧率推导降采样系数
    pub use_target_fps: bool,
    pub target_fps: f32,
}

impl Default for BvhLoadConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            auto_scale: true,
            flip_yz: true,
            start_frame: 1,
            end_frame: 32000,
            subsample: 1,
            use_target_fps: false,
            target_fps: 30.0,
        }
    }
}

impl BvhLoadConfig {
    /// 实际降采样系数：`round(1/(fps·dt))`，至少为 1
    pub fn effective_subsample(&self, frame_time: f32) -> u32 {
        if self.use_target_fps && self.target_fps > 0.0 && frame_time > 0.0 {
            ((1.0 / (self.target_fps * frame_time)).round() as u32).max(1)
        } else {
            self.subsample.max(1)
        }
    }
}

/// 重定向配置
#[derive(Debug, Clone, PartialEq)]
pub struct RetargetConfig {
    pub use_limits: bool,
    pub use_locks: bool,
    pub start_frame: i32,
    pub end_frame: i32,
    /// 每隔多少帧报告一次进度
    pub progress_interval: usize,
    /// "Automatic" 目标：自动识别优先于清单
    pub auto_target: bool,
    /// 重定向后抬高髋部使脚不低于地面
    pub keep_above_floor: bool,
    pub floor_z: f32,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            use_limits: true,
            use_locks: true,
            start_frame: 1,
            end_frame: 32000,
            progress_interval: 20,
            auto_target: true,
            keep_above_floor: false,
            floor_z: 0.0,
        }
    }
}

/// 曲线简化配置
#[derive(Debug, Clone, PartialEq)]
pub struct SimplifyConfig {
    /// 位置误差上限
    pub max_err_loc: f32,
    /// 旋转误差上限（度）
    pub max_err_rot: f32,
    pub use_markers: bool,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            max_err_loc: 0.01,
            max_err_rot: 0.1,
            use_markers: false,
        }
    }
}

/// 循环与重复配置
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub blend_range: u32,
    pub loop_loc: bool,
    pub loop_rot: bool,
    pub loop_in_place: bool,
    pub repeat_number: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            blend_range: 5,
            loop_loc: true,
            loop_rot: true,
            loop_in_place: false,
            repeat_number: 1,
        }
    }
}

/// 拼接配置
#[derive(Debug, Clone, PartialEq)]
pub struct StitchConfig {
    pub blend_range: u32,
    /// 第二段动作的根位置接续第一段末尾
    pub match_location: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            blend_range: 5,
            match_location: true,
        }
    }
}

/// FK/IK 转换配置
#[derive(Debug, Clone, PartialEq)]
pub struct FkIkConfig {
    /// 腿部 IK 直接放在脚踝，不使用反向脚
    pub ik_to_ankle: bool,
    /// 极向目标距离（以上臂长度为单位）
    pub pole_distance: f32,
    pub bend_positive: bool,
    pub use_arms: bool,
    pub use_legs: bool,
}

impl Default for FkIkConfig {
    fn default() -> Self {
        Self {
            ik_to_ankle: false,
            pole_distance: 3.0,
            bend_positive: true,
            use_arms: true,
            use_legs: true,
        }
    }
}

/// 全部配置
#[derive(Debug, Clone, PartialEq, Default)]
pub struct McpSettings {
    pub bvh: BvhLoadConfig,
    pub retarget: RetargetConfig,
    pub simplify: SimplifyConfig,
    pub looping: LoopConfig,
    pub stitch: StitchConfig,
    pub fkik: FkIkConfig,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, line: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| MocapError::input(format!("bad value {:?} for {}", value, key), Some(line)))
}

fn parse_bool(key: &str, value: &str, line: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MocapError::input(
            format!("bad boolean {:?} for {}", value, key),
            Some(line),
        )),
    }
}

impl McpSettings {
    /// 按配置文件格式输出
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let b = &self.bvh;
        let r = &self.retarget;
        let s = &self.simplify;
        let l = &self.looping;
        let st = &self.stitch;
        let f = &self.fkik;
        vec![
            ("bvh.scale", b.scale.to_string()),
            ("bvh.auto_scale", b.auto_scale.to_string()),
            ("bvh.flip_yz", b.flip_yz.to_string()),
            ("bvh.start_frame", b.start_frame.to_string()),
            ("bvh.end_frame", b.end_frame.to_string()),
            ("bvh.subsample", b.subsample.to_string()),
            ("bvh.use_target_fps", b.use_target_fps.to_string()),
            ("bvh.target_fps", b.target_fps.to_string()),
            ("retarget.use_limits", r.use_limits.to_string()),
            ("retarget.use_locks", r.use_locks.to_string()),
            ("retarget.start_frame", r.start_frame.to_string()),
            ("retarget.end_frame", r.end_frame.to_string()),
            ("retarget.progress_interval", r.progress_interval.to_string()),
            ("retarget.auto_target", r.auto_target.to_string()),
            ("retarget.keep_above_floor", r.keep_above_floor.to_string()),
            ("retarget.floor_z", r.floor_z.to_string()),
            ("simplify.max_err_loc", s.max_err_loc.to_string()),
            ("simplify.max_err_rot", s.max_err_rot.to_string()),
            ("simplify.use_markers", s.use_markers.to_string()),
            ("loop.blend_range", l.blend_range.to_string()),
            ("loop.loop_loc", l.loop_loc.to_string()),
            ("loop.loop_rot", l.loop_rot.to_string()),
            ("loop.loop_in_place", l.loop_in_place.to_string()),
            ("loop.repeat_number", l.repeat_number.to_string()),
            ("stitch.blend_range", st.blend_range.to_string()),
            ("stitch.match_location", st.match_location.to_string()),
            ("fkik.ik_to_ankle", f.ik_to_ankle.to_string()),
            ("fkik.pole_distance", f.pole_distance.to_string()),
            ("fkik.bend_positive", f.bend_positive.to_string()),
            ("fkik.use_arms", f.use_arms.to_string()),
            ("fkik.use_legs", f.use_legs.to_string()),
        ]
    }

    /// 设置单个键；未知键返回 false
    pub fn set(&mut self, key: &str, value: &str, line: usize) -> Result<bool> {
        match key {
            "bvh.scale" => self.bvh.scale = parse_value(key, value, line)?,
            "bvh.auto_scale" => self.bvh.auto_scale = parse_bool(key, value, line)?,
            "bvh.flip_yz" => self.bvh.flip_yz = parse_bool(key, value, line)?,
            "bvh.start_frame" => self.bvh.start_frame = parse_value(key, value, line)?,
            "bvh.end_frame" => self.bvh.end_frame = parse_value(key, value, line)?,
            "bvh.subsample" => self.bvh.subsample = parse_value(key, value, line)?,
            "bvh.use_target_fps" => self.bvh.use_target_fps = parse_bool(key, value, line)?,
            "bvh.target_fps" => self.bvh.target_fps = parse_value(key, value, line)?,
            "retarget.use_limits" => self.retarget.use_limits = parse_bool(key, value, line)?,
            "retarget.use_locks" => self.retarget.use_locks = parse_bool(key, value, line)?,
            "retarget.start_frame" => self.retarget.start_frame = parse_value(key, value, line)?,
            "retarget.end_frame" => self.retarget.end_frame = parse_value(key, value, line)?,
            "retarget.progress_interval" => {
                self.retarget.progress_interval = parse_value(key, value, line)?
            }
            "retarget.auto_target" => self.retarget.auto_target = parse_bool(key, value, line)?,
            "retarget.keep_above_floor" => {
                self.retarget.keep_above_floor = parse_bool(key, value, line)?
            }
            "retarget.floor_z" => self.retarget.floor_z = parse_value(key, value, line)?,
            "simplify.max_err_loc" => self.simplify.max_err_loc = parse_value(key, value, line)?,
            "simplify.max_err_rot" => self.simplify.max_err_rot = parse_value(key, value, line)?,
            "simplify.use_markers" => self.simplify.use_markers = parse_bool(key, value, line)?,
            "loop.blend_range" => self.looping.blend_range = parse_value(key, value, line)?,
            "loop.loop_loc" => self.looping.loop_loc = parse_bool(key, value, line)?,
            "loop.loop_rot" => self.looping.loop_rot = parse_bool(key, value, line)?,
            "loop.loop_in_place" => self.looping.loop_in_place = parse_bool(key, value, line)?,
            "loop.repeat_number" => self.looping.repeat_number = parse_value(key, value, line)?,
            "stitch.blend_range" => self.stitch.blend_range = parse_value(key, value, line)?,
            "stitch.match_location" => self.stitch.match_location = parse_bool(key, value, line)?,
            "fkik.ik_to_ankle" => self.fkik.ik_to_ankle = parse_bool(key, value, line)?,
            "fkik.pole_distance" => self.fkik.pole_distance = parse_value(key, value, line)?,
            "fkik.bend_positive" => self.fkik.bend_positive = parse_bool(key, value, line)?,
            "fkik.use_arms" => self.fkik.use_arms = parse_bool(key, value, line)?,
            "fkik.use_legs" => self.fkik.use_legs = parse_bool(key, value, line)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut settings = Self::default();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                return Err(MocapError::input(
                    format!("expected `key value`, got {:?}", line),
                    Some(i + 1),
                ));
            };
            if !settings.set(key, value.trim(), i + 1)? {
                log::warn!("忽略未知配置项 {}", key);
            }
        }
        Ok(settings)
    }

    pub fn to_text(&self) -> String {
        let mut text = String::from("# mocap settings\n");
        for (key, value) in self.entries() {
            text.push_str(key);
            text.push(' ');
            text.push_str(&value);
            text.push('\n');
        }
        text
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

/// 全局配置实例
static SETTINGS: Lazy<RwLock<McpSettings>> = Lazy::new(|| RwLock::new(McpSettings::default()));

/// 获取当前配置（只读副本）
pub fn get_settings() -> McpSettings {
    SETTINGS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

pub fn set_settings(settings: McpSettings) {
    *SETTINGS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
}

/// 重置为默认配置
pub fn reset_settings() {
    set_settings(McpSettings::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_file_round_trip() {
        let mut settings = McpSettings::default();
        settings.bvh.scale = 0.25;
        settings.looping.loop_in_place = true;
        settings.fkik.pole_distance = 2.5;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.txt");
        settings.save(&path).unwrap();
        let loaded = McpSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_unknown_keys_ignored_bad_values_rejected() {
        let settings = McpSettings::parse("# c\nfoo.bar 3\nsimplify.max_err_loc 0.5\n").unwrap();
        assert_eq!(settings.simplify.max_err_loc, 0.5);

        let err = McpSettings::parse("bvh.flip_yz maybe\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_subsample_from_fps() {
        let mut bvh = BvhLoadConfig::default();
        assert_eq!(bvh.effective_subsample(0.008333), 1);
        bvh.use_target_fps = true;
        bvh.target_fps = 30.0;
        assert_eq!(bvh.effective_subsample(1.0 / 120.0), 4);
        bvh.target_fps = 200.0;
        assert_eq!(bvh.effective_subsample(1.0 / 120.0), 1);
    }

    #[test]
    fn test_global_settings() {
        let mut settings = McpSettings::default();
        settings.retarget.use_limits = false;
        set_settings(settings.clone());
        assert_eq!(get_settings().retarget.use_limits, false);
        reset_settings();
        assert_eq!(get_settings(), McpSettings::default());
    }
}
