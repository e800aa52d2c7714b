//! BVH (BioVision Hierarchy) 文件解析
//!
//! 层级部分按 `ROOT` / `JOINT` / `End Site` / `OFFSET` / `CHANNELS` 深度优先声明，
//! 动作部分为 `Frames:`、`Frame Time:` 以及逐行的通道数值。
//! BVH 为 Y 轴向上，开启 `flip_yz` 时转换到 Z 轴向上的骨架空间（绕 X 轴 90°）。

use std::path::Path;
use std::str::FromStr;

use glam::{Mat3, Quat, Vec3};

use super::action::Action;
use super::fcurve::InsertMode;
use crate::config::BvhLoadConfig;
use crate::skeleton::{Bone, Skeleton, MIN_BONE_LENGTH};
use crate::{MocapError, Result};

/// 退化骨骼的替代长度
const DEGENERATE_LENGTH: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelType {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl ChannelType {
    pub fn is_position(self) -> bool {
        matches!(
            self,
            ChannelType::Xposition | ChannelType::Yposition | ChannelType::Zposition
        )
    }

    /// BVH 坐标轴索引
    fn bvh_axis(self) -> usize {
        match self {
            ChannelType::Xposition | ChannelType::Xrotation => 0,
            ChannelType::Yposition | ChannelType::Yrotation => 1,
            ChannelType::Zposition | ChannelType::Zrotation => 2,
        }
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xposition" => Ok(ChannelType::Xposition),
            "yposition" => Ok(ChannelType::Yposition),
            "zposition" => Ok(ChannelType::Zposition),
            "xrotation" => Ok(ChannelType::Xrotation),
            "yrotation" => Ok(ChannelType::Yrotation),
            "zrotation" => Ok(ChannelType::Zrotation),
            _ => Err(format!("unknown channel {}", s)),
        }
    }
}

/// 通道：类型 + 骨架空间中的轴与符号
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhChannel {
    pub kind: ChannelType,
    pub axis: usize,
    pub sign: f32,
}

impl BvhChannel {
    fn new(kind: ChannelType, flip_yz: bool) -> Self {
        let (axis, sign) = match (flip_yz, kind.bvh_axis()) {
            (false, axis) => (axis, 1.0),
            (true, 0) => (0, 1.0),
            (true, 1) => (2, 1.0),
            (true, _) => (1, -1.0),
        };
        Self { kind, axis, sign }
    }
}

/// 层级中的关节
#[derive(Clone, Debug)]
pub struct BvhNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// 文件中的原始偏移
    pub offset: Vec3,
    pub channels: Vec<BvhChannel>,
    /// 本关节首个通道在每行数据中的位置
    pub first_channel: usize,
    pub end_site: Option<Vec3>,
}

/// 解析后的 BVH 文件
#[derive(Clone, Debug)]
pub struct BvhFile {
    pub name: String,
    pub nodes: Vec<BvhNode>,
    pub channel_count: usize,
    pub frame_time: f32,
    pub frames: Vec<Vec<f32>>,
    pub flip_yz: bool,
}

struct Tokens<'a> {
    items: std::vec::IntoIter<(&'a str, usize)>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Option<(&'a str, usize)> {
        self.items.next()
    }

    fn expect(&mut self, line: usize, what: &str) -> Result<(&'a str, usize)> {
        self.items.next().ok_or_else(|| {
            MocapError::input(
                format!("unexpected end of hierarchy, expected {}", what),
                Some(line),
            )
        })
    }

    fn number(&mut self, line: usize) -> Result<f32> {
        let (word, line) = self.expect(line, "number")?;
        word.parse::<f32>()
            .map_err(|_| MocapError::input(format!("expected number, got {:?}", word), Some(line)))
    }
}

enum Open {
    Joint(usize),
    EndSite(usize),
}

enum Pending {
    Joint(String, Option<usize>),
    EndSite(usize),
}

fn axis_rotation(axis: usize, angle: f32) -> Mat3 {
    match axis {
        0 => Mat3::from_rotation_x(angle),
        1 => Mat3::from_rotation_y(angle),
        _ => Mat3::from_rotation_z(angle),
    }
}

impl BvhFile {
    /// 从文件加载；扩展名必须为 .bvh
    pub fn load<P: AsRef<Path>>(path: P, config: &BvhLoadConfig) -> Result<Self> {
        let path = path.as_ref();
        let is_bvh = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("bvh"))
            .unwrap_or(false);
        if !is_bvh {
            return Err(MocapError::input(
                format!("{} is not a BVH file", path.display()),
                None,
            ));
        }
        let text = std::fs::read_to_string(path)?;
        let mut file = Self::parse(&text, config)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            file.name = stem.to_string();
        }
        Ok(file)
    }

    /// 解析 BVH 文本（兼容 CRLF 与 LF）
    pub fn parse(text: &str, config: &BvhLoadConfig) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let flip_yz = config.flip_yz;

        let mut nodes: Vec<BvhNode> = Vec::new();
        let mut stack: Vec<Open> = Vec::new();
        let mut pending: Option<Pending> = None;
        let mut channel_count = 0usize;
        let mut motion_line = None;

        // 层级部分：逐词处理
        let mut tokens: Vec<(&str, usize)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.first() == Some(&"MOTION") {
                motion_line = Some(i);
                break;
            }
            tokens.extend(words.into_iter().map(|w| (w, i + 1)));
        }

        let mut iter = Tokens {
            items: tokens.into_iter(),
        };

        while let Some((token, line)) = iter.next() {
            match token {
                "HIERARCHY" => {}
                "ROOT" | "JOINT" => {
                    let (name, _) = iter.expect(line, "joint name")?;
                    let parent = match stack.last() {
                        None if token == "ROOT" => None,
                        Some(Open::Joint(p)) if token == "JOINT" => Some(*p),
                        _ => {
                            return Err(MocapError::input(
                                format!("misplaced {} {} at level {}", token, name, stack.len()),
                                Some(line),
                            ))
                        }
                    };
                    pending = Some(Pending::Joint(name.to_string(), parent));
                }
                "End" => {
                    let (site, _) = iter.expect(line, "Site")?;
                    match (site, stack.last()) {
                        ("Site", Some(Open::Joint(p))) => pending = Some(Pending::EndSite(*p)),
                        _ => {
                            return Err(MocapError::input(
                                format!("misplaced End {} at level {}", site, stack.len()),
                                Some(line),
                            ))
                        }
                    }
                }
                "{" => match pending.take() {
                    Some(Pending::Joint(name, parent)) => {
                        let index = nodes.len();
                        nodes.push(BvhNode {
                            name,
                            parent,
                            children: Vec::new(),
                            offset: Vec3::ZERO,
                            channels: Vec::new(),
                            first_channel: channel_count,
                            end_site: None,
                        });
                        if let Some(p) = parent {
                            nodes[p].children.push(index);
                        }
                        stack.push(Open::Joint(index));
                    }
                    Some(Pending::EndSite(parent)) => stack.push(Open::EndSite(parent)),
                    None => {
                        return Err(MocapError::input(
                            format!("unexpected '{{' at level {}", stack.len()),
                            Some(line),
                        ))
                    }
                },
                "}" => {
                    if stack.pop().is_none() {
                        return Err(MocapError::input(
                            "unbalanced '}' at level 0".to_string(),
                            Some(line),
                        ));
                    }
                }
                "OFFSET" => {
                    let offset = Vec3::new(
                        iter.number(line)?,
                        iter.number(line)?,
                        iter.number(line)?,
                    );
                    match stack.last() {
                        Some(Open::Joint(i)) => nodes[*i].offset = offset,
                        Some(Open::EndSite(p)) => nodes[*p].end_site = Some(offset),
                        None => {
                            return Err(MocapError::input("OFFSET outside of a joint", Some(line)))
                        }
                    }
                }
                "CHANNELS" => {
                    let Some(Open::Joint(index)) = stack.last() else {
                        return Err(MocapError::input("CHANNELS outside of a joint", Some(line)));
                    };
                    let index = *index;
                    let (count, _) = iter.expect(line, "channel count")?;
                    let count: usize = count.parse().map_err(|_| {
                        MocapError::input(format!("bad channel count {:?}", count), Some(line))
                    })?;
                    nodes[index].first_channel = channel_count;
                    for _ in 0..count {
                        let (word, word_line) = iter.expect(line, "channel name")?;
                        let kind = word
                            .parse::<ChannelType>()
                            .map_err(|e| MocapError::input(e, Some(word_line)))?;
                        nodes[index].channels.push(BvhChannel::new(kind, flip_yz));
                    }
                    channel_count += count;
                }
                other => {
                    return Err(MocapError::input(
                        format!("unexpected token {:?} at level {}", other, stack.len()),
                        Some(line),
                    ))
                }
            }
        }

        if !stack.is_empty() || pending.is_some() {
            return Err(MocapError::input(
                format!("unbalanced braces: {} block(s) left open", stack.len()),
                motion_line.map(|l| l + 1),
            ));
        }
        if nodes.is_empty() {
            return Err(MocapError::input("no ROOT joint in hierarchy", None));
        }
        let Some(motion_line) = motion_line else {
            return Err(MocapError::input("missing MOTION section", None));
        };

        let (frame_count, frame_time, frames) = Self::parse_motion(&lines, motion_line, channel_count)?;
        if frames.len() < frame_count {
            log::warn!("BVH 声明 {} 帧，实际只有 {} 帧", frame_count, frames.len());
        }

        Ok(Self {
            name: nodes[0].name.clone(),
            nodes,
            channel_count,
            frame_time,
            frames,
            flip_yz,
        })
    }

    fn parse_motion(
        lines: &[&str],
        motion_line: usize,
        channel_count: usize,
    ) -> Result<(usize, f32, Vec<Vec<f32>>)> {
        let mut frame_count = None;
        let mut frame_time = None;
        let mut frames = Vec::new();

        for (i, line) in lines.iter().enumerate().skip(motion_line + 1) {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("Frames:") {
                frame_count = Some(rest.trim().parse::<usize>().map_err(|_| {
                    MocapError::input(format!("bad frame count {:?}", rest.trim()), Some(line_no))
                })?);
                continue;
            }
            if let Some(rest) = line.strip_prefix("Frame Time:") {
                frame_time = Some(rest.trim().parse::<f32>().map_err(|_| {
                    MocapError::input(format!("bad frame time {:?}", rest.trim()), Some(line_no))
                })?);
                continue;
            }
            let (Some(count), Some(_)) = (frame_count, frame_time) else {
                return Err(MocapError::input(
                    "frame data before Frames:/Frame Time: header",
                    Some(line_no),
                ));
            };
            if frames.len() >= count {
                break;
            }
            let row = line
                .split_whitespace()
                .map(|w| {
                    w.parse::<f32>().map_err(|_| {
                        MocapError::input(format!("expected number, got {:?}", w), Some(line_no))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            if row.len() != channel_count {
                return Err(MocapError::input(
                    format!("expected {} values, got {}", channel_count, row.len()),
                    Some(line_no),
                ));
            }
            frames.push(row);
        }

        let frame_count = frame_count
            .ok_or_else(|| MocapError::input("missing Frames: line", Some(motion_line + 1)))?;
        let frame_time = frame_time
            .ok_or_else(|| MocapError::input("missing Frame Time: line", Some(motion_line + 1)))?;
        Ok((frame_count, frame_time, frames))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// BVH 坐标转到骨架空间
    fn to_armature(&self, v: Vec3) -> Vec3 {
        if self.flip_yz {
            Vec3::new(v.x, -v.z, v.y)
        } else {
            v
        }
    }

    /// 构建骨架：根骨骼头在原点，子骨骼头 = 父骨骼头 + 子偏移
    pub fn build_skeleton(&self, scale: f32) -> Result<Skeleton> {
        let mut heads = vec![Vec3::ZERO; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(p) = node.parent {
                heads[i] = heads[p] + self.to_armature(node.offset) * scale;
            }
        }

        let mut skeleton = Skeleton::new(self.name.clone());
        for (i, node) in self.nodes.iter().enumerate() {
            let head = heads[i];
            let mut tail = if !node.children.is_empty() {
                node.children.iter().map(|&c| heads[c]).sum::<Vec3>() / node.children.len() as f32
            } else if let Some(end) = node.end_site {
                head + self.to_armature(end) * scale
            } else {
                head + self.to_armature(node.offset) * scale
            };
            if (tail - head).length() < MIN_BONE_LENGTH {
                log::warn!("骨骼 {} 长度为零，使用默认长度", node.name);
                tail = head + self.to_armature(Vec3::Y) * DEGENERATE_LENGTH.max(scale * DEGENERATE_LENGTH);
            }
            let parent = node.parent.map(|p| self.nodes[p].name.as_str());
            skeleton.add_bone(Bone::new(node.name.clone(), head, tail, 0.0), parent)?;
        }
        Ok(skeleton)
    }

    /// 构建动作：旋转写入 rotation_quaternion，根骨骼位置写入 location
    pub fn build_action(&self, skeleton: &Skeleton, config: &BvhLoadConfig, scale: f32) -> Action {
        let mut action = Action::new(self.name.clone());
        let subsample = config.effective_subsample(self.frame_time);
        let start = config.start_frame.max(1) as usize;
        let end = config.end_frame as usize;

        let bone_of: Vec<Option<usize>> = self
            .nodes
            .iter()
            .map(|n| skeleton.find_bone(&n.name))
            .collect();
        let mut previous: Vec<Option<Quat>> = vec![None; self.nodes.len()];
        let mut emitted = 0usize;

        for (row_index, row) in self.frames.iter().enumerate() {
            let number = row_index + 1;
            if number < start || number > end || (number - start) % subsample as usize != 0 {
                continue;
            }
            let key_frame = (1 + (number - start) / subsample as usize) as f32;
            emitted += 1;

            for (ni, node) in self.nodes.iter().enumerate() {
                let Some(bi) = bone_of[ni] else { continue };
                let bone = skeleton.bone(bi);
                let values = &row[node.first_channel..node.first_channel + node.channels.len()];

                let mut location = Vec3::ZERO;
                let mut has_location = false;
                let mut rotation = Mat3::IDENTITY;
                let mut has_rotation = false;
                for (channel, &value) in node.channels.iter().zip(values) {
                    if channel.kind.is_position() {
                        location[channel.axis] += channel.sign * value * scale;
                        has_location = true;
                    } else {
                        rotation *= axis_rotation(channel.axis, channel.sign * value.to_radians());
                        has_rotation = true;
                    }
                }

                let rest = bone.rest_rotation();
                if has_location && node.parent.is_none() {
                    let local = rest.transpose() * (location - bone.head);
                    action.insert_location(&bone.name, key_frame, local, InsertMode::Fast);
                }
                if has_rotation {
                    let local = rest.transpose() * rotation * rest;
                    let mut q = Quat::from_mat3(&local).normalize();
                    if let Some(prev) = previous[ni] {
                        if prev.dot(q) < 0.0 {
                            q = -q;
                        }
                    }
                    previous[ni] = Some(q);
                    action.insert_quaternion(&bone.name, key_frame, q, InsertMode::Fast);
                }
            }
        }
        action.resort();

        if emitted == 0 {
            log::warn!("BVH {} 在帧范围 [{}, {}] 内没有数据", self.name, start, end);
        }
        action
    }
}

/// 加载 BVH，返回源骨架与动作
pub fn load_bvh<P: AsRef<Path>>(path: P, config: &BvhLoadConfig) -> Result<(Skeleton, Action)> {
    let load = || -> Result<(Skeleton, Action)> {
        let file = BvhFile::load(path.as_ref(), config)?;
        let scale = config.scale;
        let skeleton = file.build_skeleton(scale)?;
        let action = file.build_action(&skeleton, config, scale);
        log::info!(
            "BVH 加载完成: {} ({} 骨骼, {} 帧, 帧间隔 {})",
            file.name,
            skeleton.len(),
            file.frame_count(),
            file.frame_time
        );
        Ok((skeleton, action))
    };
    load().map_err(|e| e.in_category("Load BVH file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::ChannelKind;
    use crate::skeleton::PoseEvaluator;
    use std::f32::consts::FRAC_PI_4;

    const ONE_JOINT: &str = "HIERARCHY\r\nROOT Hips\r\n{\r\n  OFFSET 0 0 0\r\n  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation\r\n  End Site\r\n  {\r\n    OFFSET 0 1 0\r\n  }\r\n}\r\nMOTION\r\nFrames: 3\r\nFrame Time: 0.04\r\n0 1 0 0 90 0\r\n0 1 0 0 0 0\r\n0 1 0 0 -90 0\r\n";

    const ARM: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Spine
  {
    OFFSET 0 2 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    JOINT Arm
    {
      OFFSET 1 0 0
      CHANNELS 3 Zrotation Xrotation Yrotation
      End Site
      {
        OFFSET 1 0 0
      }
    }
  }
}
MOTION
Frames: 4
Frame Time: 0.0333333
0 0 0 0 0 0 0 0 0 0 0 0
0 0 0 0 0 0 90 0 0 0 0 0
0 0 0 0 0 0 0 0 0 0 0 45
0 0 0 0 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_single_joint_keys() {
        let config = BvhLoadConfig::default();
        let file = BvhFile::parse(ONE_JOINT, &config).unwrap();
        assert_eq!(file.frame_count(), 3);
        assert!((file.frame_time - 0.04).abs() < 1e-7);
        let skeleton = file.build_skeleton(1.0).unwrap();
        let action = file.build_action(&skeleton, &config, 1.0);

        let qx = action.fcurve("Hips", ChannelKind::RotationQuaternion, 1).unwrap();
        let expected = [FRAC_PI_4.sin(), 0.0, -FRAC_PI_4.sin()];
        assert_eq!(qx.len(), 3);
        for (key, want) in qx.keyframes().iter().zip(expected) {
            assert!((key.value - want).abs() < 1e-6, "{} vs {}", key.value, want);
        }
        for frame in [1.0, 2.0, 3.0] {
            let loc = action.evaluate_location("Hips", frame).unwrap();
            assert!(loc.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6), "{:?}", loc);
        }
    }

    #[test]
    fn test_skeleton_heads_and_tails() {
        let file = BvhFile::parse(ARM, &BvhLoadConfig::default()).unwrap();
        let skeleton = file.build_skeleton(0.5).unwrap();
        let spine = skeleton.bone_by_name("Spine").unwrap();
        let arm = skeleton.bone_by_name("Arm").unwrap();
        // Y 向上 -> Z 向上
        assert!(spine.head.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
        assert!(arm.head.abs_diff_eq(Vec3::new(0.5, 0.0, 1.0), 1e-6));
        assert!(arm.tail.abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-6));
        assert!(spine.tail.abs_diff_eq(arm.head, 1e-6));
        assert_eq!(skeleton.bone(skeleton.find_bone("Arm").unwrap()).parent, skeleton.find_bone("Spine"));
    }

    #[test]
    fn test_world_pose_follows_bvh_rotation() {
        let config = BvhLoadConfig::default();
        let file = BvhFile::parse(ARM, &config).unwrap();
        let skeleton = file.build_skeleton(1.0).unwrap();
        let action = file.build_action(&skeleton, &config, 1.0);
        let arm = skeleton.find_bone("Arm").unwrap();

        // 第 2 帧：Spine 绕 BVH Z 轴（骨架 -Y 轴）转 90°，手臂从 +X 转向骨架 +Z
        let pose = PoseEvaluator::new().evaluate(&skeleton, &action, 2.0);
        let dir = pose.world[arm].y_axis.truncate();
        assert!(dir.abs_diff_eq(Vec3::Z, 1e-4), "{:?}", dir);

        // 第 3 帧：Arm 绕 BVH Y 轴（骨架 Z 轴）转 45°
        let pose = PoseEvaluator::new().evaluate(&skeleton, &action, 3.0);
        let dir = pose.world[arm].y_axis.truncate();
        let h = FRAC_PI_4.cos();
        assert!(dir.abs_diff_eq(Vec3::new(h, h, 0.0), 1e-4), "{:?}", dir);
    }

    #[test]
    fn test_subsample_and_range() {
        let mut config = BvhLoadConfig::default();
        config.subsample = 2;
        let file = BvhFile::parse(ARM, &config).unwrap();
        let skeleton = file.build_skeleton(1.0).unwrap();
        let action = file.build_action(&skeleton, &config, 1.0);
        assert_eq!(action.frame_range(), Some((1.0, 2.0)));

        config.subsample = 1;
        config.start_frame = 10;
        let empty = file.build_action(&skeleton, &config, 1.0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        let broken = ARM.replacen("  }\n}\nMOTION", "}\nMOTION", 1);
        let err = BvhFile::parse(&broken, &BvhLoadConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unbalanced"), "{}", err);

        let extra = ONE_JOINT.replace("}\r\nMOTION", "}\r\n}\r\nMOTION");
        let err = BvhFile::parse(&extra, &BvhLoadConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unbalanced '}'"), "{}", err);
    }

    #[test]
    fn test_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.txt");
        std::fs::write(&path, ONE_JOINT).unwrap();
        let err = load_bvh(&path, &BvhLoadConfig::default()).unwrap_err();
        assert!(err.to_string().starts_with("Category: Load BVH file\n"));

        let path = dir.path().join("walk.BVH");
        std::fs::write(&path, ONE_JOINT).unwrap();
        let (skeleton, action) = load_bvh(&path, &BvhLoadConfig::default()).unwrap();
        assert_eq!(skeleton.name, "walk");
        assert_eq!(action.name, "walk");
    }
}
