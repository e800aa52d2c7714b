//! MHP 姿态文件
//!
//! 每行一条：`骨骼名 matrix r00 r01 … r33`（行主序 16 个数）、
//! `骨骼名 quat w x y z` 或 `骨骼名 scale sx sy sz`。未知指令警告后跳过。

use std::fmt::Write as _;
use std::path::Path;

use glam::{Mat4, Quat, Vec3};

use super::action::Action;
use super::fcurve::InsertMode;
use crate::skeleton::{Pose, Skeleton};
use crate::{MocapError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MhpEntry {
    /// 局部姿态矩阵
    Matrix(Mat4),
    Quat(Quat),
    Scale(Vec3),
}

#[derive(Clone, Debug, Default)]
pub struct MhpFile {
    pub entries: Vec<(String, MhpEntry)>,
}

fn parse_floats(words: &[&str], line: usize) -> Result<Vec<f32>> {
    words
        .iter()
        .map(|w| {
            w.parse::<f32>()
                .map_err(|_| MocapError::input(format!("expected number, got {:?}", w), Some(line)))
        })
        .collect()
}

impl MhpFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 2 {
                log::warn!("MHP 第 {} 行无法识别: {}", line_no, line);
                continue;
            }
            let (name, directive, values) = (words[0], words[1], &words[2..]);
            let entry = match (directive, values.len()) {
                ("matrix", 16) => {
                    let v = parse_floats(values, line_no)?;
                    let mut cols = [0.0f32; 16];
                    cols.copy_from_slice(&v);
                    // 文件为行主序
                    MhpEntry::Matrix(Mat4::from_cols_array(&cols).transpose())
                }
                ("quat", 4) => {
                    let v = parse_floats(values, line_no)?;
                    MhpEntry::Quat(Quat::from_xyzw(v[1], v[2], v[3], v[0]).normalize())
                }
                ("scale", 3) => {
                    let v = parse_floats(values, line_no)?;
                    MhpEntry::Scale(Vec3::new(v[0], v[1], v[2]))
                }
                _ => {
                    log::warn!("MHP 第 {} 行无法识别: {}", line_no, line);
                    continue;
                }
            };
            entries.push((name.to_string(), entry));
        }
        Ok(Self { entries })
    }

    /// 记录姿态中所有非单位的局部矩阵
    pub fn from_pose(skeleton: &Skeleton, pose: &Pose) -> Self {
        let entries = skeleton
            .bones()
            .iter()
            .zip(&pose.basis)
            .filter(|(_, basis)| !basis.abs_diff_eq(Mat4::IDENTITY, 1e-6))
            .map(|(bone, basis)| (bone.name.clone(), MhpEntry::Matrix(*basis)))
            .collect();
        Self { entries }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, entry) in &self.entries {
            let values: Vec<f32> = match entry {
                MhpEntry::Matrix(m) => m.transpose().to_cols_array().to_vec(),
                MhpEntry::Quat(q) => vec![q.w, q.x, q.y, q.z],
                MhpEntry::Scale(s) => s.to_array().to_vec(),
            };
            let directive = match entry {
                MhpEntry::Matrix(_) => "matrix",
                MhpEntry::Quat(_) => "quat",
                MhpEntry::Scale(_) => "scale",
            };
            let _ = write!(out, "{} {}", name, directive);
            for v in values {
                let _ = write!(out, " {}", v);
            }
            out.push('\n');
        }
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    /// 在指定帧插入关键帧，返回写入的骨骼数；骨架中不存在的骨骼警告后跳过
    pub fn apply_to_action(&self, skeleton: &Skeleton, action: &mut Action, frame: f32) -> usize {
        let mut applied = 0;
        for (name, entry) in &self.entries {
            if skeleton.find_bone(name).is_none() {
                log::warn!("MHP 骨骼 {} 不在骨架 {} 中", name, skeleton.name);
                continue;
            }
            match entry {
                MhpEntry::Matrix(m) => {
                    let (scale, rotation, location) = m.to_scale_rotation_translation();
                    action.insert_quaternion(name, frame, rotation.normalize(), InsertMode::Replace);
                    action.insert_location(name, frame, location, InsertMode::Replace);
                    if !scale.abs_diff_eq(Vec3::ONE, 1e-5) {
                        action.insert_scale(name, frame, scale, InsertMode::Replace);
                    }
                }
                MhpEntry::Quat(q) => {
                    action.insert_quaternion(name, frame, *q, InsertMode::Replace);
                }
                MhpEntry::Scale(s) => action.insert_scale(name, frame, *s, InsertMode::Replace),
            }
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{test_chain, PoseEvaluator};

    #[test]
    fn test_matrix_is_row_major() {
        let text = "mid matrix 1 0 0 5  0 1 0 6  0 0 1 7  0 0 0 1\n";
        let file = MhpFile::parse(text).unwrap();
        let MhpEntry::Matrix(m) = file.entries[0].1 else {
            panic!("expected matrix entry");
        };
        assert_eq!(m.w_axis.truncate(), Vec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn test_unknown_lines_are_skipped() {
        let text = "# pose\nmid quat 1 0 0 0\nmid wobble 1 2\nlonely\ntip scale 2 2 2\n";
        let file = MhpFile::parse(text).unwrap();
        assert_eq!(file.entries.len(), 2);
        assert!(MhpFile::parse("mid quat 1 x 0 0").is_err());
    }

    #[test]
    fn test_save_load_apply() {
        let sk = test_chain();
        let mut action = Action::new("pose");
        let q = Quat::from_rotation_x(0.4);
        action.insert_quaternion("mid", 1.0, q, InsertMode::Replace);
        action.insert_location("root", 1.0, Vec3::new(0.0, 0.5, 0.0), InsertMode::Replace);
        let pose = PoseEvaluator::new().evaluate(&sk, &action, 1.0);

        let file = MhpFile::from_pose(&sk, &pose);
        assert_eq!(file.entries.len(), 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.mhp");
        file.save(&path).unwrap();

        let loaded = MhpFile::load(&path).unwrap();
        let mut keyed = Action::new("copy");
        assert_eq!(loaded.apply_to_action(&sk, &mut keyed, 3.0), 2);
        let got = keyed.evaluate_quaternion("mid", 3.0).unwrap();
        assert!(got.dot(q).abs() > 1.0 - 1e-6);
        let loc = keyed.evaluate_location("root", 3.0).unwrap();
        assert!(loc.abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-5));
    }
}
