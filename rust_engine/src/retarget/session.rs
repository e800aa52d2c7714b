//! 重定向会话
//!
//! 对每对（目标骨骼, 源骨骼）在 T-pose 下计算：
//! - `A = rot(Mₛ)⁻¹ · rot(Mₜ)`：源骨架空间朝向到目标朝向的校正
//! - `B = restₜ⁻¹ · rest_parent`（无重定向父级时为 `restₜ⁻¹`）
//!
//! 逐帧：`Mₜ(f) = Mₛ(f) · A`（平移取源骨骼），`L' = B · parent(f)⁻¹ · Mₜ(f)`，
//! 施加锁定与限制得到 `Lᶜ` 并写入关键帧，缓存 `parent(f) · B⁻¹ · Lᶜ` 供子骨骼使用。

use std::path::Path;

use glam::{Mat3, Mat4};

use super::guard::{FrameGuard, OverrideGuard};
use super::locks::BoneCorrection;
use super::progress::{should_report, ProgressSink};
use super::sink::{ActionSink, FrameSink};
use super::tpose::TPose;
use crate::animation::{load_bvh, Action, ActionLibrary, InsertMode};
use crate::config::{BvhLoadConfig, RetargetConfig};
use crate::curves::keep_above_floor;
use crate::math::{is_rotation, rotation_part, translation_of, with_translation};
use crate::rig::{AutoIdentifier, RigManifest, RigRegistry, RoleSource, TargetChoice};
use crate::skeleton::{world_to_basis, CanonicalRole, PoseEvaluator, Skeleton};
use crate::{MocapError, Result};

/// 一对配对骨骼的缓存数据
#[derive(Clone, Debug)]
pub struct BonePair {
    pub target: usize,
    pub source: usize,
    pub a: Mat4,
    pub b: Mat4,
    pub b_inv: Mat4,
    /// 目标骨架中的重定向父级
    pub parent: Option<usize>,
    pub correction: Option<BoneCorrection>,
}

impl BonePair {
    /// 只有没有重定向父级的骨骼写入位置
    pub fn keys_location(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetargetReport {
    /// 写入动作库的动作名；帧范围为空时为 None
    pub action_name: Option<String>,
    pub frames: usize,
    pub keyed_bones: usize,
    /// 找不到源骨骼而未写入的目标骨骼
    pub skipped_bones: Vec<String>,
}

pub struct RetargetSession {
    pub source: Skeleton,
    pub source_action: Action,
    pub target: Skeleton,
    pub library: ActionLibrary,
    pub config: RetargetConfig,
    pub source_tpose: Option<TPose>,
    pub target_tpose: Option<TPose>,
    /// 跟随同角色骨骼的 IK 控制骨骼（来自目标描述文件）
    pub ik_bones: Vec<(String, CanonicalRole)>,
    pairs: Vec<BonePair>,
    skipped: Vec<String>,
}

impl RetargetSession {
    pub fn new(
        source: Skeleton,
        source_action: Action,
        target: Skeleton,
        library: ActionLibrary,
        config: RetargetConfig,
    ) -> Self {
        Self {
            source,
            source_action,
            target,
            library,
            config,
            source_tpose: None,
            target_tpose: None,
            ik_bones: Vec::new(),
            pairs: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// 加载 BVH 作为源；`auto_scale` 时按目标身高缩放源骨架
    pub fn from_bvh<P: AsRef<Path>>(
        path: P,
        bvh: &BvhLoadConfig,
        target: Skeleton,
        library: ActionLibrary,
        config: RetargetConfig,
    ) -> Result<Self> {
        let (source, action) = load_bvh(path, bvh)?;
        let mut session = Self::new(source, action, target, library, config);
        if bvh.auto_scale {
            session.auto_scale();
        }
        Ok(session)
    }

    /// 源骨架与位置曲线按 目标身高 / 源身高 缩放，返回缩放系数
    pub fn auto_scale(&mut self) -> f32 {
        let source_height = self.source.height();
        let target_height = self.target.height();
        if source_height < 1e-6 || target_height < 1e-6 {
            log::warn!("骨架高度为零，跳过自动缩放");
            return 1.0;
        }
        let factor = target_height / source_height;
        self.source.rescale(factor);
        self.source_action.scale_locations(factor);
        log::debug!("自动缩放系数 {}", factor);
        factor
    }

    pub fn with_tposes(mut self, source: Option<TPose>, target: Option<TPose>) -> Self {
        self.source_tpose = source;
        self.target_tpose = target;
        self
    }

    /// 为源骨架和目标骨架写入角色；角色来自描述文件时同时读取其 T-pose（已设置的不覆盖）
    pub fn assign_roles(
        &mut self,
        registry: &RigRegistry,
        choice: &TargetChoice,
        identifier: &AutoIdentifier,
    ) -> Result<(RoleSource, Option<RoleSource>)> {
        let source = registry.assign_source_roles(&mut self.source, identifier)?;
        if let RoleSource::Manifest(name) = &source {
            match registry.source(name) {
                Some(manifest) if self.source_tpose.is_none() => {
                    self.source_tpose = manifest_tpose(manifest)?;
                }
                _ => {}
            }
        }

        let has_target_roles = self.target.bones().iter().any(|b| b.role.is_some());
        let target = if self.config.auto_target || !has_target_roles {
            Some(registry.assign_target_roles(&mut self.target, choice, identifier)?)
        } else {
            None
        };
        if let Some(RoleSource::Manifest(name)) = &target {
            if let Some(manifest) = registry.target(name) {
                if self.target_tpose.is_none() {
                    self.target_tpose = manifest_tpose(manifest)?;
                }
                self.ik_bones = manifest.ik_bones.clone();
            }
        }
        Ok((source, target))
    }

    pub fn pairs(&self) -> &[BonePair] {
        &self.pairs
    }

    /// 断开髋部，计算 A/B 矩阵并读取锁定与限制，返回配对数
    pub fn prepare(&mut self) -> Result<usize> {
        if let Some(hips) = self.target.find_role(&CanonicalRole::Hips) {
            self.target.bone_mut(hips).connected = false;
        }

        let source_world = self
            .source_tpose
            .clone()
            .unwrap_or_else(|| TPose::auto(&self.source))
            .world(&self.source);
        let target_world = self
            .target_tpose
            .clone()
            .unwrap_or_else(|| TPose::auto(&self.target))
            .world(&self.target);

        self.pairs.clear();
        self.skipped.clear();
        for &t in self.target.sorted_indices() {
            let bone = self.target.bone(t);
            let Some(role) = &bone.role else { continue };
            let Some(s) = self.source.find_role(role) else {
                log::warn!("{}", MocapError::missing_bone(role.name(), &bone.name));
                self.skipped.push(bone.name.clone());
                continue;
            };

            let source_rot = rotation_part(&source_world[s]);
            let target_rot = rotation_part(&target_world[t]);
            let a = Mat4::from_mat3(source_rot.transpose() * target_rot);

            let parent = self.target.retarget_parent(t);
            let rest_inv = bone.matrix_rest.inverse();
            let b = match parent {
                Some(p) => rest_inv * self.target.bone(p).matrix_rest,
                None => rest_inv,
            };
            self.pairs.push(BonePair {
                target: t,
                source: s,
                a,
                b,
                b_inv: b.inverse(),
                parent,
                correction: BoneCorrection::for_bone(bone, self.config.use_locks, self.config.use_limits),
            });
        }

        if self.pairs.is_empty() {
            return Err(MocapError::rig_mismatch(
                format!(
                    "no bone of {} has a role shared with {}",
                    self.target.name, self.source.name
                ),
                None,
            ));
        }
        Ok(self.pairs.len())
    }

    /// 源动作帧范围与配置范围的交集
    fn frames(&self) -> Vec<i32> {
        let Some((first, last)) = self.source_action.frame_range() else {
            return Vec::new();
        };
        let start = self.config.start_frame.max(first.ceil() as i32);
        let end = self.config.end_frame.min(last.floor() as i32);
        (start..=end).collect()
    }

    /// 使用外部帧游标运行
    pub fn run<S, P>(&mut self, sink: &mut S, progress: &mut P) -> Result<RetargetReport>
    where
        S: FrameSink + ?Sized,
        P: ProgressSink + ?Sized,
    {
        self.prepare().map_err(|e| e.in_category("Retarget"))?;
        let frames = self.frames();
        let action = retarget_frames(
            &self.pairs,
            &mut self.target,
            sink,
            progress,
            &frames,
            &self.config,
            &self.source_action.name,
        );
        Ok(self.finish(action, frames.len()))
    }

    /// 在源动作上用姿态求值器运行
    pub fn run_action<P>(&mut self, progress: &mut P) -> Result<RetargetReport>
    where
        P: ProgressSink + ?Sized,
    {
        self.prepare().map_err(|e| e.in_category("Retarget"))?;
        let frames = self.frames();
        let action = {
            let Self {
                source,
                source_action,
                target,
                config,
                pairs,
                ..
            } = self;
            let mut sink = ActionSink::new(source, source_action, PoseEvaluator::new());
            retarget_frames(
                pairs,
                target,
                &mut sink,
                progress,
                &frames,
                config,
                &source_action.name,
            )
        };
        Ok(self.finish(action, frames.len()))
    }

    fn finish(&mut self, action: Option<Action>, frames: usize) -> RetargetReport {
        let mut report = RetargetReport {
            action_name: None,
            frames,
            keyed_bones: self.pairs.len(),
            skipped_bones: self.skipped.clone(),
        };
        let Some(mut action) = action else {
            return report;
        };
        if self.config.keep_above_floor {
            keep_above_floor(&self.target, &mut action, self.config.floor_z, None);
        }
        if !self.ik_bones.is_empty() {
            match_ik_bones(&self.target, &mut action, &self.ik_bones);
        }
        report.action_name = Some(self.library.add_active(action));
        log::info!(
            "重定向完成: {} -> {}（{} 帧，{} 骨骼）",
            self.source.name,
            self.target.name,
            frames,
            self.pairs.len()
        );
        report
    }

    /// 交还目标骨架与动作库
    pub fn into_parts(self) -> (Skeleton, ActionLibrary) {
        (self.target, self.library)
    }
}

fn manifest_tpose(manifest: &RigManifest) -> Result<Option<TPose>> {
    let Some(path) = &manifest.t_pose else {
        return Ok(None);
    };
    let tpose = TPose::load(path).map_err(|e| e.in_category("Load T-pose"))?;
    log::info!("描述 {} 使用 T-pose {}（{} 骨骼）", manifest.name, path.display(), tpose.len());
    Ok(Some(tpose))
}

/// IK 控制骨骼放到同角色骨骼的位置与朝向（保留两者静止姿态的差），返回处理的骨骼数
fn match_ik_bones(target: &Skeleton, action: &mut Action, ik_bones: &[(String, CanonicalRole)]) -> usize {
    let mut pairs = Vec::new();
    for (name, role) in ik_bones {
        match (target.find_bone(name), target.find_role(role)) {
            (Some(ik), Some(fk)) => pairs.push((ik, fk)),
            (None, _) => log::warn!("{}", MocapError::missing_bone(name, format!("IkBones of {}", target.name))),
            (Some(_), None) => log::warn!("IK 骨骼 {} 的角色 {} 没有对应骨骼", name, role.name()),
        }
    }
    let Some((first, last)) = action.frame_range() else {
        return 0;
    };
    if pairs.is_empty() {
        return 0;
    }

    let evaluator = PoseEvaluator::new();
    let mut keys = Vec::new();
    for frame in first.ceil() as i32..=last.floor() as i32 {
        let pose = evaluator.evaluate(target, action, frame as f32);
        for &(ik, fk) in &pairs {
            let offset = target.bone(fk).rest_rotation().transpose() * target.bone(ik).rest_rotation();
            let rotation = rotation_part(&pose.world[fk]) * offset;
            let world = with_translation(Mat4::from_mat3(rotation), translation_of(&pose.world[fk]));
            let parent = target.bone(ik).parent.map(|p| pose.world[p]);
            keys.push((ik, frame as f32, world_to_basis(target, ik, &world, parent.as_ref())));
        }
    }
    for (ik, frame, basis) in keys {
        action.insert_basis(target.bone(ik), frame, &basis, true, InsertMode::Fast);
    }
    action.resort();
    pairs.len()
}

/// 逐帧传递；帧列表为空时不产生动作
fn retarget_frames<S, P>(
    pairs: &[BonePair],
    target: &mut Skeleton,
    sink: &mut S,
    progress: &mut P,
    frames: &[i32],
    config: &RetargetConfig,
    name: &str,
) -> Option<Action>
where
    S: FrameSink + ?Sized,
    P: ProgressSink + ?Sized,
{
    if frames.is_empty() {
        log::warn!("重定向帧范围为空");
        return None;
    }

    let guard = OverrideGuard::new(target);
    let mut cursor = FrameGuard::new(sink);
    let target = guard.skeleton();
    let mut action = Action::new(name);
    let mut cache: Vec<Option<Mat4>> = vec![None; target.len()];

    for (done, &frame) in frames.iter().enumerate() {
        cursor.sink().set_frame(frame);
        cache.iter_mut().for_each(|c| *c = None);

        for pair in pairs {
            let ms = cursor.sink().evaluate_bone(pair.source);
            let check = is_rotation(&rotation_part(&ms));
            if !check.is_valid() {
                log::warn!(
                    "帧 {} 源骨骼 {} 不是旋转矩阵（行列式 {}）",
                    frame,
                    pair.source,
                    check.determinant
                );
            }

            let mt = with_translation(ms * pair.a, translation_of(&ms));
            let parent_world = pair
                .parent
                .map(|p| cache[p].unwrap_or(target.bone(p).matrix_rest));
            let local = match parent_world {
                Some(pw) => pw.inverse() * mt,
                None => mt,
            };
            let basis = pair.b * local;
            let corrected = match &pair.correction {
                Some(c) => c.apply(&basis),
                None => basis,
            };

            let bone = target.bone(pair.target);
            action.insert_basis(bone, frame as f32, &corrected, pair.keys_location(), InsertMode::Fast);

            let world = pair.b_inv * corrected;
            cache[pair.target] = Some(match parent_world {
                Some(pw) => pw * world,
                None => world,
            });
        }

        if should_report(done + 1, frames.len(), config.progress_interval) {
            progress.report(done + 1, frames.len());
        }
    }

    action.resort();
    Some(action)
}

/// 目标骨骼在骨架空间中的朝向与源骨骼朝向之差：`rot(Mₛ)⁻¹ · rot(Mₜ)`
pub fn alignment(source_world: &Mat4, target_world: &Mat4) -> Mat3 {
    rotation_part(source_world).transpose() * rotation_part(target_world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::InsertMode;
    use crate::rig::{test_humanoid, ManifestKind};
    use crate::skeleton::{AxisLimit, Bone, Constraint, Side};
    use glam::{Quat, Vec3};

    /// 目标骨架：与源拓扑相同但骨骼方向与比例不同
    fn target_rig() -> Skeleton {
        let mut sk = test_humanoid();
        sk.name = "target".into();
        sk.rescale(1.2);
        // 目标的前臂带有滚转
        let fore = sk.find_bone("lowerarm_L").unwrap();
        let (head, tail) = (sk.bone(fore).head, sk.bone(fore).tail);
        sk.bone_mut(fore).set_bone(head, tail, 0.7);
        sk.build_hierarchy();
        sk
    }

    fn source_action() -> Action {
        let mut action = Action::new("walk");
        for frame in 1..=6 {
            let t = frame as f32;
            action.insert_location("pelvis", t, Vec3::new(0.0, 0.05 * t, 0.0), InsertMode::Replace);
            action.insert_quaternion("pelvis", t, Quat::from_rotation_y(0.05 * t), InsertMode::Replace);
            action.insert_quaternion("thigh_L", t, Quat::from_rotation_x(0.1 * t), InsertMode::Replace);
            action.insert_quaternion("upperarm_L", t, Quat::from_rotation_z(-0.08 * t), InsertMode::Replace);
            action.insert_quaternion("lowerarm_L", t, Quat::from_rotation_x(0.2 * t), InsertMode::Replace);
        }
        action
    }

    fn session() -> RetargetSession {
        let source = test_humanoid();
        let action = source_action();
        let mut session = RetargetSession::new(
            source,
            action,
            target_rig(),
            ActionLibrary::new(),
            RetargetConfig::default(),
        );
        session
            .assign_roles(&RigRegistry::new(), &TargetChoice::Automatic, &AutoIdentifier::new())
            .unwrap();
        session
    }

    #[test]
    fn test_alignment_is_constant_over_frames() {
        let mut session = session();
        let report = session.run_action(&mut crate::retarget::NoProgress).unwrap();
        assert_eq!(report.frames, 6);
        assert_eq!(report.action_name.as_deref(), Some("walk"));
        assert!(report.skipped_bones.is_empty());

        let action = session.library.active().unwrap();
        let eval = PoseEvaluator::new();
        for frame in [1.0, 3.0, 6.0] {
            let src = eval.evaluate(&session.source, &session.source_action, frame);
            let tgt = eval.evaluate(&session.target, action, frame);
            for pair in session.pairs() {
                let got = alignment(&src.world[pair.source], &tgt.world[pair.target]);
                assert!(
                    got.abs_diff_eq(Mat3::from_mat4(pair.a), 1e-4),
                    "frame {} bone {}",
                    frame,
                    session.target.bone(pair.target).name
                );
            }
            let hips = session.target.find_bone("pelvis").unwrap();
            let src_hips = session.source.find_bone("pelvis").unwrap();
            assert!(translation_of(&tgt.world[hips]).abs_diff_eq(translation_of(&src.world[src_hips]), 1e-4));
        }
        assert!(!session.target.bone_by_name("pelvis").unwrap().connected);
    }

    /// 目标描述文件：角色取自动识别结果，附带 T-pose 与 IK 控制骨骼
    fn manifest_registry(dir: &Path, target: &Skeleton) -> RigRegistry {
        let mut manifest = RigManifest::new("target", ManifestKind::Target);
        manifest.bones = AutoIdentifier::new()
            .identify(target)
            .unwrap()
            .into_iter()
            .map(|(i, role)| (target.bone(i).name.clone(), role))
            .collect();
        manifest.ik_bones = vec![("hand.ik.L".to_string(), CanonicalRole::Hand(Side::Left))];
        manifest.t_pose = Some("target.json".into());
        manifest.save(dir.join("target.trg")).unwrap();

        let mut tpose = TPose::new();
        tpose.set("upperarm_L", Quat::from_rotation_x(0.4));
        tpose.set("thigh_R", Quat::from_rotation_z(-0.3));
        tpose.save(dir.join("target.json")).unwrap();

        let mut registry = RigRegistry::new();
        assert_eq!(registry.load_dir(dir).unwrap(), 1);
        registry
    }

    #[test]
    fn test_manifest_tpose_and_ik_bones_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target_rig();
        let registry = manifest_registry(dir.path(), &target);
        let hand = target.bone_by_name("hand_L").unwrap();
        let (head, tail) = (hand.head, hand.tail + Vec3::Z * 0.03);
        target.add_bone(Bone::new("hand.ik.L", head, tail, 0.0), Some("root")).unwrap();

        let auto_a = {
            let mut auto = session();
            auto.prepare().unwrap();
            let upper = auto.target.find_bone("upperarm_L").unwrap();
            auto.pairs().iter().find(|p| p.target == upper).unwrap().a
        };

        let mut session = RetargetSession::new(
            test_humanoid(),
            source_action(),
            target,
            ActionLibrary::new(),
            RetargetConfig::default(),
        );
        let (_, target_roles) = session
            .assign_roles(&registry, &TargetChoice::Named("target".into()), &AutoIdentifier::new())
            .unwrap();
        assert_eq!(target_roles, Some(RoleSource::Manifest("target".into())));
        assert!(session.target_tpose.is_some());
        assert_eq!(session.ik_bones.len(), 1);
        session.run_action(&mut crate::retarget::NoProgress).unwrap();

        // 存储的 T-pose 改变了 A
        let upper = session.target.find_bone("upperarm_L").unwrap();
        let a = session.pairs().iter().find(|p| p.target == upper).unwrap().a;
        assert!(!Mat3::from_mat4(a).abs_diff_eq(Mat3::from_mat4(auto_a), 1e-2));

        let action = session.library.active().unwrap();
        let eval = PoseEvaluator::new();
        let ik = session.target.find_bone("hand.ik.L").unwrap();
        let fk = session.target.find_bone("hand_L").unwrap();
        for frame in [1.0, 4.0, 6.0] {
            let src = eval.evaluate(&session.source, &session.source_action, frame);
            let tgt = eval.evaluate(&session.target, action, frame);
            for pair in session.pairs() {
                let got = alignment(&src.world[pair.source], &tgt.world[pair.target]);
                assert!(
                    got.abs_diff_eq(Mat3::from_mat4(pair.a), 1e-4),
                    "frame {} bone {}",
                    frame,
                    session.target.bone(pair.target).name
                );
            }
            // IK 控制骨骼跟随手部
            assert!(translation_of(&tgt.world[ik]).abs_diff_eq(translation_of(&tgt.world[fk]), 1e-4));
            let expected = rotation_part(&tgt.world[fk])
                * session.target.bone(fk).rest_rotation().transpose()
                * session.target.bone(ik).rest_rotation();
            assert!(rotation_part(&tgt.world[ik]).abs_diff_eq(expected, 1e-4));
        }
    }

    #[test]
    fn test_missing_manifest_tpose_reports_category() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_rig();
        let registry = manifest_registry(dir.path(), &target);
        std::fs::remove_file(dir.path().join("target.json")).unwrap();
        let mut session = RetargetSession::new(
            test_humanoid(),
            source_action(),
            target,
            ActionLibrary::new(),
            RetargetConfig::default(),
        );
        let err = session
            .assign_roles(&registry, &TargetChoice::Named("target".into()), &AutoIdentifier::new())
            .unwrap_err();
        assert!(err.to_string().starts_with("Category: Load T-pose"), "{}", err);
    }

    #[test]
    fn test_locked_bone_keeps_zero_component_and_overrides_restored() {
        let mut session = session();
        let fore = session.target.find_bone("lowerarm_L").unwrap();
        session.target.bone_mut(fore).lock_rotation = [true, false, false];
        session
            .target
            .bone_mut(fore)
            .constraints
            .push(Constraint::limit_rotation([AxisLimit::new(-0.5, 0.5); 3]));
        let mut reports = Vec::new();
        let mut progress = |done: usize, total: usize| reports.push((done, total));
        session.run_action(&mut progress).unwrap();
        assert_eq!(reports.last(), Some(&(6, 6)));

        let action = session.library.active().unwrap();
        let bone: &Bone = session.target.bone(fore);
        for frame in 1..=6 {
            let q = action.evaluate_quaternion(&bone.name, frame as f32).unwrap();
            let e = crate::math::euler_from_matrix(&Mat3::from_quat(q), crate::math::RotationOrder::XYZ);
            assert!(e.x.abs() < 1e-4, "frame {} {:?}", frame, e);
            assert!(e.y.abs() <= 0.5 + 1e-4 && e.z.abs() <= 0.5 + 1e-4);
        }
        assert_eq!(session.target.bone(fore).constraints[0].influence, 1.0);
    }

    #[test]
    fn test_missing_source_role_is_skipped() {
        let mut session = session();
        session.source.bone_by_name_mut("head").unwrap().role = None;
        let report = session.run_action(&mut crate::retarget::NoProgress).unwrap();
        assert_eq!(report.skipped_bones, vec!["head".to_string()]);
        let action = session.library.active().unwrap();
        assert!(!action.has_channel("head", crate::animation::ChannelKind::RotationQuaternion));
    }

    #[test]
    fn test_empty_range_is_noop() {
        let mut session = session();
        session.config.start_frame = 100;
        let report = session.run_action(&mut crate::retarget::NoProgress).unwrap();
        assert_eq!(report.action_name, None);
        assert!(session.library.is_empty());
    }

    #[test]
    fn test_fn_sink_and_new_action_replaces_active() {
        let mut session = session();
        session.run_action(&mut crate::retarget::NoProgress).unwrap();
        // 源骨架保持静止姿态
        let rest: Vec<Mat4> = session.source.bones().iter().map(|b| b.matrix_rest).collect();
        let mut sink = crate::retarget::FnSink::new(move |_, bone| rest[bone]);
        sink.set_frame(-5);
        let report = session.run(&mut sink, &mut crate::retarget::NoProgress).unwrap();
        assert_eq!(report.action_name.as_deref(), Some("walk.001"));
        assert_eq!(session.library.len(), 2);
        assert_eq!(sink.current_frame(), -5);
    }

    #[test]
    fn test_no_shared_roles_is_rig_mismatch() {
        let mut session = session();
        session.source.clear_roles();
        let err = session.run_action(&mut crate::retarget::NoProgress).unwrap_err();
        assert!(matches!(err.kind(), MocapError::RigMismatch { .. }));
        assert!(err.to_string().starts_with("Category: Retarget"));
    }
}
