//! FK/IK 骨骼链
//!
//! 骨骼按 `部位.类型.侧` 命名，例如 `upper_arm.fk.L`、`hand.ik.L`、`elbow.pt.ik.L`、
//! `foot.rev.L`、`heel.marker.L`。

use crate::config::FkIkConfig;
use crate::skeleton::{Side, Skeleton};
use crate::{MocapError, Result};

const SIDES: [Side; 2] = [Side::Left, Side::Right];

fn lookup(skeleton: &Skeleton, name: &str, chain: &str) -> Result<usize> {
    skeleton
        .find_bone(name)
        .ok_or_else(|| MocapError::missing_bone(name, chain))
}

/// 手臂：FK 三节、IK 三节与肘部极向目标
#[derive(Clone, Debug, PartialEq)]
pub struct ArmChain {
    pub side: Side,
    pub upper_fk: usize,
    pub forearm_fk: usize,
    pub hand_fk: usize,
    pub upper_ik: usize,
    pub forearm_ik: usize,
    pub hand_ik: usize,
    pub pole: usize,
}

impl ArmChain {
    pub fn resolve(skeleton: &Skeleton, side: Side) -> Result<Self> {
        let s = side.suffix();
        let chain = format!("arm{}", s);
        let get = |base: &str| lookup(skeleton, &format!("{}{}", base, s), &chain);
        Ok(Self {
            side,
            upper_fk: get("upper_arm.fk")?,
            forearm_fk: get("forearm.fk")?,
            hand_fk: get("hand.fk")?,
            upper_ik: get("upper_arm.ik")?,
            forearm_ik: get("forearm.ik")?,
            hand_ik: get("hand.ik")?,
            pole: get("elbow.pt.ik")?,
        })
    }

    /// (IK, FK) 对应骨骼，按父子顺序
    pub fn pairs(&self) -> [(usize, usize); 3] {
        [
            (self.upper_ik, self.upper_fk),
            (self.forearm_ik, self.forearm_fk),
            (self.hand_ik, self.hand_fk),
        ]
    }
}

/// 判断脚部状态用的标记骨骼
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FootMarkers {
    pub ball: usize,
    pub toe: usize,
    pub heel: usize,
}

/// 腿：FK 四节、IK 两节、腿部 IK 控制器、反向脚与膝部极向目标
#[derive(Clone, Debug, PartialEq)]
pub struct LegChain {
    pub side: Side,
    pub thigh_fk: usize,
    pub shin_fk: usize,
    pub foot_fk: usize,
    pub toe_fk: usize,
    pub thigh_ik: usize,
    pub shin_ik: usize,
    pub leg_ik: usize,
    pub foot_rev: usize,
    pub toe_rev: usize,
    pub pole: usize,
    /// 直接放在脚踝时不需要
    pub markers: Option<FootMarkers>,
}

impl LegChain {
    pub fn resolve(skeleton: &Skeleton, side: Side, ik_to_ankle: bool) -> Result<Self> {
        let s = side.suffix();
        let chain = format!("leg{}", s);
        let get = |base: &str| lookup(skeleton, &format!("{}{}", base, s), &chain);
        let markers = if ik_to_ankle {
            None
        } else {
            Some(FootMarkers {
                ball: get("ball.marker")?,
                toe: get("toe.marker")?,
                heel: get("heel.marker")?,
            })
        };
        Ok(Self {
            side,
            thigh_fk: get("thigh.fk")?,
            shin_fk: get("shin.fk")?,
            foot_fk: get("foot.fk")?,
            toe_fk: get("toe.fk")?,
            thigh_ik: get("thigh.ik")?,
            shin_ik: get("shin.ik")?,
            leg_ik: get("leg.ik")?,
            foot_rev: get("foot.rev")?,
            toe_rev: get("toe.rev")?,
            pole: get("knee.pt.ik")?,
            markers,
        })
    }
}

/// 参与转换的全部链
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RigChains {
    pub arms: Vec<ArmChain>,
    pub legs: Vec<LegChain>,
}

impl RigChains {
    pub fn resolve(skeleton: &Skeleton, config: &FkIkConfig) -> Result<Self> {
        let mut chains = Self::default();
        if config.use_arms {
            for side in SIDES {
                chains.arms.push(ArmChain::resolve(skeleton, side)?);
            }
        }
        if config.use_legs {
            for side in SIDES {
                chains.legs.push(LegChain::resolve(skeleton, side, config.ik_to_ankle)?);
            }
        }
        Ok(chains)
    }

    /// IK 链的中间关节（肘、膝）
    pub fn hinges(&self) -> Vec<usize> {
        self.arms
            .iter()
            .map(|a| a.forearm_ik)
            .chain(self.legs.iter().map(|l| l.shin_ik))
            .collect()
    }
}
