// crates/av_balance/src/options.rs

//! 平衡算子配置
//!
//! 定义平衡变换的模式开关，使用纯数据类型以便 JSON 序列化。
//! 解析配置文件由上层完成，本模块只负责取默认值与一致性校验。

use av_foundation::{AvError, AvResult};
use serde::{Deserialize, Serialize};

/// 水平域类别
///
/// 全球与区域是结构不同的两条代码路径：数据布局、插值与
/// 地面气压投影均不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    /// 全球分析
    #[default]
    Global,
    /// 区域分析
    Regional,
    /// 区域二维变量分析（截断层策略略有不同）
    RegionalTwoD,
}

impl DomainKind {
    /// 是否区域路径（含二维变量变体）
    pub fn is_regional(&self) -> bool {
        matches!(self, Self::Regional | Self::RegionalTwoD)
    }
}

/// 平衡算子模式开关
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceOptions {
    /// 水平域类别
    #[serde(default)]
    pub domain: DomainKind,

    /// 全局无平衡：插值后把所有耦合系数置零
    #[serde(default)]
    pub no_balance: bool,

    /// 单变量分析模式：效果同 no_balance，另发诊断
    #[serde(default)]
    pub univariate: bool,

    /// 分离纬度因子模式（仅区域）：温度-流函数投影退化为
    /// 参考纬度系数 × 形状因子
    #[serde(default)]
    pub separate_lat_factor: bool,

    /// 启用扩展多变量回归链
    #[serde(default)]
    pub extended_chain: bool,

    /// 全投影（仅全球）：地面气压对全部层求和；
    /// 关闭时保留历史的顶层折算变体
    #[serde(default = "default_true")]
    pub full_surface_projection: bool,

    /// 温度到地面气压交叉项（仅全球全投影）
    #[serde(default)]
    pub t_to_ps: bool,

    /// 强约束迭代次数
    #[serde(default)]
    pub constraint_iterations: usize,

    /// 强约束保留的垂直模态数
    #[serde(default)]
    pub retained_vertical_modes: usize,
}

fn default_true() -> bool {
    true
}

impl Default for BalanceOptions {
    fn default() -> Self {
        Self {
            domain: DomainKind::default(),
            no_balance: false,
            univariate: false,
            separate_lat_factor: false,
            extended_chain: false,
            full_surface_projection: true,
            t_to_ps: false,
            constraint_iterations: 0,
            retained_vertical_modes: 0,
        }
    }
}

impl BalanceOptions {
    /// 一致性校验
    ///
    /// 拒绝互相矛盾的开关组合；在建表前调用一次。
    pub fn validate(&self) -> AvResult<()> {
        if self.separate_lat_factor && !self.domain.is_regional() {
            return Err(AvError::invalid_config(
                "separate_lat_factor",
                "true",
                "分离纬度因子只在区域路径可用",
            ));
        }
        if self.t_to_ps && !self.full_surface_projection {
            return Err(AvError::invalid_config(
                "t_to_ps",
                "true",
                "温度交叉项要求开启全投影",
            ));
        }
        if self.t_to_ps && self.domain.is_regional() {
            return Err(AvError::invalid_config(
                "t_to_ps",
                "true",
                "温度交叉项只在全球路径可用",
            ));
        }
        Ok(())
    }

    /// 插值后是否把所有耦合置零
    pub fn zero_couplings(&self) -> bool {
        self.no_balance || self.univariate
    }

    /// 强约束是否生效
    pub fn constraint_active(&self) -> bool {
        self.constraint_iterations > 0 && self.retained_vertical_modes > 0
    }
}
