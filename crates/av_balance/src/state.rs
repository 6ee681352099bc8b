// crates/av_balance/src/state.rs

//! 平衡系数状态
//!
//! [`BalanceState`] 是建表阶段的产物：粗网格回归系数经纬度插值
//! 落到子域逐点后的只读集合，外加模式开关与派生标量。
//!
//! # 不变量
//!
//! - 系数数组严格按（子域格点数 × 垂直层数）分配，一个分析周期
//!   分配一次
//! - 建成后不可变；每次极小化迭代的正/伴随变换共享同一份系数，
//!   这是伴随精确性的前提
//! - 无同步并发读取安全

use av_foundation::{AvError, AvResult};
use av_stats::canonical::{N_THREE_LEVEL, N_TWO_LEVEL};

use crate::options::BalanceOptions;

/// 子域逐点平衡系数与模式开关
///
/// 字段布局均为点主序：`[p][k]` 或 `[p][k][l]` 平铺。
#[derive(Debug, Clone)]
pub struct BalanceState {
    /// 子域格点数
    pub npts: usize,
    /// 垂直层数
    pub nlev: usize,
    /// 模式开关（建表时校验过）
    pub options: BalanceOptions,
    /// 速度势耦合截断层：`k >= cutoff` 的耦合为零（区域路径）
    pub cutoff: usize,
    /// 纬度查表范围（1 基，诊断用）
    pub lat_bounds: (usize, usize),
    /// 温度-流函数耦合，npts × nlev × nlev（分离因子模式下为空）
    pub t_on_sf: Vec<f64>,
    /// 参考纬度温度-流函数矩阵，nlev × nlev（仅分离因子模式）
    pub t_on_sf_ref: Vec<f64>,
    /// 逐点形状因子，npts（仅分离因子模式）
    pub shape_factor: Vec<f64>,
    /// 速度势-流函数耦合，npts × nlev
    pub vp_on_sf: Vec<f64>,
    /// 地面气压-流函数耦合，npts × nlev
    pub ps_on_sf: Vec<f64>,
    /// 地面气压-温度耦合，npts × nlev（仅全球 t_to_ps；否则为空）
    pub ps_on_t: Vec<f64>,
    /// 扩展回归链系数（仅扩展模式）
    pub extended: Option<ExtendedCoeffs>,
}

/// 扩展回归链的子域逐点系数
#[derive(Debug, Clone)]
pub struct ExtendedCoeffs {
    /// 子域格点数
    pub npts: usize,
    /// 垂直层数
    pub nlev: usize,
    /// 三层系数，55 × npts × nlev × nlev，规范顺序
    pub three_level: Vec<f64>,
    /// 二层系数，11 × npts × nlev，规范顺序
    pub two_level: Vec<f64>,
}

impl ExtendedCoeffs {
    /// 全零系数表
    pub fn zeros(npts: usize, nlev: usize) -> Self {
        Self {
            npts,
            nlev,
            three_level: vec![0.0; N_THREE_LEVEL * npts * nlev * nlev],
            two_level: vec![0.0; N_TWO_LEVEL * npts * nlev],
        }
    }

    /// 三层系数块 (规范索引, 格点) 的 nlev × nlev 矩阵切片
    #[inline]
    pub fn three_level_block(&self, coeff: usize, p: usize) -> &[f64] {
        let nn = self.nlev * self.nlev;
        let base = (coeff * self.npts + p) * nn;
        &self.three_level[base..base + nn]
    }

    /// 三层系数块的可变切片（仅建表阶段使用）
    #[inline]
    pub fn three_level_block_mut(&mut self, coeff: usize, p: usize) -> &mut [f64] {
        let nn = self.nlev * self.nlev;
        let base = (coeff * self.npts + p) * nn;
        &mut self.three_level[base..base + nn]
    }

    /// 二层系数块 (规范索引, 格点) 的 nlev 向量切片
    #[inline]
    pub fn two_level_block(&self, coeff: usize, p: usize) -> &[f64] {
        let base = (coeff * self.npts + p) * self.nlev;
        &self.two_level[base..base + self.nlev]
    }

    /// 二层系数块的可变切片（仅建表阶段使用）
    #[inline]
    pub fn two_level_block_mut(&mut self, coeff: usize, p: usize) -> &mut [f64] {
        let base = (coeff * self.npts + p) * self.nlev;
        &mut self.two_level[base..base + self.nlev]
    }
}

impl BalanceState {
    /// 格点 p 的温度-流函数 nlev × nlev 矩阵切片
    #[inline]
    pub fn t_on_sf_block(&self, p: usize) -> &[f64] {
        let nn = self.nlev * self.nlev;
        &self.t_on_sf[p * nn..(p + 1) * nn]
    }

    /// 格点 p 的速度势-流函数系数列
    #[inline]
    pub fn vp_on_sf_col(&self, p: usize) -> &[f64] {
        &self.vp_on_sf[p * self.nlev..(p + 1) * self.nlev]
    }

    /// 格点 p 的地面气压-流函数系数列
    #[inline]
    pub fn ps_on_sf_col(&self, p: usize) -> &[f64] {
        &self.ps_on_sf[p * self.nlev..(p + 1) * self.nlev]
    }

    /// 格点 p 的地面气压-温度系数列
    #[inline]
    pub fn ps_on_t_col(&self, p: usize) -> &[f64] {
        &self.ps_on_t[p * self.nlev..(p + 1) * self.nlev]
    }

    /// 尺寸一致性校验
    pub fn validate(&self) -> AvResult<()> {
        let (npts, nlev) = (self.npts, self.nlev);
        if npts == 0 || nlev == 0 {
            return Err(AvError::invalid_input("平衡状态尺寸不能为零"));
        }
        self.options.validate()?;
        if self.options.separate_lat_factor {
            AvError::check_size("t_on_sf_ref", nlev * nlev, self.t_on_sf_ref.len())?;
            AvError::check_size("shape_factor", npts, self.shape_factor.len())?;
        } else {
            AvError::check_size("t_on_sf", npts * nlev * nlev, self.t_on_sf.len())?;
        }
        AvError::check_size("vp_on_sf", npts * nlev, self.vp_on_sf.len())?;
        AvError::check_size("ps_on_sf", npts * nlev, self.ps_on_sf.len())?;
        if self.options.t_to_ps {
            AvError::check_size("ps_on_t", npts * nlev, self.ps_on_t.len())?;
        }
        if self.cutoff > nlev {
            return Err(AvError::index_out_of_bounds("cutoff", self.cutoff, nlev + 1));
        }
        if self.options.extended_chain {
            let ext = self
                .extended
                .as_ref()
                .ok_or_else(|| AvError::config("扩展模式缺少链系数表"))?;
            AvError::check_size(
                "ext three_level",
                N_THREE_LEVEL * npts * nlev * nlev,
                ext.three_level.len(),
            )?;
            AvError::check_size("ext two_level", N_TWO_LEVEL * npts * nlev, ext.two_level.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DomainKind;

    fn minimal(npts: usize, nlev: usize) -> BalanceState {
        BalanceState {
            npts,
            nlev,
            options: BalanceOptions {
                domain: DomainKind::Regional,
                ..Default::default()
            },
            cutoff: nlev,
            lat_bounds: (1, 1),
            t_on_sf: vec![0.0; npts * nlev * nlev],
            t_on_sf_ref: Vec::new(),
            shape_factor: Vec::new(),
            vp_on_sf: vec![0.0; npts * nlev],
            ps_on_sf: vec![0.0; npts * nlev],
            ps_on_t: Vec::new(),
            extended: None,
        }
    }

    #[test]
    fn test_validate_minimal() {
        minimal(4, 3).validate().unwrap();
    }

    #[test]
    fn test_validate_catches_bad_sizes() {
        let mut state = minimal(4, 3);
        state.vp_on_sf.pop();
        assert!(state.validate().is_err());

        let mut state = minimal(4, 3);
        state.cutoff = 5;
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_block_accessors() {
        let mut state = minimal(2, 3);
        state.t_on_sf[9] = 5.0; // p=1, k=0, l=0
        assert_eq!(state.t_on_sf_block(1)[0], 5.0);
        state.vp_on_sf[4] = 2.0; // p=1, k=1
        assert_eq!(state.vp_on_sf_col(1)[1], 2.0);
    }

    #[test]
    fn test_extended_blocks() {
        let mut ext = ExtendedCoeffs::zeros(2, 2);
        ext.three_level_block_mut(3, 1)[2] = 1.5;
        assert_eq!(ext.three_level_block(3, 1)[2], 1.5);
        ext.two_level_block_mut(10, 0)[1] = 0.5;
        assert_eq!(ext.two_level_block(10, 0)[1], 0.5);
    }
}
