// crates/av_balance/src/builder.rs

//! 回归系数建表
//!
//! 把粗纬度带上的回归系数经双线性纬度插值落到子域逐点，产出只读的
//! [`BalanceState`]。每个分析周期执行一次，属于一次性建表阶段；
//! 所有可失败检查集中在这里，变换热路径不再做错误处理。
//!
//! # 步骤
//!
//! 1. 校验开关组合、统计集与纬度映射（范围外索引属于不变量违规）
//! 2. 计算速度势耦合截断层
//! 3. 逐点插值基础系数（分离因子模式下温度矩阵取参考纬度一份）
//! 4. 扩展模式：按清单逐项填充规范槽位，按逐点体制指示选子表
//! 5. 无平衡/单变量模式：插值后整体置零

use av_foundation::{AvError, AvResult};
use av_grid::LatitudeMap;
use av_stats::canonical::CoeffId;
use av_stats::manifest::ExtendedManifest;
use av_stats::store::BalanceStats;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::options::{BalanceOptions, DomainKind};
use crate::state::{BalanceState, ExtendedCoeffs};

/// 截断阈值：参考气压低于 0.8 倍参考地面气压处截断速度势耦合
const CUTOFF_PRESSURE_RATIO: f64 = 0.8;

/// 平衡系数建表器
pub struct RegressionBuilder<'a> {
    stats: &'a BalanceStats,
    map: &'a LatitudeMap,
    options: BalanceOptions,
    /// 逐点纬度体制指示（0 陆地 / 1 海洋 / 2 其他），仅扩展模式
    regimes: Option<&'a [u8]>,
    /// 扩展模式清单
    manifest: Option<&'a ExtendedManifest>,
}

impl<'a> RegressionBuilder<'a> {
    /// 创建建表器
    pub fn new(stats: &'a BalanceStats, map: &'a LatitudeMap, options: BalanceOptions) -> Self {
        Self {
            stats,
            map,
            options,
            regimes: None,
            manifest: None,
        }
    }

    /// 提供逐点纬度体制指示（扩展模式必需）
    pub fn with_regimes(mut self, regimes: &'a [u8]) -> Self {
        self.regimes = Some(regimes);
        self
    }

    /// 提供扩展模式清单（扩展模式必需）
    pub fn with_manifest(mut self, manifest: &'a ExtendedManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// 建表
    pub fn build(self) -> AvResult<BalanceState> {
        self.options.validate()?;
        self.stats.validate()?;
        self.map.check_bounds()?;
        AvError::check_size("lat_axis/map", self.stats.nlat, self.map.table_len)?;

        let npts = self.map.n_points();
        let nlev = self.stats.nlev;
        let cutoff = compute_cutoff(
            &self.stats.p_ref,
            self.stats.ps_ref,
            self.options.domain,
        );

        // 逐点插值权重
        let weights: Vec<(usize, usize, f64)> =
            (0..npts).map(|p| self.map.interp_weights(p)).collect();

        // 温度-流函数耦合
        let (t_on_sf, t_on_sf_ref, shape_factor) = if self.options.separate_lat_factor {
            let ref_idx = self.map.ref_index.ok_or_else(|| {
                AvError::config("分离因子模式要求纬度映射携带参考索引")
            })?;
            AvError::check_size("shape_factor", npts, self.map.shape_factor.len())?;
            let (i1, i2, w) = LatitudeMap::weights_of(ref_idx, self.stats.nlat);
            let mut reference = vec![0.0; nlev * nlev];
            for k in 0..nlev {
                for l in 0..nlev {
                    reference[k * nlev + l] =
                        (1.0 - w) * self.stats.t_on_sf(i1, k, l) + w * self.stats.t_on_sf(i2, k, l);
                }
            }
            (Vec::new(), reference, self.map.shape_factor.clone())
        } else {
            let mut full = vec![0.0; npts * nlev * nlev];
            full.par_chunks_mut(nlev * nlev)
                .enumerate()
                .for_each(|(p, block)| {
                    let (i1, i2, w) = weights[p];
                    for k in 0..nlev {
                        for l in 0..nlev {
                            block[k * nlev + l] = (1.0 - w) * self.stats.t_on_sf(i1, k, l)
                                + w * self.stats.t_on_sf(i2, k, l);
                        }
                    }
                });
            (full, Vec::new(), Vec::new())
        };

        // 速度势 / 地面气压耦合
        let mut vp_on_sf = vec![0.0; npts * nlev];
        let mut ps_on_sf = vec![0.0; npts * nlev];
        vp_on_sf
            .par_chunks_mut(nlev)
            .zip(ps_on_sf.par_chunks_mut(nlev))
            .enumerate()
            .for_each(|(p, (vp_col, ps_col))| {
                let (i1, i2, w) = weights[p];
                for k in 0..nlev {
                    vp_col[k] =
                        (1.0 - w) * self.stats.vp_on_sf(i1, k) + w * self.stats.vp_on_sf(i2, k);
                    ps_col[k] =
                        (1.0 - w) * self.stats.ps_on_sf(i1, k) + w * self.stats.ps_on_sf(i2, k);
                }
            });

        // 截断层以上速度势耦合强制为零（区域路径；全球 cutoff == nlev）
        for p in 0..npts {
            for k in cutoff..nlev {
                vp_on_sf[p * nlev + k] = 0.0;
            }
        }

        let ps_on_t = if self.options.t_to_ps {
            let mut out = vec![0.0; npts * nlev];
            out.par_chunks_mut(nlev).enumerate().for_each(|(p, col)| {
                let (i1, i2, w) = weights[p];
                for k in 0..nlev {
                    col[k] = (1.0 - w) * self.stats.ps_on_t(i1, k) + w * self.stats.ps_on_t(i2, k);
                }
            });
            out
        } else {
            Vec::new()
        };

        // 扩展回归链系数
        let extended = if self.options.extended_chain {
            Some(self.build_extended(&weights, npts, nlev)?)
        } else {
            None
        };

        let mut state = BalanceState {
            npts,
            nlev,
            options: self.options.clone(),
            cutoff,
            lat_bounds: (self.map.idx_min, self.map.idx_max),
            t_on_sf,
            t_on_sf_ref,
            shape_factor,
            vp_on_sf,
            ps_on_sf,
            ps_on_t,
            extended,
        };

        // 无平衡/单变量：插值后把所有耦合置零
        if self.options.zero_couplings() {
            if self.options.univariate {
                warn!("单变量分析模式：所有平衡耦合系数置零");
            }
            zero_couplings(&mut state);
        }

        state.validate()?;
        debug!(
            npts,
            nlev,
            cutoff,
            lat_min = state.lat_bounds.0,
            lat_max = state.lat_bounds.1,
            extended = state.extended.is_some(),
            "平衡系数建表完成"
        );
        Ok(state)
    }

    fn build_extended(
        &self,
        weights: &[(usize, usize, f64)],
        npts: usize,
        nlev: usize,
    ) -> AvResult<ExtendedCoeffs> {
        let ext_stats = self
            .stats
            .extended
            .as_ref()
            .ok_or_else(|| AvError::config("请求扩展模式，但统计文件不含扩展系数表"))?;
        let manifest = self
            .manifest
            .ok_or_else(|| AvError::config("请求扩展模式，但未提供变量清单"))?;
        let regimes = self
            .regimes
            .ok_or_else(|| AvError::config("请求扩展模式，但未提供逐点纬度体制指示"))?;
        AvError::check_size("regimes", npts, regimes.len())?;

        let n_regimes = ext_stats.n_regimes;
        if let Some(p) = regimes.iter().position(|&r| r as usize >= n_regimes) {
            return Err(AvError::invalid_config(
                "regimes",
                regimes[p].to_string(),
                format!("点 {p} 的体制指示越界，统计文件只含 {n_regimes} 个体制"),
            ));
        }
        let mut ext = ExtendedCoeffs::zeros(npts, nlev);

        for entry in &manifest.entries {
            let Some(id) = entry.id else {
                // 表外名字：槽位保持为零（解析时已发诊断）
                continue;
            };
            match id {
                CoeffId::ThreeLevel(c) => {
                    let nn = nlev * nlev;
                    ext.three_level[c * npts * nn..(c + 1) * npts * nn]
                        .par_chunks_mut(nn)
                        .enumerate()
                        .for_each(|(p, block)| {
                            let (i1, i2, w) = weights[p];
                            let r = regimes[p] as usize;
                            for k in 0..nlev {
                                for l in 0..nlev {
                                    block[k * nlev + l] = (1.0 - w)
                                        * ext_stats.three_level(r, c, i1, k, l)
                                        + w * ext_stats.three_level(r, c, i2, k, l);
                                }
                            }
                        });
                }
                CoeffId::TwoLevel(c) => {
                    ext.two_level[c * npts * nlev..(c + 1) * npts * nlev]
                        .par_chunks_mut(nlev)
                        .enumerate()
                        .for_each(|(p, col)| {
                            let (i1, i2, w) = weights[p];
                            let r = regimes[p] as usize;
                            for k in 0..nlev {
                                col[k] = (1.0 - w) * ext_stats.two_level(r, c, i1, k)
                                    + w * ext_stats.two_level(r, c, i2, k);
                            }
                        });
                }
            }
        }

        Ok(ext)
    }
}

/// 计算速度势耦合截断层
///
/// 自下而上第一个参考气压低于 `0.8 * ps_ref` 的层。
/// 二维变量区域变体多保留一层耦合；全球路径不截断。
fn compute_cutoff(p_ref: &[f64], ps_ref: f64, domain: DomainKind) -> usize {
    let nlev = p_ref.len();
    let first_below = p_ref
        .iter()
        .position(|&p| p < CUTOFF_PRESSURE_RATIO * ps_ref)
        .unwrap_or(nlev);
    match domain {
        DomainKind::Regional => first_below,
        DomainKind::RegionalTwoD => (first_below + 1).min(nlev),
        DomainKind::Global => nlev,
    }
}

fn zero_couplings(state: &mut BalanceState) {
    state.t_on_sf.fill(0.0);
    state.t_on_sf_ref.fill(0.0);
    state.vp_on_sf.fill(0.0);
    state.ps_on_sf.fill(0.0);
    state.ps_on_t.fill(0.0);
    if let Some(ext) = &mut state.extended {
        ext.three_level.fill(0.0);
        ext.two_level.fill(0.0);
    }
}
