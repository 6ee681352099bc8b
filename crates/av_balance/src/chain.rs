// crates/av_balance/src/chain.rs

//! 扩展回归链
//!
//! 十一个物理量加地面气压上的严格全序多变量回归。正向从谓词
//! 最多的变量（序首）推进到没有谓词的变量：每个变量只读取序上
//! 靠后、尚未被更新的变量与地面气压，权重取对应规范三层或二层
//! 系数；地面气压本身不被链更新。伴随同时反转遍历方向与每项
//! 累加方向。
//!
//! 链沿变量序有严格先后依赖，不得沿该轴并行；单个变量更新内部
//! 的格点循环并行。借用冲突用 `take_chain_var`/`put_chain_var`
//! 拆解：目标字段暂时移出控制状态，其余字段保持只读。

use av_foundation::{AvError, AvResult};
use av_stats::canonical::{pair_index, N_CHAIN_VARS};
use rayon::prelude::*;

use crate::control::ControlState;
use crate::state::{BalanceState, ExtendedCoeffs};

/// 扩展回归链
pub struct ExtendedRegressionChain<'a> {
    state: &'a BalanceState,
}

impl<'a> ExtendedRegressionChain<'a> {
    /// 创建链
    pub fn new(state: &'a BalanceState) -> Self {
        Self { state }
    }

    fn coeffs(&self) -> AvResult<&'a ExtendedCoeffs> {
        self.state
            .extended
            .as_ref()
            .ok_or_else(|| AvError::internal("扩展链缺少系数表"))
    }

    /// 正向：按变量序 0..N 逐个更新，每个加項读取未被触碰的值
    pub fn forward(&self, control: &mut ControlState) -> AvResult<()> {
        let ext = self.coeffs()?;
        let nlev = self.state.nlev;

        for i in 0..N_CHAIN_VARS {
            let mut target = control.take_chain_var(i);
            {
                let ctrl = &*control;
                target
                    .par_chunks_mut(nlev)
                    .enumerate()
                    .for_each(|(p, x_p)| {
                        for j in (i + 1)..N_CHAIN_VARS {
                            let block = ext.three_level_block(pair_index(i, j), p);
                            let y_p = &ctrl.chain_var(j)[p * nlev..(p + 1) * nlev];
                            for k in 0..nlev {
                                let row = &block[k * nlev..(k + 1) * nlev];
                                for l in 0..nlev {
                                    x_p[k] += row[l] * y_p[l];
                                }
                            }
                        }
                        let two = ext.two_level_block(i, p);
                        let ps_p = ctrl.ps[p];
                        for k in 0..nlev {
                            x_p[k] += two[k] * ps_p;
                        }
                    });
            }
            control.put_chain_var(i, target);
        }
        Ok(())
    }

    /// 伴随：变量序 N..0 逆行，每个正向加項转置回谓词变量与气压
    pub fn adjoint(&self, control: &mut ControlState) -> AvResult<()> {
        let ext = self.coeffs()?;
        let nlev = self.state.nlev;

        for i in (0..N_CHAIN_VARS).rev() {
            let source = control.take_chain_var(i);

            for j in (i + 1)..N_CHAIN_VARS {
                let mut target = control.take_chain_var(j);
                target
                    .par_chunks_mut(nlev)
                    .enumerate()
                    .for_each(|(p, y_p)| {
                        let block = ext.three_level_block(pair_index(i, j), p);
                        let x_p = &source[p * nlev..(p + 1) * nlev];
                        for k in 0..nlev {
                            let row = &block[k * nlev..(k + 1) * nlev];
                            for l in 0..nlev {
                                y_p[l] += row[l] * x_p[k];
                            }
                        }
                    });
                control.put_chain_var(j, target);
            }

            control
                .ps
                .par_iter_mut()
                .enumerate()
                .for_each(|(p, ps_p)| {
                    let two = ext.two_level_block(i, p);
                    let x_p = &source[p * nlev..(p + 1) * nlev];
                    for k in 0..nlev {
                        *ps_p += two[k] * x_p[k];
                    }
                });

            control.put_chain_var(i, source);
        }
        Ok(())
    }
}
