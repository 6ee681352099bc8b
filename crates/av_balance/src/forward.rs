// crates/av_balance/src/forward.rs

//! 正向平衡变换
//!
//! 以流函数为只读驱动，把平衡贡献累加进速度势、温度与地面
//! 气压。区域与全球两条互斥分支；之后按需执行扩展回归链与
//! 强约束钩子。逐格点独立，用 rayon 并行；热路径零分配。

use av_foundation::{AvError, AvResult};
use rayon::prelude::*;

use crate::chain::ExtendedRegressionChain;
use crate::constraint::StrongConstraintHook;
use crate::control::ControlState;
use crate::options::DomainKind;
use crate::state::BalanceState;

/// 正向平衡变换
///
/// 持有只读系数引用，可在一次极小化中重复调用。
pub struct ForwardBalanceTransform<'a> {
    state: &'a BalanceState,
    hook: Option<StrongConstraintHook<'a>>,
}

impl<'a> ForwardBalanceTransform<'a> {
    /// 创建变换
    pub fn new(state: &'a BalanceState) -> Self {
        Self { state, hook: None }
    }

    /// 挂接强约束钩子（是否生效由模式开关决定）
    pub fn with_constraint(mut self, hook: StrongConstraintHook<'a>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// 就地累加平衡贡献
    ///
    /// 流函数保证不被修改（强约束订正亦不触碰流函数）。
    ///
    /// # 错误
    ///
    /// 模式开关要求强约束但未挂接钩子时拒绝执行，不得静默跳过
    /// 动力订正。
    pub fn apply(&mut self, control: &mut ControlState) -> AvResult<()> {
        let st = self.state;
        AvError::check_size("control/npts", st.npts, control.n_points())?;
        AvError::check_size("control/nlev", st.nlev, control.n_levels())?;
        if st.options.extended_chain && control.extended.is_none() {
            return Err(AvError::invalid_input(
                "扩展模式要求控制状态携带扩展字段",
            ));
        }

        match st.options.domain {
            DomainKind::Regional | DomainKind::RegionalTwoD => forward_regional(st, control),
            DomainKind::Global => forward_global(st, control),
        }

        if st.options.extended_chain {
            ExtendedRegressionChain::new(st).forward(control)?;
        }

        if st.options.constraint_active() {
            let hook = self
                .hook
                .as_mut()
                .ok_or_else(|| AvError::config("模式开关要求强约束，但未挂接钩子"))?;
            hook.apply_forward(control)?;
        }
        Ok(())
    }
}

/// 区域分支
///
/// 速度势只在截断层以下获得贡献（截断层以上系数建表时已置零，
/// 此处无需再判层）。
fn forward_regional(st: &BalanceState, control: &mut ControlState) {
    let nlev = st.nlev;
    let sf = &control.sf;
    let vp = &mut control.vp;
    let t = &mut control.t;
    let ps = &mut control.ps;

    vp.par_chunks_mut(nlev)
        .zip(t.par_chunks_mut(nlev))
        .zip(ps.par_iter_mut())
        .enumerate()
        .for_each(|(p, ((vp_p, t_p), ps_p))| {
            let sf_p = &sf[p * nlev..(p + 1) * nlev];
            let bvk = st.vp_on_sf_col(p);
            let wgvk = st.ps_on_sf_col(p);

            for k in 0..nlev {
                vp_p[k] += bvk[k] * sf_p[k];
            }

            if st.options.separate_lat_factor {
                let factor = st.shape_factor[p];
                let agvk = &st.t_on_sf_ref;
                for k in 0..nlev {
                    let row = &agvk[k * nlev..(k + 1) * nlev];
                    let mut acc = 0.0;
                    for l in 0..nlev {
                        acc += row[l] * sf_p[l];
                    }
                    t_p[k] += factor * acc;
                }
            } else {
                let agvk = st.t_on_sf_block(p);
                for k in 0..nlev {
                    let row = &agvk[k * nlev..(k + 1) * nlev];
                    for l in 0..nlev {
                        t_p[k] += row[l] * sf_p[l];
                    }
                }
            }

            for k in 0..nlev {
                *ps_p += wgvk[k] * sf_p[k];
            }
        });
}

/// 全球分支
///
/// 地面气压投影先于温度更新执行：温度交叉项必须读取未更新的
/// 温度。旧式非全投影变体把顶层贡献折入首层速度势。
fn forward_global(st: &BalanceState, control: &mut ControlState) {
    let nlev = st.nlev;
    let sf = &control.sf;
    let vp = &mut control.vp;
    let t = &mut control.t;
    let ps = &mut control.ps;

    vp.par_chunks_mut(nlev)
        .zip(t.par_chunks_mut(nlev))
        .zip(ps.par_iter_mut())
        .enumerate()
        .for_each(|(p, ((vp_p, t_p), ps_p))| {
            let sf_p = &sf[p * nlev..(p + 1) * nlev];
            let bvz = st.vp_on_sf_col(p);
            let wgvz = st.ps_on_sf_col(p);

            if st.options.full_surface_projection {
                for k in 0..nlev {
                    *ps_p += wgvz[k] * sf_p[k];
                }
                if st.options.t_to_ps {
                    let pput = st.ps_on_t_col(p);
                    for k in 0..nlev {
                        *ps_p += pput[k] * t_p[k];
                    }
                }
            } else {
                // 旧式变体：顶层折入首层速度势
                for k in 0..nlev - 1 {
                    *ps_p += wgvz[k] * sf_p[k];
                }
                vp_p[0] += wgvz[nlev - 1] * sf_p[nlev - 1];
            }

            for k in 0..nlev {
                vp_p[k] += bvz[k] * sf_p[k];
            }

            let agvz = st.t_on_sf_block(p);
            for k in 0..nlev {
                let row = &agvz[k * nlev..(k + 1) * nlev];
                for l in 0..nlev {
                    t_p[k] += row[l] * sf_p[l];
                }
            }
        });
}
