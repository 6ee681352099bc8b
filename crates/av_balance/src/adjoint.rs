// crates/av_balance/src/adjoint.rs

//! 伴随平衡变换
//!
//! 正向变换的严格转置：先执行强约束钩子的伴随与扩展链的伴随
//! （正向组合的逆序），再逐格点把伴随贡献累加回流函数——全球
//! 全投影带温度交叉项时还部分累加回温度。每个正向累加
//! `X[i] += C[i,j]·Y[j]` 转置为 `Y[j] += C[i,j]·X[i]`。
//!
//! 点内转置顺序固定为温度、速度势、地面气压：正向的气压投影
//! 读取的是未更新温度，其转置必须在温度转置消费完伴随温度之后
//! 才向伴随温度累加。

use av_foundation::{AvError, AvResult};
use rayon::prelude::*;

use crate::chain::ExtendedRegressionChain;
use crate::constraint::StrongConstraintHook;
use crate::control::ControlState;
use crate::options::DomainKind;
use crate::state::BalanceState;

/// 伴随平衡变换
pub struct AdjointBalanceTransform<'a> {
    state: &'a BalanceState,
    hook: Option<StrongConstraintHook<'a>>,
}

impl<'a> AdjointBalanceTransform<'a> {
    /// 创建变换
    pub fn new(state: &'a BalanceState) -> Self {
        Self { state, hook: None }
    }

    /// 挂接强约束钩子（与正向侧使用同一对外部算子）
    pub fn with_constraint(mut self, hook: StrongConstraintHook<'a>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// 就地累加伴随贡献
    ///
    /// # 错误
    ///
    /// 模式开关要求强约束但未挂接钩子时拒绝执行。
    pub fn apply(&mut self, control: &mut ControlState) -> AvResult<()> {
        let st = self.state;
        AvError::check_size("control/npts", st.npts, control.n_points())?;
        AvError::check_size("control/nlev", st.nlev, control.n_levels())?;
        if st.options.extended_chain && control.extended.is_none() {
            return Err(AvError::invalid_input(
                "扩展模式要求控制状态携带扩展字段",
            ));
        }

        // 正向组合的逆序：钩子、扩展链、基础分支
        if st.options.constraint_active() {
            let hook = self
                .hook
                .as_mut()
                .ok_or_else(|| AvError::config("模式开关要求强约束，但未挂接钩子"))?;
            hook.apply_adjoint(control)?;
        }

        if st.options.extended_chain {
            ExtendedRegressionChain::new(st).adjoint(control)?;
        }

        match st.options.domain {
            DomainKind::Regional | DomainKind::RegionalTwoD => adjoint_regional(st, control),
            DomainKind::Global => adjoint_global(st, control),
        }
        Ok(())
    }
}

/// 区域分支的转置
fn adjoint_regional(st: &BalanceState, control: &mut ControlState) {
    let nlev = st.nlev;
    let sf = &mut control.sf;
    let vp = &control.vp;
    let t = &control.t;
    let ps = &control.ps;

    sf.par_chunks_mut(nlev).enumerate().for_each(|(p, sf_p)| {
        let vp_p = &vp[p * nlev..(p + 1) * nlev];
        let t_p = &t[p * nlev..(p + 1) * nlev];
        let ps_p = ps[p];
        let bvk = st.vp_on_sf_col(p);
        let wgvk = st.ps_on_sf_col(p);

        if st.options.separate_lat_factor {
            let factor = st.shape_factor[p];
            let agvk = &st.t_on_sf_ref;
            for k in 0..nlev {
                let row = &agvk[k * nlev..(k + 1) * nlev];
                let w = factor * t_p[k];
                for l in 0..nlev {
                    sf_p[l] += row[l] * w;
                }
            }
        } else {
            let agvk = st.t_on_sf_block(p);
            for k in 0..nlev {
                let row = &agvk[k * nlev..(k + 1) * nlev];
                for l in 0..nlev {
                    sf_p[l] += row[l] * t_p[k];
                }
            }
        }

        for k in 0..nlev {
            sf_p[k] += bvk[k] * vp_p[k];
        }

        for k in 0..nlev {
            sf_p[k] += wgvk[k] * ps_p;
        }
    });
}

/// 全球分支的转置
///
/// 温度交叉项的转置向伴随温度累加，因此温度-流函数转置必须
/// 先行；旧式变体对称地把首层速度势伴随回流到顶层流函数。
fn adjoint_global(st: &BalanceState, control: &mut ControlState) {
    let nlev = st.nlev;
    let sf = &mut control.sf;
    let t = &mut control.t;
    let vp = &control.vp;
    let ps = &control.ps;

    sf.par_chunks_mut(nlev)
        .zip(t.par_chunks_mut(nlev))
        .enumerate()
        .for_each(|(p, (sf_p, t_p))| {
            let vp_p = &vp[p * nlev..(p + 1) * nlev];
            let ps_p = ps[p];
            let bvz = st.vp_on_sf_col(p);
            let wgvz = st.ps_on_sf_col(p);

            let agvz = st.t_on_sf_block(p);
            for k in 0..nlev {
                let row = &agvz[k * nlev..(k + 1) * nlev];
                for l in 0..nlev {
                    sf_p[l] += row[l] * t_p[k];
                }
            }

            for k in 0..nlev {
                sf_p[k] += bvz[k] * vp_p[k];
            }

            if st.options.full_surface_projection {
                for k in 0..nlev {
                    sf_p[k] += wgvz[k] * ps_p;
                }
                if st.options.t_to_ps {
                    let pput = st.ps_on_t_col(p);
                    for k in 0..nlev {
                        t_p[k] += pput[k] * ps_p;
                    }
                }
            } else {
                for k in 0..nlev - 1 {
                    sf_p[k] += wgvz[k] * ps_p;
                }
                sf_p[nlev - 1] += wgvz[nlev - 1] * vp_p[0];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardBalanceTransform;
    use crate::options::BalanceOptions;

    fn lcg_fill(buf: &mut [f64], seed: &mut u64) {
        for v in buf.iter_mut() {
            *seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1);
            *v = ((*seed >> 33) as f64) / (u32::MAX as f64) - 0.5;
        }
    }

    fn random_state(npts: usize, nlev: usize, seed: u64) -> ControlState {
        let mut s = ControlState::zeros(npts, nlev, false);
        let mut seed = seed;
        lcg_fill(&mut s.sf, &mut seed);
        lcg_fill(&mut s.vp, &mut seed);
        lcg_fill(&mut s.t, &mut seed);
        lcg_fill(&mut s.ps, &mut seed);
        s
    }

    fn coeffs(npts: usize, nlev: usize, options: BalanceOptions, seed: u64) -> BalanceState {
        let mut seed = seed;
        let mut state = BalanceState {
            npts,
            nlev,
            options,
            cutoff: nlev,
            lat_bounds: (1, 2),
            t_on_sf: vec![0.0; npts * nlev * nlev],
            t_on_sf_ref: Vec::new(),
            shape_factor: Vec::new(),
            vp_on_sf: vec![0.0; npts * nlev],
            ps_on_sf: vec![0.0; npts * nlev],
            ps_on_t: Vec::new(),
            extended: None,
        };
        lcg_fill(&mut state.t_on_sf, &mut seed);
        lcg_fill(&mut state.vp_on_sf, &mut seed);
        lcg_fill(&mut state.ps_on_sf, &mut seed);
        if state.options.t_to_ps {
            state.ps_on_t = vec![0.0; npts * nlev];
            lcg_fill(&mut state.ps_on_t, &mut seed);
        }
        state
    }

    fn check_identity(state: &BalanceState, seed: u64) {
        let a0 = random_state(state.npts, state.nlev, seed);
        let b0 = random_state(state.npts, state.nlev, seed ^ 0x5a5a);

        let mut fa = a0.clone();
        ForwardBalanceTransform::new(state).apply(&mut fa).unwrap();
        let mut ab = b0.clone();
        AdjointBalanceTransform::new(state).apply(&mut ab).unwrap();

        let lhs = fa.dot(&b0);
        let rhs = a0.dot(&ab);
        let scale = lhs.abs().max(rhs.abs()).max(1e-30);
        assert!(
            ((lhs - rhs) / scale).abs() < 1e-12,
            "{lhs} vs {rhs}"
        );
    }

    #[test]
    fn test_adjoint_identity_regional() {
        let state = coeffs(
            4,
            3,
            BalanceOptions {
                domain: DomainKind::Regional,
                ..Default::default()
            },
            101,
        );
        check_identity(&state, 7);
    }

    #[test]
    fn test_adjoint_identity_global_full_projection() {
        let state = coeffs(
            4,
            3,
            BalanceOptions {
                domain: DomainKind::Global,
                t_to_ps: true,
                ..Default::default()
            },
            211,
        );
        check_identity(&state, 17);
    }

    #[test]
    fn test_adjoint_identity_global_legacy() {
        let state = coeffs(
            4,
            3,
            BalanceOptions {
                domain: DomainKind::Global,
                full_surface_projection: false,
                ..Default::default()
            },
            307,
        );
        check_identity(&state, 23);
    }
}
