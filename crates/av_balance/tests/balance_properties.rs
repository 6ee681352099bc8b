// tests/balance_properties.rs

//! 平衡变换性质测试
//!
//! 零不动点、单变量坍缩、驱动场只读、钩子门控与扩展链传播
//! 方向等端到端性质，系数统一走建表器产生。

use av_balance::{
    BalanceOptions, BalanceState, ControlState, DomainKind, ForwardBalanceTransform,
    LinearCorrectionStub, RegressionBuilder, StrongConstraintHook, TendencyFields, TendencyModel,
};
use av_grid::{GlobalGrid, LatitudeInterpolator, TileSpec};
use av_stats::store::BalanceStats;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================
// 测试辅助函数
// ============================================================

fn lcg_fill(buf: &mut [f64], seed: &mut u64) {
    for v in buf.iter_mut() {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        *v = ((*seed >> 33) as f64) / (u32::MAX as f64) - 0.5;
    }
}

fn build_state(options: BalanceOptions) -> BalanceState {
    let stats = BalanceStats::synthetic(4, 6, 0);
    // 北半球子域，避开分离因子模式的赤道参考纬度限制
    let grid = GlobalGrid::uniform(5, 2, 10.0, 58.0).unwrap();
    let interp = LatitudeInterpolator::new(stats.lat_axis.clone()).unwrap();
    let map = interp
        .build_map(&grid, &TileSpec::whole(&grid), options.separate_lat_factor)
        .unwrap();
    RegressionBuilder::new(&stats, &map, options).build().unwrap()
}

/// 记录调用次数的倾向桩，用于验证钩子门控
struct CountingModel {
    calls: AtomicUsize,
}

impl TendencyModel for CountingModel {
    fn tendencies(&self, _state: &ControlState, _out: &mut TendencyFields) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn tendencies_adjoint(
        &self,
        _tend_adj: &TendencyFields,
        _state_adj: &mut ControlState,
    ) -> Result<(), String> {
        Ok(())
    }
}

// ============================================================
// 性质
// ============================================================

#[test]
fn test_zero_state_fixed_point() {
    for domain in [DomainKind::Regional, DomainKind::Global] {
        let state = build_state(BalanceOptions {
            domain,
            ..Default::default()
        });
        let mut control = ControlState::zeros(state.npts, state.nlev, false);
        ForwardBalanceTransform::new(&state).apply(&mut control).unwrap();
        assert!(control.vp.iter().all(|&v| v == 0.0));
        assert!(control.t.iter().all(|&v| v == 0.0));
        assert!(control.ps.iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_univariate_collapse() {
    // 无平衡模式下任意流函数都不得影响其余变量
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        no_balance: true,
        ..Default::default()
    });
    let mut control = ControlState::zeros(state.npts, state.nlev, false);
    let mut seed = 99u64;
    lcg_fill(&mut control.sf, &mut seed);
    lcg_fill(&mut control.vp, &mut seed);
    lcg_fill(&mut control.t, &mut seed);
    lcg_fill(&mut control.ps, &mut seed);
    let before = control.clone();

    ForwardBalanceTransform::new(&state).apply(&mut control).unwrap();
    assert_eq!(control.vp, before.vp);
    assert_eq!(control.t, before.t);
    assert_eq!(control.ps, before.ps);
}

#[test]
fn test_streamfunction_never_modified() {
    for domain in [DomainKind::Regional, DomainKind::Global] {
        let state = build_state(BalanceOptions {
            domain,
            ..Default::default()
        });
        let mut control = ControlState::zeros(state.npts, state.nlev, false);
        let mut seed = 7u64;
        lcg_fill(&mut control.sf, &mut seed);
        let sf = control.sf.clone();
        ForwardBalanceTransform::new(&state).apply(&mut control).unwrap();
        assert_eq!(control.sf, sf);
    }
}

#[test]
fn test_forward_is_additive() {
    // 变换只做累加：对已有增量重复作用等于贡献翻倍
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        ..Default::default()
    });
    let mut forward = ForwardBalanceTransform::new(&state);

    let mut once = ControlState::zeros(state.npts, state.nlev, false);
    let mut seed = 31u64;
    lcg_fill(&mut once.sf, &mut seed);
    let mut twice = once.clone();

    forward.apply(&mut once).unwrap();
    forward.apply(&mut twice).unwrap();
    forward.apply(&mut twice).unwrap();
    for i in 0..once.vp.len() {
        assert!((twice.vp[i] - 2.0 * once.vp[i]).abs() < 1e-12);
        assert!((twice.t[i] - 2.0 * once.t[i]).abs() < 1e-12);
    }
}

#[test]
fn test_hook_gated_by_mode_retention() {
    // 保留模态数为零时钩子必须是空操作，外部模式不被调用
    let model = CountingModel {
        calls: AtomicUsize::new(0),
    };
    let corr = LinearCorrectionStub::default();
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        constraint_iterations: 3,
        retained_vertical_modes: 0,
        ..Default::default()
    });
    let mut forward = ForwardBalanceTransform::new(&state).with_constraint(
        StrongConstraintHook::new(&model, &corr, 3, state.npts, state.nlev),
    );
    let mut control = ControlState::zeros(state.npts, state.nlev, false);
    forward.apply(&mut control).unwrap();
    assert_eq!(model.calls.load(Ordering::Relaxed), 0);

    // 两个门控都为正时按迭代次数调用
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        constraint_iterations: 3,
        retained_vertical_modes: 2,
        ..Default::default()
    });
    let mut forward = ForwardBalanceTransform::new(&state).with_constraint(
        StrongConstraintHook::new(&model, &corr, 3, state.npts, state.nlev),
    );
    let mut control = ControlState::zeros(state.npts, state.nlev, false);
    forward.apply(&mut control).unwrap();
    assert_eq!(model.calls.load(Ordering::Relaxed), 3);
}

#[test]
fn test_separate_factor_scales_temperature() {
    // 分离因子模式：同一流函数廓线下温度增量按逐点形状因子缩放
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        separate_lat_factor: true,
        ..Default::default()
    });
    let mut control = ControlState::zeros(state.npts, state.nlev, false);
    for p in 0..state.npts {
        for k in 0..state.nlev {
            control.sf[p * state.nlev + k] = (k + 1) as f64;
        }
    }
    ForwardBalanceTransform::new(&state).apply(&mut control).unwrap();

    // 非零因子的两点之间温度增量之比等于因子之比
    let (p1, p2) = (0, state.npts - 1);
    let f1 = state.shape_factor[p1];
    let f2 = state.shape_factor[p2];
    assert!(f1 != 0.0 && f2 != 0.0);
    let t1 = control.t[p1 * state.nlev];
    let t2 = control.t[p2 * state.nlev];
    assert!((t1 * f2 - t2 * f1).abs() < 1e-10 * t1.abs().max(t2.abs()).max(1.0));
}
