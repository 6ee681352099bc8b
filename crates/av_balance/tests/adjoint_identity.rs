// tests/adjoint_identity.rs

//! 伴随恒等式验证测试
//!
//! 对随机控制状态 a、b 与固定模式开关验证
//! `dot(Forward(a), b) == dot(a, Adjoint(b))`（相对容差内），
//! 覆盖区域/全球分支、分离因子、全投影/旧式投影、扩展回归链
//! 与强约束钩子（线性桩）全部组合。系数一律走建表器端到端
//! 产生，而非手工构造。

use std::path::PathBuf;

use av_balance::{
    AdjointBalanceTransform, BalanceOptions, BalanceState, ControlState, DomainKind,
    ForwardBalanceTransform, LinearCorrectionStub, LinearTendencyStub, RegressionBuilder,
    StrongConstraintHook,
};
use av_grid::{GlobalGrid, LatitudeInterpolator, TileSpec};
use av_stats::canonical::N_CHAIN_VARS;
use av_stats::manifest::ExtendedManifest;
use av_stats::store::BalanceStats;

const NLEV: usize = 4;
const NLAT: usize = 6;
const REL_TOL: f64 = 1e-10;

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

fn random_control(npts: usize, nlev: usize, extended: bool, seed: u64) -> ControlState {
    let mut s = ControlState::zeros(npts, nlev, extended);
    let mut seed = seed;
    lcg_fill(&mut s.sf, &mut seed);
    lcg_fill(&mut s.vp, &mut seed);
    lcg_fill(&mut s.t, &mut seed);
    lcg_fill(&mut s.ps, &mut seed);
    if extended {
        for v in 0..N_CHAIN_VARS {
            if v == 2 {
                continue;
            }
            let mut field = s.take_chain_var(v);
            lcg_fill(&mut field, &mut seed);
            s.put_chain_var(v, field);
        }
    }
    s
}

/// 全清单：55 个三层对加 11 个二层对全部启用
fn full_manifest() -> ExtendedManifest {
    let mut text = String::from("66\n");
    for c in 0..55 {
        text.push_str(&format!("{} 3\n", av_stats::canonical::three_level_name(c)));
    }
    for c in 0..11 {
        text.push_str(&format!("{} 2\n", av_stats::canonical::two_level_name(c)));
    }
    ExtendedManifest::parse(&text, &PathBuf::from("full.txt")).unwrap()
}

fn build_state(options: BalanceOptions) -> BalanceState {
    let n_regimes = if options.extended_chain { 2 } else { 0 };
    let stats = BalanceStats::synthetic(NLEV, NLAT, n_regimes);
    // 北半球子域，避开分离因子模式的赤道参考纬度限制
    let grid = GlobalGrid::uniform(5, 2, 10.0, 58.0).unwrap();
    let interp = LatitudeInterpolator::new(stats.lat_axis.clone()).unwrap();
    let map = interp
        .build_map(&grid, &TileSpec::whole(&grid), options.separate_lat_factor)
        .unwrap();

    if options.extended_chain {
        let manifest = full_manifest();
        let regimes: Vec<u8> = (0..map.n_points()).map(|p| (p % 2) as u8).collect();
        RegressionBuilder::new(&stats, &map, options)
            .with_manifest(&manifest)
            .with_regimes(&regimes)
            .build()
            .unwrap()
    } else {
        RegressionBuilder::new(&stats, &map, options).build().unwrap()
    }
}

fn assert_identity(state: &BalanceState, with_hook: bool, seed: u64) {
    let extended = state.options.extended_chain;
    let a0 = random_control(state.npts, state.nlev, extended, seed);
    let b0 = random_control(state.npts, state.nlev, extended, seed ^ 0xdead_beef);

    let model = LinearTendencyStub::default();
    let corr = LinearCorrectionStub::default();

    let mut forward = ForwardBalanceTransform::new(state);
    let mut adjoint = AdjointBalanceTransform::new(state);
    if with_hook {
        forward = forward.with_constraint(StrongConstraintHook::new(
            &model,
            &corr,
            state.options.constraint_iterations,
            state.npts,
            state.nlev,
        ));
        adjoint = adjoint.with_constraint(StrongConstraintHook::new(
            &model,
            &corr,
            state.options.constraint_iterations,
            state.npts,
            state.nlev,
        ));
    }

    let mut fa = a0.clone();
    forward.apply(&mut fa).unwrap();
    let mut ab = b0.clone();
    adjoint.apply(&mut ab).unwrap();

    let lhs = fa.dot(&b0);
    let rhs = a0.dot(&ab);
    let scale = lhs.abs().max(rhs.abs()).max(1e-30);
    assert!(
        ((lhs - rhs) / scale).abs() < REL_TOL,
        "恒等式破坏: {lhs} vs {rhs}"
    );
}

// ============================================================
// 分支组合
// ============================================================

#[test]
fn test_identity_regional() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        ..Default::default()
    });
    assert_identity(&state, false, 1);
}

#[test]
fn test_identity_regional_two_d() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::RegionalTwoD,
        ..Default::default()
    });
    assert_identity(&state, false, 2);
}

#[test]
fn test_identity_regional_separate_factor() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        separate_lat_factor: true,
        ..Default::default()
    });
    assert_identity(&state, false, 3);
}

#[test]
fn test_identity_global_full_projection() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Global,
        ..Default::default()
    });
    assert_identity(&state, false, 4);
}

#[test]
fn test_identity_global_with_t_cross_term() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Global,
        t_to_ps: true,
        ..Default::default()
    });
    assert_identity(&state, false, 5);
}

#[test]
fn test_identity_global_legacy_projection() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Global,
        full_surface_projection: false,
        ..Default::default()
    });
    assert_identity(&state, false, 6);
}

#[test]
fn test_identity_extended_chain_regional() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        extended_chain: true,
        ..Default::default()
    });
    assert_identity(&state, false, 7);
}

#[test]
fn test_identity_extended_chain_global() {
    let state = build_state(BalanceOptions {
        domain: DomainKind::Global,
        extended_chain: true,
        ..Default::default()
    });
    assert_identity(&state, false, 8);
}

#[test]
fn test_identity_with_constraint_hook() {
    // 线性桩算子严格成转置对，钩子参与时恒等式仍须成立
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        constraint_iterations: 2,
        retained_vertical_modes: 3,
        ..Default::default()
    });
    assert_identity(&state, true, 9);
}

#[test]
fn test_identity_full_stack() {
    // 扩展链加钩子的最复杂组合
    let state = build_state(BalanceOptions {
        domain: DomainKind::Regional,
        extended_chain: true,
        constraint_iterations: 2,
        retained_vertical_modes: 3,
        ..Default::default()
    });
    assert_identity(&state, true, 10);
}
