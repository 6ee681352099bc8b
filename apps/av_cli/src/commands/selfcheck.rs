// apps/av_cli/src/commands/selfcheck.rs

//! 伴随恒等式自检命令
//!
//! 在合成配置上对随机控制状态验证
//! `dot(Forward(a), b) == dot(a, Adjoint(b))`，
//! 报告相对点积误差。覆盖区域、全球与旧式投影三条路径，
//! 可选扩展回归链与强约束钩子（线性桩）。

use anyhow::{bail, Context, Result};
use av_balance::{
    AdjointBalanceTransform, BalanceOptions, ControlState, DomainKind, ForwardBalanceTransform,
    LinearCorrectionStub, LinearTendencyStub, RegressionBuilder, StrongConstraintHook,
};
use av_grid::{GlobalGrid, LatitudeInterpolator, TileSpec};
use av_stats::canonical::{self, N_CHAIN_VARS};
use av_stats::manifest::ExtendedManifest;
use av_stats::store::BalanceStats;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 自检参数
#[derive(Args)]
pub struct SelfcheckArgs {
    /// 垂直层数
    #[arg(long, default_value_t = 10)]
    pub nlev: usize,

    /// 纬度带数
    #[arg(long, default_value_t = 12)]
    pub nlat: usize,

    /// 子域纬向格点数
    #[arg(long, default_value_t = 8)]
    pub grid_nlat: usize,

    /// 子域经向格点数
    #[arg(long, default_value_t = 4)]
    pub grid_nlon: usize,

    /// 随机种子
    #[arg(long, default_value_t = 20240601)]
    pub seed: u64,

    /// 相对误差阈值
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f64,

    /// 同时检查扩展回归链
    #[arg(long)]
    pub extended: bool,

    /// 同时检查强约束钩子（线性桩）
    #[arg(long)]
    pub constraint: bool,

    /// 模式开关 JSON 配置，作为附加检查用例
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// 执行自检命令
pub fn execute(args: SelfcheckArgs) -> Result<()> {
    info!(
        nlev = args.nlev,
        nlat = args.nlat,
        "伴随恒等式自检开始"
    );

    let mut cases: Vec<(&str, BalanceOptions)> = vec![
        (
            "regional",
            BalanceOptions {
                domain: DomainKind::Regional,
                ..Default::default()
            },
        ),
        (
            "global",
            BalanceOptions {
                domain: DomainKind::Global,
                t_to_ps: true,
                ..Default::default()
            },
        ),
        (
            "global_legacy",
            BalanceOptions {
                domain: DomainKind::Global,
                full_surface_projection: false,
                ..Default::default()
            },
        ),
    ];
    if args.extended {
        cases.push((
            "extended_chain",
            BalanceOptions {
                domain: DomainKind::Regional,
                extended_chain: true,
                ..Default::default()
            },
        ));
    }
    if args.constraint {
        cases.push((
            "constraint_hook",
            BalanceOptions {
                domain: DomainKind::Regional,
                constraint_iterations: 2,
                retained_vertical_modes: 3,
                ..Default::default()
            },
        ));
    }

    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?;
        let options: BalanceOptions =
            serde_json::from_str(&text).with_context(|| format!("解析配置失败: {}", path.display()))?;
        cases.push(("config", options));
    }

    let mut worst: f64 = 0.0;
    for (name, options) in cases {
        let error = check_case(&args, options)?;
        info!("{name}: 相对点积误差 {error:.3e}");
        worst = worst.max(error);
        if error > args.tolerance {
            bail!("{name} 路径伴随恒等式破坏: {error:.3e} > {:.1e}", args.tolerance);
        }
    }

    info!("自检通过，最大相对误差 {worst:.3e}");
    Ok(())
}

fn check_case(args: &SelfcheckArgs, options: BalanceOptions) -> Result<f64> {
    let n_regimes = if options.extended_chain { 2 } else { 0 };
    let stats = BalanceStats::synthetic(args.nlev, args.nlat, n_regimes);
    let grid = GlobalGrid::uniform(args.grid_nlat, args.grid_nlon, 10.0, 58.0)?;
    let interp = LatitudeInterpolator::new(stats.lat_axis.clone())?;
    let map = interp.build_map(&grid, &TileSpec::whole(&grid), options.separate_lat_factor)?;

    let manifest;
    let regimes;
    let mut builder = RegressionBuilder::new(&stats, &map, options.clone());
    if options.extended_chain {
        manifest = full_manifest()?;
        regimes = (0..map.n_points()).map(|p| (p % 2) as u8).collect::<Vec<_>>();
        builder = builder.with_manifest(&manifest).with_regimes(&regimes);
    }
    let state = builder.build()?;

    let model = LinearTendencyStub::default();
    let corr = LinearCorrectionStub::default();
    let mut forward = ForwardBalanceTransform::new(&state);
    let mut adjoint = AdjointBalanceTransform::new(&state);
    if state.options.constraint_active() {
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

    let a0 = random_control(state.npts, state.nlev, state.options.extended_chain, args.seed);
    let b0 = random_control(
        state.npts,
        state.nlev,
        state.options.extended_chain,
        args.seed ^ 0x9e3779b97f4a7c15,
    );

    let mut fa = a0.clone();
    forward.apply(&mut fa)?;
    let mut ab = b0.clone();
    adjoint.apply(&mut ab)?;

    let lhs = fa.dot(&b0);
    let rhs = a0.dot(&ab);
    let scale = lhs.abs().max(rhs.abs()).max(1e-30);
    Ok(((lhs - rhs) / scale).abs())
}

fn full_manifest() -> Result<ExtendedManifest> {
    let mut text = String::from("66\n");
    for c in 0..55 {
        text.push_str(&format!("{} 3\n", canonical::three_level_name(c)));
    }
    for c in 0..11 {
        text.push_str(&format!("{} 2\n", canonical::two_level_name(c)));
    }
    Ok(ExtendedManifest::parse(&text, &PathBuf::from("selfcheck"))?)
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

fn lcg_fill(buf: &mut [f64], seed: &mut u64) {
    for v in buf.iter_mut() {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        *v = ((*seed >> 33) as f64) / (u32::MAX as f64) - 0.5;
    }
}
