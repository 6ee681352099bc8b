// apps/av_cli/src/commands/gen.rs

//! 合成统计文件生成命令
//!
//! 生成带平滑闭式系数的合成背景误差统计文件，供自检与
//! 离线测试使用。

use anyhow::{Context, Result};
use av_stats::store::{BalanceStats, MAX_REGIMES};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 生成参数
#[derive(Args)]
pub struct GenArgs {
    /// 输出文件路径
    #[arg(short, long)]
    pub output: PathBuf,

    /// 垂直层数
    #[arg(long, default_value_t = 30)]
    pub nlev: usize,

    /// 纬度带数
    #[arg(long, default_value_t = 48)]
    pub nlat: usize,

    /// 纬度体制数（0 表示不含扩展系数表）
    #[arg(long, default_value_t = 0)]
    pub regimes: usize,
}

/// 执行生成命令
pub fn execute(args: GenArgs) -> Result<()> {
    anyhow::ensure!(args.nlev >= 2, "垂直层数至少为 2");
    anyhow::ensure!(args.nlat >= 2, "纬度带数至少为 2");
    anyhow::ensure!(
        args.regimes <= MAX_REGIMES,
        "纬度体制数不得超过 {MAX_REGIMES}"
    );

    let stats = BalanceStats::synthetic(args.nlev, args.nlat, args.regimes);
    stats
        .save(&args.output)
        .with_context(|| format!("写入统计文件失败: {}", args.output.display()))?;

    info!(
        nlev = args.nlev,
        nlat = args.nlat,
        regimes = args.regimes,
        "已生成合成统计文件: {}",
        args.output.display()
    );
    Ok(())
}
