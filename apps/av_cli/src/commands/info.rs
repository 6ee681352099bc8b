// apps/av_cli/src/commands/info.rs

//! 统计文件信息显示命令

use anyhow::{Context, Result};
use av_stats::manifest::ExtendedManifest;
use av_stats::store::BalanceStats;
use clap::Args;
use std::path::PathBuf;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 统计文件路径
    #[arg(short, long)]
    pub stats: PathBuf,

    /// 扩展模式清单路径（可选）
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let stats = BalanceStats::load(&args.stats)
        .with_context(|| format!("读取统计文件失败: {}", args.stats.display()))?;

    println!("=== 统计文件信息 ===");
    println!("文件: {}", args.stats.display());
    println!("垂直层数: {}", stats.nlev);
    println!("纬度带数: {}", stats.nlat);
    println!(
        "纬度范围: [{:.2}, {:.2}] deg",
        stats.lat_axis[0],
        stats.lat_axis[stats.nlat - 1]
    );
    println!(
        "参考气压: [{:.1}, {:.1}] hPa，地面 {:.1} hPa",
        stats.p_ref[stats.nlev - 1],
        stats.p_ref[0],
        stats.ps_ref
    );
    match &stats.extended {
        Some(ext) => println!("扩展系数表: {} 个纬度体制", ext.n_regimes),
        None => println!("扩展系数表: 无"),
    }

    if let Some(path) = &args.manifest {
        let manifest = ExtendedManifest::load(path)
            .with_context(|| format!("读取清单失败: {}", path.display()))?;
        println!();
        println!("=== 扩展模式清单 ===");
        println!("文件: {}", path.display());
        println!("三层系数: {}", manifest.n_three_level);
        println!("二层系数: {}", manifest.n_two_level);
        let unmapped = manifest.entries.iter().filter(|e| e.id.is_none()).count();
        if unmapped > 0 {
            println!("表外名字: {unmapped}（系数将保持为零）");
        }
    }
    Ok(())
}
