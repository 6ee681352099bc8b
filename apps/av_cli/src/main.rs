// apps/av_cli/src/main.rs

//! AtmoVar 命令行界面
//!
//! 平衡算子的辅助工具：生成合成统计文件、查看统计文件内容、
//! 在合成配置上运行伴随恒等式自检。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// AtmoVar 平衡算子命令行工具
#[derive(Parser)]
#[command(name = "av_cli")]
#[command(author = "AtmoVar Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AtmoVar balance operator toolkit", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成合成统计文件
    Gen(commands::gen::GenArgs),
    /// 显示统计文件信息
    Info(commands::info::InfoArgs),
    /// 伴随恒等式自检
    Selfcheck(commands::selfcheck::SelfcheckArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 执行命令
    match cli.command {
        Commands::Gen(args) => commands::gen::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Selfcheck(args) => commands::selfcheck::execute(args),
    }
}
