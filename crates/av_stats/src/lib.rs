// crates/av_stats/src/lib.rs

//! AtmoVar 统计层
//!
//! 背景误差回归系数的外部存储接口：
//! - [`store`]: 二进制统计文件读写与验证
//! - [`manifest`]: 扩展模式文本清单解析
//! - [`canonical`]: 变量对名字到规范索引的静态表
//!
//! 读取集中在分析周期开始的一次性建表阶段，失败即致命；
//! 热路径不经过本 crate。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod manifest;
pub mod store;

// 重导出常用类型
pub use canonical::{CoeffId, CHAIN_VARS, N_CHAIN_VARS, N_THREE_LEVEL, N_TWO_LEVEL};
pub use manifest::{ExtendedManifest, ManifestEntry};
pub use store::{BalanceStats, ExtendedStats, MAX_REGIMES};
