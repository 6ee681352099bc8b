// crates/av_foundation/src/lib.rs

//! AtmoVar Foundation Layer
//!
//! 基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型与验证辅助方法
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror
//! 2. **分期错误处理**: 可失败操作集中在分析循环开始前，
//!    变换热路径不做逐次调用的错误处理
//!
//! # 示例
//!
//! ```
//! use av_foundation::error::{AvError, AvResult};
//!
//! fn check_levels(nlev: usize) -> AvResult<()> {
//!     AvError::check_range("nlev", nlev as f64, 1.0, 200.0)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

// 重导出常用类型
pub use error::{AvError, AvResult};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{AvError, AvResult};
    pub use crate::{ensure, require};
}
