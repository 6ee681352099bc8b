// crates/av_balance/src/lib.rs

//! 平衡算子核心
//!
//! 变分同化控制变量变换中的平衡关系及其伴随，包括：
//! - 模式开关 (options)
//! - 控制状态 (control)
//! - 插值后系数集 (state)
//! - 系数建表 (builder)
//! - 正向平衡变换 (forward)
//! - 伴随平衡变换 (adjoint)
//! - 扩展回归链 (chain)
//! - 强约束钩子 (constraint)
//!
//! # 调用约定
//!
//! [`RegressionBuilder`] 每个分析周期建表一次；[`BalanceState`]
//! 建成后只读，正/伴随变换在极小化循环中反复调用，绝不改写
//! 系数。流函数是平衡关系的只读驱动。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adjoint;
pub mod builder;
pub mod chain;
pub mod constraint;
pub mod control;
pub mod forward;
pub mod options;
pub mod state;

// 重导出常用类型
pub use adjoint::AdjointBalanceTransform;
pub use builder::RegressionBuilder;
pub use chain::ExtendedRegressionChain;
pub use constraint::{
    CorrectionOperator, LinearCorrectionStub, LinearTendencyStub, StrongConstraintHook,
    TendencyFields, TendencyModel,
};
pub use control::{ControlState, ExtendedFields};
pub use forward::ForwardBalanceTransform;
pub use options::{BalanceOptions, DomainKind};
pub use state::{BalanceState, ExtendedCoeffs};
