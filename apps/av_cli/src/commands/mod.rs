// apps/av_cli/src/commands/mod.rs

//! 子命令实现

pub mod gen;
pub mod info;
pub mod selfcheck;
