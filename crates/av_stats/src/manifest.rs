// crates/av_stats/src/manifest.rs

//! 扩展模式清单解析
//!
//! 清单为纯文本：首个非空行是声明的额外回归变量总数，
//! 其后每行 `<name> <rank>`，rank < 3 为二层（变量-地面）系数，
//! rank == 3 为三层（层×层）系数。
//!
//! # 致命错误（ConfigurationError）
//!
//! - 请求扩展模式但清单文件不存在
//! - 声明总数不等于二层与三层条目计数之和
//!
//! # 非致命
//!
//! 名字不在规范表内：条目保留（`id = None`），由建表阶段置零对应
//! 系数槽位并发诊断。

use std::fs;
use std::path::Path;

use av_foundation::{AvError, AvResult};
use tracing::warn;

use crate::canonical::{self, CoeffId};

/// 清单条目
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// 系数名
    pub name: String,
    /// 预报因子秩（< 3 二层，== 3 三层）
    pub rank: u32,
    /// 解析出的规范索引；表外名字为 None
    pub id: Option<CoeffId>,
}

impl ManifestEntry {
    /// 是否三层系数
    pub fn is_three_level(&self) -> bool {
        self.rank == 3
    }
}

/// 扩展模式清单
#[derive(Debug, Clone)]
pub struct ExtendedManifest {
    /// 全部条目，按文件顺序
    pub entries: Vec<ManifestEntry>,
    /// 二层条目计数
    pub n_two_level: usize,
    /// 三层条目计数
    pub n_three_level: usize,
}

impl ExtendedManifest {
    /// 从清单文件加载
    pub fn load(path: &Path) -> AvResult<Self> {
        if !path.exists() {
            return Err(AvError::file_not_found(path));
        }
        let text = fs::read_to_string(path)
            .map_err(|e| AvError::io_with_source(format!("读取清单 {} 失败", path.display()), e))?;
        Self::parse(&text, path)
    }

    /// 从文本解析（路径仅用于错误信息）
    pub fn parse(text: &str, path: &Path) -> AvResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(n, l)| (n + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (first_no, first) = lines
            .next()
            .ok_or_else(|| AvError::parse(path, 1, "清单为空"))?;
        let declared: usize = first
            .parse()
            .map_err(|_| AvError::parse(path, first_no, format!("无效的总数: {first}")))?;

        let mut entries = Vec::with_capacity(declared);
        let mut n_two_level = 0usize;
        let mut n_three_level = 0usize;

        for (line_no, line) in lines {
            let mut parts = line.split_whitespace();
            let name = parts
                .next()
                .ok_or_else(|| AvError::parse(path, line_no, "缺少系数名"))?
                .to_string();
            let rank: u32 = parts
                .next()
                .ok_or_else(|| AvError::parse(path, line_no, "缺少预报因子秩"))?
                .parse()
                .map_err(|_| AvError::parse(path, line_no, "预报因子秩必须是非负整数"))?;
            if parts.next().is_some() {
                return Err(AvError::parse(path, line_no, "每行只允许 <name> <rank> 两列"));
            }
            if rank > 3 {
                return Err(AvError::parse(path, line_no, format!("不支持的秩: {rank}")));
            }

            if rank == 3 {
                n_three_level += 1;
            } else {
                n_two_level += 1;
            }

            let id = canonical::resolve(&name);
            if id.is_none() {
                // 表外名字：槽位将置零，分析继续
                warn!(name = %name, line = line_no, "清单变量名不在规范表内，系数置零");
            } else {
                // 已知名字若秩与规范类别矛盾，说明清单本身写错了，直接报解析错误
                let consistent = matches!(
                    (id, rank == 3),
                    (Some(CoeffId::ThreeLevel(_)), true) | (Some(CoeffId::TwoLevel(_)), false)
                );
                if !consistent {
                    return Err(AvError::parse(
                        path,
                        line_no,
                        format!("名字 {name} 与秩 {rank} 类别不一致"),
                    ));
                }
            }

            entries.push(ManifestEntry { name, rank, id });
        }

        if declared != n_two_level + n_three_level {
            return Err(AvError::config(format!(
                "清单声明 {declared} 个变量，实际计数二层 {n_two_level} + 三层 {n_three_level}",
            )));
        }

        Ok(Self {
            entries,
            n_two_level,
            n_three_level,
        })
    }
}
