// crates/av_stats/src/canonical.rs

//! 扩展回归变量对的规范索引表
//!
//! 扩展链覆盖 11 个三维变量加地面气压。命名系数矩阵分两类：
//! - **三层系数**: 变量对 (a, b) 的层×层耦合矩阵，共 C(11,2) = 55 个
//! - **二层系数**: 变量与地面气压的层×地面耦合向量，共 11 个
//!
//! 每个名字（`"vor_div"`、`"qr_ps"` 等）解析为一个固定的规范索引，
//! 用于平铺数组寻址。表在首次使用时构建一次，替代逐名字符串比较。
//!
//! 清单中出现表外名字不是错误：对应系数槽位默认置零并发出诊断，
//! 分析继续（是安全网还是潜在缺陷待定，行为保持原样）。

use std::collections::HashMap;
use std::sync::OnceLock;

/// 链变量数
pub const N_CHAIN_VARS: usize = 11;

/// 三层系数总数（变量对数）
pub const N_THREE_LEVEL: usize = 55;

/// 二层系数总数（变量-地面气压）
pub const N_TWO_LEVEL: usize = 11;

/// 链变量名，按固定全序排列
///
/// 顺序即回归链的更新顺序：排前的变量预报因子最多，排后的最少，
/// 地面气压单独作为并行的二层系数组。
pub const CHAIN_VARS: [&str; N_CHAIN_VARS] = [
    "vor", "div", "t", "q", "w", "ql", "qi", "qr", "qs", "qg", "dbz",
];

/// 地面气压在系数名中的后缀
pub const PS_NAME: &str = "ps";

/// 规范系数索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoeffId {
    /// 三层系数（变量对），0..55
    ThreeLevel(usize),
    /// 二层系数（变量-地面气压），0..11
    TwoLevel(usize),
}

/// 变量对 (i, j)（i < j，按链序）的三层系数索引
///
/// 按 (0,1), (0,2), …, (0,10), (1,2), … 的顺序平铺。
#[inline]
pub fn pair_index(i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < N_CHAIN_VARS);
    i * (2 * N_CHAIN_VARS - i - 1) / 2 + (j - i - 1)
}

/// 三层系数索引对应的变量对 (i, j)
pub fn pair_vars(idx: usize) -> (usize, usize) {
    debug_assert!(idx < N_THREE_LEVEL);
    let mut k = idx;
    for i in 0..N_CHAIN_VARS {
        let row = N_CHAIN_VARS - i - 1;
        if k < row {
            return (i, i + 1 + k);
        }
        k -= row;
    }
    unreachable!("pair index out of table")
}

/// 三层系数的规范名，如 `"vor_div"`
pub fn three_level_name(idx: usize) -> String {
    let (i, j) = pair_vars(idx);
    format!("{}_{}", CHAIN_VARS[i], CHAIN_VARS[j])
}

/// 二层系数的规范名，如 `"t_ps"`
pub fn two_level_name(idx: usize) -> String {
    debug_assert!(idx < N_TWO_LEVEL);
    format!("{}_{}", CHAIN_VARS[idx], PS_NAME)
}

fn table() -> &'static HashMap<String, CoeffId> {
    static TABLE: OnceLock<HashMap<String, CoeffId>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::with_capacity(N_THREE_LEVEL + N_TWO_LEVEL);
        for idx in 0..N_THREE_LEVEL {
            map.insert(three_level_name(idx), CoeffId::ThreeLevel(idx));
        }
        for idx in 0..N_TWO_LEVEL {
            map.insert(two_level_name(idx), CoeffId::TwoLevel(idx));
        }
        map
    })
}

/// 名字解析为规范索引；表外名字返回 None
pub fn resolve(name: &str) -> Option<CoeffId> {
    table().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_index_enumeration() {
        let mut seen = vec![false; N_THREE_LEVEL];
        for i in 0..N_CHAIN_VARS {
            for j in (i + 1)..N_CHAIN_VARS {
                let idx = pair_index(i, j);
                assert!(idx < N_THREE_LEVEL);
                assert!(!seen[idx], "索引 {idx} 重复");
                seen[idx] = true;
                assert_eq!(pair_vars(idx), (i, j));
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_names() {
        assert_eq!(three_level_name(0), "vor_div");
        assert_eq!(three_level_name(N_THREE_LEVEL - 1), "qg_dbz");
        assert_eq!(two_level_name(0), "vor_ps");
        assert_eq!(two_level_name(10), "dbz_ps");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("vor_div"), Some(CoeffId::ThreeLevel(0)));
        assert_eq!(resolve("t_ps"), Some(CoeffId::TwoLevel(2)));
        assert_eq!(resolve("qr_dbz"), Some(CoeffId::ThreeLevel(pair_index(7, 10))));
        assert_eq!(resolve("nosuch"), None);
        assert_eq!(resolve("ps_vor"), None); // 顺序固定，反向名不在表内
    }
}
