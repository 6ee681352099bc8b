// crates/av_balance/src/control.rs

//! 控制变量状态
//!
//! 一个子域上的分析增量字段集合，采用 SoA 布局：
//! 每个三维字段是长度 `npts * nlev` 的平铺数组，
//! 点主序（同一格点的垂直列连续），地面气压是长度 `npts` 的二维场。
//!
//! ```text
//! sf: [p0k0, p0k1, …, p0k(nlev-1), p1k0, …]
//! ```
//!
//! 扩展模式另挂 10 个水凝物/动力字段，与温度一起构成
//! 回归链的 11 个链变量（见 [`crate::chain`]）。

use av_stats::canonical::N_CHAIN_VARS;

/// 扩展模式附加字段
///
/// 与基础字段同布局（npts × nlev，点主序）。
#[derive(Debug, Clone, Default)]
pub struct ExtendedFields {
    /// 涡度
    pub vor: Vec<f64>,
    /// 散度
    pub div: Vec<f64>,
    /// 湿度
    pub q: Vec<f64>,
    /// 垂直速度
    pub w: Vec<f64>,
    /// 云水
    pub ql: Vec<f64>,
    /// 云冰
    pub qi: Vec<f64>,
    /// 雨
    pub qr: Vec<f64>,
    /// 雪
    pub qs: Vec<f64>,
    /// 霰
    pub qg: Vec<f64>,
    /// 反射率
    pub dbz: Vec<f64>,
}

impl ExtendedFields {
    fn zeros(n: usize) -> Self {
        Self {
            vor: vec![0.0; n],
            div: vec![0.0; n],
            q: vec![0.0; n],
            w: vec![0.0; n],
            ql: vec![0.0; n],
            qi: vec![0.0; n],
            qr: vec![0.0; n],
            qs: vec![0.0; n],
            qg: vec![0.0; n],
            dbz: vec![0.0; n],
        }
    }
}

/// 子域控制变量状态
#[derive(Debug, Clone)]
pub struct ControlState {
    /// 子域格点数
    npts: usize,
    /// 垂直层数
    nlev: usize,
    /// 流函数（平衡关系的独立驱动变量）
    pub sf: Vec<f64>,
    /// 速度势
    pub vp: Vec<f64>,
    /// 温度
    pub t: Vec<f64>,
    /// 地面气压（二维场）
    pub ps: Vec<f64>,
    /// 扩展模式附加字段
    pub extended: Option<ExtendedFields>,
}

impl ControlState {
    /// 创建全零状态
    pub fn zeros(npts: usize, nlev: usize, extended: bool) -> Self {
        let n = npts * nlev;
        Self {
            npts,
            nlev,
            sf: vec![0.0; n],
            vp: vec![0.0; n],
            t: vec![0.0; n],
            ps: vec![0.0; npts],
            extended: extended.then(|| ExtendedFields::zeros(n)),
        }
    }

    /// 子域格点数
    pub fn n_points(&self) -> usize {
        self.npts
    }

    /// 垂直层数
    pub fn n_levels(&self) -> usize {
        self.nlev
    }

    /// 格点 p、层 k 的平铺索引
    #[inline]
    pub fn idx(&self, p: usize, k: usize) -> usize {
        p * self.nlev + k
    }

    /// 链变量只读访问（按链序：vor div t q w ql qi qr qs qg dbz）
    ///
    /// # Panics
    ///
    /// 扩展字段缺失，或链索引越界
    pub fn chain_var(&self, v: usize) -> &[f64] {
        if v == 2 {
            return &self.t;
        }
        let ext = self.extended.as_ref().expect("扩展字段缺失");
        match v {
            0 => &ext.vor,
            1 => &ext.div,
            3 => &ext.q,
            4 => &ext.w,
            5 => &ext.ql,
            6 => &ext.qi,
            7 => &ext.qr,
            8 => &ext.qs,
            9 => &ext.qg,
            10 => &ext.dbz,
            _ => panic!("链变量索引越界: {v}"),
        }
    }

    /// 取出链变量（留下空数组），配合 [`Self::put_chain_var`] 使用
    ///
    /// 链更新需要同时写目标变量、读其余变量，取出后自借用解耦。
    pub fn take_chain_var(&mut self, v: usize) -> Vec<f64> {
        if v == 2 {
            return std::mem::take(&mut self.t);
        }
        let ext = self.extended.as_mut().expect("扩展字段缺失");
        match v {
            0 => std::mem::take(&mut ext.vor),
            1 => std::mem::take(&mut ext.div),
            3 => std::mem::take(&mut ext.q),
            4 => std::mem::take(&mut ext.w),
            5 => std::mem::take(&mut ext.ql),
            6 => std::mem::take(&mut ext.qi),
            7 => std::mem::take(&mut ext.qr),
            8 => std::mem::take(&mut ext.qs),
            9 => std::mem::take(&mut ext.qg),
            10 => std::mem::take(&mut ext.dbz),
            _ => panic!("链变量索引越界: {v}"),
        }
    }

    /// 放回取出的链变量
    pub fn put_chain_var(&mut self, v: usize, field: Vec<f64>) {
        debug_assert_eq!(field.len(), self.npts * self.nlev);
        if v == 2 {
            self.t = field;
            return;
        }
        let ext = self.extended.as_mut().expect("扩展字段缺失");
        match v {
            0 => ext.vor = field,
            1 => ext.div = field,
            3 => ext.q = field,
            4 => ext.w = field,
            5 => ext.ql = field,
            6 => ext.qi = field,
            7 => ext.qr = field,
            8 => ext.qs = field,
            9 => ext.qg = field,
            10 => ext.dbz = field,
            _ => panic!("链变量索引越界: {v}"),
        }
    }

    /// 全状态内积（伴随校验用）
    ///
    /// 覆盖基础四变量与全部扩展字段。
    pub fn dot(&self, other: &Self) -> f64 {
        debug_assert_eq!(self.npts, other.npts);
        debug_assert_eq!(self.nlev, other.nlev);
        let mut sum = 0.0;
        sum += dot_slice(&self.sf, &other.sf);
        sum += dot_slice(&self.vp, &other.vp);
        sum += dot_slice(&self.t, &other.t);
        sum += dot_slice(&self.ps, &other.ps);
        if self.extended.is_some() && other.extended.is_some() {
            for v in 0..N_CHAIN_VARS {
                if v == 2 {
                    continue; // t 已计入
                }
                sum += dot_slice(self.chain_var(v), other.chain_var(v));
            }
        }
        sum
    }
}

#[inline]
fn dot_slice(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_layout() {
        let state = ControlState::zeros(3, 4, false);
        assert_eq!(state.sf.len(), 12);
        assert_eq!(state.ps.len(), 3);
        assert!(state.extended.is_none());
        assert_eq!(state.idx(2, 1), 9);
    }

    #[test]
    fn test_chain_var_mapping() {
        let mut state = ControlState::zeros(2, 3, true);
        state.t[0] = 7.0;
        assert_eq!(state.chain_var(2)[0], 7.0);
        state.extended.as_mut().unwrap().dbz[5] = 1.5;
        assert_eq!(state.chain_var(10)[5], 1.5);
    }

    #[test]
    fn test_take_put_roundtrip() {
        let mut state = ControlState::zeros(2, 2, true);
        let mut field = state.take_chain_var(7);
        field[3] = 2.5;
        state.put_chain_var(7, field);
        assert_eq!(state.extended.as_ref().unwrap().qr[3], 2.5);
    }

    #[test]
    fn test_dot() {
        let mut a = ControlState::zeros(1, 2, true);
        let mut b = ControlState::zeros(1, 2, true);
        a.sf[0] = 2.0;
        b.sf[0] = 3.0;
        a.ps[0] = 1.0;
        b.ps[0] = 4.0;
        a.extended.as_mut().unwrap().qg[1] = 2.0;
        b.extended.as_mut().unwrap().qg[1] = 0.5;
        assert!((a.dot(&b) - 11.0).abs() < 1e-14);
    }
}
