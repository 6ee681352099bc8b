// crates/av_balance/src/constraint.rs

//! 强约束钩子
//!
//! 把外部动力倾向模式与订正算子接到平衡变换尾部：正向变换
//! 执行完毕后迭代固定次数，每次先算倾向再做订正；伴随方向在
//! 变换之前执行，逐次迭代内部先伴随订正、后伴随倾向，且每次
//! 迭代把伴随倾向缓冲清零。
//!
//! 两个外部能力以 trait 表达，返回 `Result<(), String>`；任何
//! 失败映射为 [`AvError::ExternalModel`] 并立即终止——半更新的
//! 状态无法安全继续。正反向调用之间两算子必须保持线性，否则
//! 点积恒等式不成立。

use av_foundation::{AvError, AvResult};

use crate::control::ControlState;

// ============================================================
// 倾向缓冲
// ============================================================

/// 动力倾向缓冲：水平风分量与温度为逐层场，地面气压为二维场
#[derive(Debug, Clone)]
pub struct TendencyFields {
    npts: usize,
    nlev: usize,
    /// 纬向风倾向，npts × nlev
    pub u: Vec<f64>,
    /// 经向风倾向，npts × nlev
    pub v: Vec<f64>,
    /// 温度倾向，npts × nlev
    pub t: Vec<f64>,
    /// 地面气压倾向，npts
    pub ps: Vec<f64>,
}

impl TendencyFields {
    /// 全零缓冲
    pub fn zeros(npts: usize, nlev: usize) -> Self {
        Self {
            npts,
            nlev,
            u: vec![0.0; npts * nlev],
            v: vec![0.0; npts * nlev],
            t: vec![0.0; npts * nlev],
            ps: vec![0.0; npts],
        }
    }

    /// 格点数
    #[inline]
    pub fn n_points(&self) -> usize {
        self.npts
    }

    /// 垂直层数
    #[inline]
    pub fn n_levels(&self) -> usize {
        self.nlev
    }

    /// 清零（每次迭代复用同一份缓冲）
    pub fn clear(&mut self) {
        self.u.fill(0.0);
        self.v.fill(0.0);
        self.t.fill(0.0);
        self.ps.fill(0.0);
    }
}

// ============================================================
// 外部能力
// ============================================================

/// 外部动力倾向模式
///
/// 从当前（流函数、速度势、温度、地面气压）计算倾向。伴随方向
/// 把伴随倾向的贡献累加回伴随状态。
pub trait TendencyModel {
    /// 正向：由状态计算倾向，写入 `out`（调用前已清零）
    fn tendencies(&self, state: &ControlState, out: &mut TendencyFields) -> Result<(), String>;

    /// 伴随：把 `tend_adj` 的贡献累加进 `state_adj`
    fn tendencies_adjoint(
        &self,
        tend_adj: &TendencyFields,
        state_adj: &mut ControlState,
    ) -> Result<(), String>;
}

/// 外部订正算子
///
/// 正向把倾向的线性订正就地加到速度势、温度与地面气压上；
/// 流函数只读。伴随方向把伴随状态的贡献累加进伴随倾向缓冲。
pub trait CorrectionOperator {
    /// 正向：`state += L(tend)`
    fn correct(&self, tend: &TendencyFields, state: &mut ControlState) -> Result<(), String>;

    /// 伴随：`tend_adj += L^T(state_adj)`；`state_adj` 原样保留
    fn correct_adjoint(
        &self,
        state_adj: &ControlState,
        tend_adj: &mut TendencyFields,
    ) -> Result<(), String>;
}

// ============================================================
// 钩子
// ============================================================

/// 强约束迭代适配器
///
/// 迭代次数或保留垂直模态数非正时为空操作；调用方据此决定
/// 是否构造钩子（见 [`BalanceOptions::constraint_active`]）。
///
/// [`BalanceOptions::constraint_active`]: crate::options::BalanceOptions::constraint_active
pub struct StrongConstraintHook<'a> {
    model: &'a dyn TendencyModel,
    corrector: &'a dyn CorrectionOperator,
    iterations: usize,
    /// 建钩子时一次性分配，迭代间清零复用，热路径不再分配
    tend: TendencyFields,
}

impl<'a> StrongConstraintHook<'a> {
    /// 组装钩子，倾向缓冲按子域尺寸预分配
    pub fn new(
        model: &'a dyn TendencyModel,
        corrector: &'a dyn CorrectionOperator,
        iterations: usize,
        npts: usize,
        nlev: usize,
    ) -> Self {
        Self {
            model,
            corrector,
            iterations,
            tend: TendencyFields::zeros(npts, nlev),
        }
    }

    /// 正向迭代：每次先倾向后订正
    pub fn apply_forward(&mut self, state: &mut ControlState) -> AvResult<()> {
        AvError::check_size("hook/npts", self.tend.npts, state.n_points())?;
        AvError::check_size("hook/nlev", self.tend.nlev, state.n_levels())?;
        for _ in 0..self.iterations {
            self.tend.clear();
            self.model
                .tendencies(state, &mut self.tend)
                .map_err(|m| AvError::external_model("tendency", m))?;
            self.corrector
                .correct(&self.tend, state)
                .map_err(|m| AvError::external_model("correction", m))?;
        }
        Ok(())
    }

    /// 伴随迭代：每次先伴随订正后伴随倾向，伴随倾向缓冲逐次清零
    pub fn apply_adjoint(&mut self, state_adj: &mut ControlState) -> AvResult<()> {
        AvError::check_size("hook/npts", self.tend.npts, state_adj.n_points())?;
        AvError::check_size("hook/nlev", self.tend.nlev, state_adj.n_levels())?;
        for _ in 0..self.iterations {
            self.tend.clear();
            self.corrector
                .correct_adjoint(state_adj, &mut self.tend)
                .map_err(|m| AvError::external_model("correction_adjoint", m))?;
            self.model
                .tendencies_adjoint(&self.tend, state_adj)
                .map_err(|m| AvError::external_model("tendency_adjoint", m))?;
        }
        Ok(())
    }
}

// ============================================================
// 线性桩实现
// ============================================================

/// 线性倾向桩：自检与测试用的严格转置对（正向/伴随互为转置）
#[derive(Debug, Clone)]
pub struct LinearTendencyStub {
    /// 流函数对纬向风倾向的系数
    pub sf_to_u: f64,
    /// 速度势对经向风倾向的系数
    pub vp_to_v: f64,
    /// 温度对温度倾向的系数
    pub t_to_t: f64,
    /// 地面气压对地面气压倾向的系数
    pub ps_to_ps: f64,
}

impl Default for LinearTendencyStub {
    fn default() -> Self {
        Self {
            sf_to_u: 0.3,
            vp_to_v: -0.2,
            t_to_t: 0.15,
            ps_to_ps: 0.1,
        }
    }
}

impl TendencyModel for LinearTendencyStub {
    fn tendencies(&self, state: &ControlState, out: &mut TendencyFields) -> Result<(), String> {
        for i in 0..state.sf.len() {
            out.u[i] = self.sf_to_u * state.sf[i];
            out.v[i] = self.vp_to_v * state.vp[i];
            out.t[i] = self.t_to_t * state.t[i];
        }
        for p in 0..state.n_points() {
            out.ps[p] = self.ps_to_ps * state.ps[p];
        }
        Ok(())
    }

    fn tendencies_adjoint(
        &self,
        tend_adj: &TendencyFields,
        state_adj: &mut ControlState,
    ) -> Result<(), String> {
        for i in 0..state_adj.sf.len() {
            state_adj.sf[i] += self.sf_to_u * tend_adj.u[i];
            state_adj.vp[i] += self.vp_to_v * tend_adj.v[i];
            state_adj.t[i] += self.t_to_t * tend_adj.t[i];
        }
        for p in 0..tend_adj.n_points() {
            state_adj.ps[p] += self.ps_to_ps * tend_adj.ps[p];
        }
        Ok(())
    }
}

/// 线性订正桩：倾向到状态的就地线性订正及其转置
#[derive(Debug, Clone)]
pub struct LinearCorrectionStub {
    /// 纬向风倾向对速度势的订正系数
    pub u_to_vp: f64,
    /// 经向风倾向对温度的订正系数
    pub v_to_t: f64,
    /// 温度倾向对温度的订正系数
    pub t_to_t: f64,
    /// 地面气压倾向对地面气压的订正系数
    pub ps_to_ps: f64,
}

impl Default for LinearCorrectionStub {
    fn default() -> Self {
        Self {
            u_to_vp: 0.4,
            v_to_t: 0.25,
            t_to_t: -0.3,
            ps_to_ps: 0.2,
        }
    }
}

impl CorrectionOperator for LinearCorrectionStub {
    fn correct(&self, tend: &TendencyFields, state: &mut ControlState) -> Result<(), String> {
        for i in 0..state.vp.len() {
            state.vp[i] += self.u_to_vp * tend.u[i];
            state.t[i] += self.v_to_t * tend.v[i] + self.t_to_t * tend.t[i];
        }
        for p in 0..state.n_points() {
            state.ps[p] += self.ps_to_ps * tend.ps[p];
        }
        Ok(())
    }

    fn correct_adjoint(
        &self,
        state_adj: &ControlState,
        tend_adj: &mut TendencyFields,
    ) -> Result<(), String> {
        for i in 0..state_adj.vp.len() {
            tend_adj.u[i] += self.u_to_vp * state_adj.vp[i];
            tend_adj.v[i] += self.v_to_t * state_adj.t[i];
            tend_adj.t[i] += self.t_to_t * state_adj.t[i];
        }
        for p in 0..state_adj.n_points() {
            tend_adj.ps[p] += self.ps_to_ps * state_adj.ps[p];
        }
        Ok(())
    }
}
