// crates/av_grid/src/latitude.rs

//! 模型纬度到统计纬度轴的小数索引映射
//!
//! 背景误差统计在粗纬度带上估计，使用前必须插值到模型网格。
//! 本模块完成第一步：把每个模型格点的物理纬度解析为统计纬度轴上的
//! **1 基小数索引**（整数部分定位区间，小数部分是区间内线性位置）。
//!
//! # 约束
//!
//! - 统计纬度轴严格单调递增，长度 M >= 2
//! - 轴下界以下的纬度截断为 1.0，上界及以上截断为 M
//! - 触及索引范围各向外扩一格后截断到 [1, M]，
//!   该范围是系数查表的合法区间；子域内出现范围外索引属于不变量违规
//!
//! # 分离纬度因子模式
//!
//! 温度-流函数投影可以退化为"参考纬度系数 × 形状因子"形式，
//! 形状因子 = sin(lat) / sin(参考纬度)，参考纬度取子域中间行。

use av_foundation::{AvError, AvResult};

use crate::decomposition::{GlobalGrid, TileSpec};

/// 形状因子参考纬度 |sin| 下限
///
/// 参考纬度过于接近赤道时形状因子发散，建表阶段直接拒绝。
const MIN_REF_SIN: f64 = 1e-8;

/// 统计纬度轴上的小数索引解析器
#[derive(Debug, Clone)]
pub struct LatitudeInterpolator {
    /// 统计纬度轴 [deg]，严格单调递增
    axis: Vec<f64>,
}

impl LatitudeInterpolator {
    /// 从统计纬度轴创建解析器
    ///
    /// # 错误
    ///
    /// 轴长度小于 2，或不是严格单调递增
    pub fn new(axis: Vec<f64>) -> AvResult<Self> {
        if axis.len() < 2 {
            return Err(AvError::invalid_input("统计纬度轴至少需要 2 个纬度带"));
        }
        for w in axis.windows(2) {
            if !(w[1] > w[0]) {
                return Err(AvError::invalid_input("统计纬度轴必须严格单调递增"));
            }
        }
        Ok(Self { axis })
    }

    /// 纬度带数 M
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    /// 轴是否为空（构造成功后恒为 false）
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// 统计纬度轴切片
    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    /// 把物理纬度解析为 1 基小数索引
    ///
    /// - `lat >= axis[M-1]` 截断为 `M`
    /// - `lat < axis[0]` 截断为 `1.0`
    /// - 否则定位区间 [m, m+1) 并线性插值小数位置
    pub fn fractional_index(&self, lat: f64) -> f64 {
        let m = self.axis.len();
        if lat >= self.axis[m - 1] {
            return m as f64;
        }
        if lat < self.axis[0] {
            return 1.0;
        }
        // 区间定位：partition_point 返回第一个 > lat 的位置
        let hi = self.axis.partition_point(|&a| a <= lat);
        let lo = hi - 1;
        let frac = (lat - self.axis[lo]) / (self.axis[hi] - self.axis[lo]);
        (lo + 1) as f64 + frac
    }

    /// 构建子域纬度映射
    ///
    /// 对全球每个格点解析小数索引，跟踪触及的整数索引范围并各向外
    /// 扩一格、截断到 [1, M]，随后按分解偏移把映射限制到子域。
    /// `separate_factor` 为真时同时计算形状因子。
    ///
    /// # 错误
    ///
    /// - 子域不在全球网格内
    /// - 分离因子模式下参考纬度的 |sin| 低于下限
    pub fn build_map(
        &self,
        grid: &GlobalGrid,
        tile: &TileSpec,
        separate_factor: bool,
    ) -> AvResult<LatitudeMap> {
        tile.validate(grid)?;

        let m = self.axis.len();

        // 全球扫描：触及索引范围
        let mut touched_min = m;
        let mut touched_max = 1usize;
        for &lat in grid.lats() {
            let idx = self.fractional_index(lat);
            let cell = idx as usize; // floor，idx ∈ [1, M]
            touched_min = touched_min.min(cell);
            touched_max = touched_max.max(cell.min(m));
        }
        let idx_min = touched_min.saturating_sub(1).max(1);
        let idx_max = (touched_max + 1).min(m);

        // 限制到子域
        let npts = tile.n_points();
        let mut index = Vec::with_capacity(npts);
        for i in 0..tile.nlat {
            for j in 0..tile.nlon {
                index.push(self.fractional_index(tile.lat(grid, i, j)));
            }
        }

        // 形状因子：sin(lat) / sin(参考纬度)，参考纬度取子域中间格点
        let (shape_factor, ref_index) = if separate_factor {
            let ref_lat = tile.lat(grid, tile.nlat / 2, tile.nlon / 2);
            let ref_sin = ref_lat.to_radians().sin();
            if ref_sin.abs() < MIN_REF_SIN {
                return Err(AvError::invalid_config(
                    "separate_lat_factor",
                    format!("{ref_lat}"),
                    "参考纬度过于接近赤道，sin(ref) ≈ 0",
                ));
            }
            let mut f = Vec::with_capacity(npts);
            for i in 0..tile.nlat {
                for j in 0..tile.nlon {
                    f.push(tile.lat(grid, i, j).to_radians().sin() / ref_sin);
                }
            }
            (f, Some(self.fractional_index(ref_lat)))
        } else {
            (Vec::new(), None)
        };

        let map = LatitudeMap {
            index,
            shape_factor,
            ref_index,
            idx_min,
            idx_max,
            table_len: m,
        };
        map.check_bounds()?;
        Ok(map)
    }
}

/// 子域纬度映射
///
/// [`LatitudeInterpolator::build_map`] 的产物，建成后只读。
#[derive(Debug, Clone)]
pub struct LatitudeMap {
    /// 逐点 1 基小数索引，长度 = 子域格点数，行主序
    pub index: Vec<f64>,
    /// 逐点形状因子（分离因子模式；否则为空）
    pub shape_factor: Vec<f64>,
    /// 参考纬度的小数索引（分离因子模式）
    pub ref_index: Option<f64>,
    /// 合法查表范围下界（1 基，含）
    pub idx_min: usize,
    /// 合法查表范围上界（1 基，含）
    pub idx_max: usize,
    /// 统计纬度轴长度 M
    pub table_len: usize,
}

impl LatitudeMap {
    /// 子域格点数
    pub fn n_points(&self) -> usize {
        self.index.len()
    }

    /// 格点 p 的插值权重
    ///
    /// 返回 `(i1, i2, w)`：0 基的两个表索引与线性权重，
    /// 插值为 `(1-w)*tab[i1] + w*tab[i2]`。
    #[inline]
    pub fn interp_weights(&self, p: usize) -> (usize, usize, f64) {
        Self::weights_of(self.index[p], self.table_len)
    }

    /// 任意 1 基小数索引的插值权重
    #[inline]
    pub fn weights_of(idx: f64, table_len: usize) -> (usize, usize, f64) {
        let i1 = idx as usize; // 1 基 floor
        let i2 = (i1 + 1).min(table_len);
        let w = idx - i1 as f64;
        (i1 - 1, i2 - 1, w)
    }

    /// 校验所有索引都落在截断后的查表范围内
    ///
    /// 失败说明解析器存在缺陷，运行期不应出现。
    pub fn check_bounds(&self) -> AvResult<()> {
        for p in 0..self.index.len() {
            let idx = self.index[p];
            let cell = idx as usize;
            let upper = (cell + 1).min(self.table_len);
            if cell < self.idx_min || upper > self.idx_max {
                return Err(AvError::out_of_range(
                    "lat_index",
                    idx,
                    self.idx_min as f64,
                    self.idx_max as f64,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> LatitudeInterpolator {
        LatitudeInterpolator::new(vec![-60.0, -30.0, 0.0, 30.0, 60.0]).unwrap()
    }

    #[test]
    fn test_rejects_non_monotone_axis() {
        assert!(LatitudeInterpolator::new(vec![0.0, 0.0, 10.0]).is_err());
        assert!(LatitudeInterpolator::new(vec![10.0, 0.0]).is_err());
        assert!(LatitudeInterpolator::new(vec![10.0]).is_err());
    }

    #[test]
    fn test_boundary_clamping() {
        let interp = axis();
        // 下界以下 -> 1.0
        assert_eq!(interp.fractional_index(-90.0), 1.0);
        // 上界及以上 -> M
        assert_eq!(interp.fractional_index(60.0), 5.0);
        assert_eq!(interp.fractional_index(89.0), 5.0);
    }

    #[test]
    fn test_interval_interpolation() {
        let interp = axis();
        assert_eq!(interp.fractional_index(-60.0), 1.0);
        assert_eq!(interp.fractional_index(-45.0), 1.5);
        assert_eq!(interp.fractional_index(0.0), 3.0);
        assert_eq!(interp.fractional_index(15.0), 3.5);
    }

    #[test]
    fn test_monotonicity() {
        let interp = axis();
        let mut prev = f64::NEG_INFINITY;
        let mut lat = -90.0;
        while lat <= 90.0 {
            let idx = interp.fractional_index(lat);
            assert!(idx >= prev, "idx({lat}) 回退");
            prev = idx;
            lat += 0.25;
        }
    }

    #[test]
    fn test_map_restriction_to_tile() {
        let grid = GlobalGrid::uniform(7, 3, -45.0, 45.0).unwrap();
        let tile = TileSpec {
            lat_offset: 2,
            lon_offset: 1,
            nlat: 3,
            nlon: 2,
        };
        let interp = axis();
        let map = interp.build_map(&grid, &tile, false).unwrap();
        assert_eq!(map.n_points(), 6);
        // 子域第一行的全球纬度 = -15.0
        let expected = interp.fractional_index(-15.0);
        assert_eq!(map.index[0], expected);
        assert_eq!(map.index[1], expected);
    }

    #[test]
    fn test_touched_range_expanded_and_clamped() {
        // 网格纬度只覆盖 [-20, 20]，触及带 2..=3，外扩一格 -> [1, 4]
        let grid = GlobalGrid::uniform(5, 2, -20.0, 20.0).unwrap();
        let tile = TileSpec::whole(&grid);
        let interp = axis();
        let map = interp.build_map(&grid, &tile, false).unwrap();
        assert_eq!(map.idx_min, 1);
        assert_eq!(map.idx_max, 4);

        // 覆盖全轴时截断到 [1, M]
        let wide = GlobalGrid::uniform(5, 2, -90.0, 90.0).unwrap();
        let map = interp.build_map(&wide, &TileSpec::whole(&wide), false).unwrap();
        assert_eq!(map.idx_min, 1);
        assert_eq!(map.idx_max, 5);
    }

    #[test]
    fn test_interp_weights() {
        let grid = GlobalGrid::uniform(3, 1, -45.0, 45.0).unwrap();
        let interp = axis();
        let map = interp
            .build_map(&grid, &TileSpec::whole(&grid), false)
            .unwrap();
        // -45 度 -> idx 1.5 -> 表单元 (0, 1), w = 0.5
        let (i1, i2, w) = map.interp_weights(0);
        assert_eq!((i1, i2), (0, 1));
        assert!((w - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_shape_factor() {
        let grid = GlobalGrid::uniform(3, 1, 30.0, 50.0).unwrap();
        let tile = TileSpec::whole(&grid);
        let interp = axis();
        let map = interp.build_map(&grid, &tile, true).unwrap();
        // 参考纬度 = 中间行 40 度，该点因子应为 1
        assert!((map.shape_factor[1] - 1.0).abs() < 1e-12);
        let expected = 30f64.to_radians().sin() / 40f64.to_radians().sin();
        assert!((map.shape_factor[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_shape_factor_rejects_equatorial_reference() {
        let grid = GlobalGrid::uniform(3, 1, -10.0, 10.0).unwrap();
        let tile = TileSpec::whole(&grid);
        let interp = axis();
        assert!(interp.build_map(&grid, &tile, true).is_err());
    }
}
