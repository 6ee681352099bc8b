// crates/av_grid/src/decomposition.rs

//! 水平域分解描述
//!
//! 模型水平网格按块分配给各工作进程，每块（tile）独占一段连续的
//! 纬向×经向子区域。本模块只承载分解的元数据：
//! - [`GlobalGrid`]: 全球网格尺寸与逐点物理纬度
//! - [`TileSpec`]: 子域范围与全球起始偏移
//!
//! 分解本身（由哪个进程算哪块）由外部调度层决定，不在本 crate 范围内。

use av_foundation::{AvError, AvResult};
use serde::{Deserialize, Serialize};

/// 全球网格描述
///
/// 逐点物理纬度按行主序存储（纬向行 × 经向列），
/// 区域模式下纬度场可以是真正的二维场（如 Lambert 投影网格）。
#[derive(Debug, Clone)]
pub struct GlobalGrid {
    /// 纬向格点数
    nlat: usize,
    /// 经向格点数
    nlon: usize,
    /// 逐点物理纬度 [deg]，长度 nlat*nlon，行主序
    lats: Vec<f64>,
}

impl GlobalGrid {
    /// 从逐点纬度场创建全球网格
    ///
    /// # 错误
    ///
    /// - 尺寸为零或纬度数组长度不等于 nlat*nlon
    /// - 纬度含非有限值或超出 [-90, 90]
    pub fn new(nlat: usize, nlon: usize, lats: Vec<f64>) -> AvResult<Self> {
        if nlat == 0 || nlon == 0 {
            return Err(AvError::invalid_input("网格尺寸不能为零"));
        }
        AvError::check_size("lats", nlat * nlon, lats.len())?;
        for &lat in &lats {
            if !lat.is_finite() {
                return Err(AvError::invalid_input("纬度场含非有限值"));
            }
            AvError::check_range("lat", lat, -90.0, 90.0)?;
        }
        Ok(Self { nlat, nlon, lats })
    }

    /// 创建纬向均匀分布的网格（每行纬度相同）
    ///
    /// 便捷构造，用于全球等经纬网格和测试。
    pub fn uniform(nlat: usize, nlon: usize, lat_south: f64, lat_north: f64) -> AvResult<Self> {
        if nlat == 0 || nlon == 0 {
            return Err(AvError::invalid_input("网格尺寸不能为零"));
        }
        let mut lats = Vec::with_capacity(nlat * nlon);
        for i in 0..nlat {
            let frac = if nlat > 1 {
                i as f64 / (nlat - 1) as f64
            } else {
                0.5
            };
            let lat = lat_south + frac * (lat_north - lat_south);
            for _ in 0..nlon {
                lats.push(lat);
            }
        }
        Self::new(nlat, nlon, lats)
    }

    /// 纬向格点数
    pub fn nlat(&self) -> usize {
        self.nlat
    }

    /// 经向格点数
    pub fn nlon(&self) -> usize {
        self.nlon
    }

    /// 全球格点总数
    pub fn n_points(&self) -> usize {
        self.nlat * self.nlon
    }

    /// 全球格点 (i, j) 的物理纬度 [deg]
    #[inline]
    pub fn lat(&self, i: usize, j: usize) -> f64 {
        self.lats[i * self.nlon + j]
    }

    /// 逐点纬度切片（行主序）
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }
}

/// 子域规格：全球起始偏移 + 子域范围
///
/// 每个工作进程独占一个子域，变换在子域内完全局部。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSpec {
    /// 纬向起始偏移（全球行索引）
    pub lat_offset: usize,
    /// 经向起始偏移（全球列索引）
    pub lon_offset: usize,
    /// 子域纬向格点数
    pub nlat: usize,
    /// 子域经向格点数
    pub nlon: usize,
}

impl TileSpec {
    /// 覆盖整个全球网格的子域（单进程运行）
    pub fn whole(grid: &GlobalGrid) -> Self {
        Self {
            lat_offset: 0,
            lon_offset: 0,
            nlat: grid.nlat(),
            nlon: grid.nlon(),
        }
    }

    /// 子域格点数
    pub fn n_points(&self) -> usize {
        self.nlat * self.nlon
    }

    /// 校验子域落在全球网格内
    pub fn validate(&self, grid: &GlobalGrid) -> AvResult<()> {
        if self.nlat == 0 || self.nlon == 0 {
            return Err(AvError::invalid_input("子域尺寸不能为零"));
        }
        if self.lat_offset + self.nlat > grid.nlat() {
            return Err(AvError::index_out_of_bounds(
                "tile lat",
                self.lat_offset + self.nlat,
                grid.nlat() + 1,
            ));
        }
        if self.lon_offset + self.nlon > grid.nlon() {
            return Err(AvError::index_out_of_bounds(
                "tile lon",
                self.lon_offset + self.nlon,
                grid.nlon() + 1,
            ));
        }
        Ok(())
    }

    /// 子域格点 (i, j) 对应的全球格点
    #[inline]
    pub fn global_index(&self, i: usize, j: usize) -> (usize, usize) {
        (self.lat_offset + i, self.lon_offset + j)
    }

    /// 子域格点 (i, j) 的物理纬度 [deg]
    #[inline]
    pub fn lat(&self, grid: &GlobalGrid, i: usize, j: usize) -> f64 {
        let (gi, gj) = self.global_index(i, j);
        grid.lat(gi, gj)
    }
}
