// crates/av_stats/src/store.rs

//! 背景误差统计文件读写
//!
//! 平衡回归系数在粗纬度带上离线估计，以二进制文件分发。
//! 本模块提供文件格式的读写与验证；一次分析周期只读一次，
//! 失败属于致命错误，在任何变换执行前中止。
//!
//! # 文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "AVBS"
//! [版本: u32]
//! [垂直层数 nlev: u32]
//! [纬度带数 nlat: u32]
//! [纬度体制数 n_regimes: u32]  (0 表示无扩展系数表)
//! [统计纬度轴: nlat * f64]     (严格单调递增, 度)
//! [参考气压廓线 p_ref: nlev * f64]
//! [参考地面气压 ps_ref: f64]
//! [温度-流函数系数:     nlat * nlev * nlev * f64]
//! [速度势-流函数系数:   nlat * nlev * f64]
//! [地面气压-流函数系数: nlat * nlev * f64]
//! [地面气压-温度系数:   nlat * nlev * f64]
//! 对每个体制 (共 n_regimes 个):
//!   [三层系数: 55 * nlat * nlev * nlev * f64]  (规范顺序)
//!   [二层系数: 11 * nlat * nlev * f64]         (规范顺序)
//! ```
//!
//! 全部为小端。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use av_foundation::{AvError, AvResult};

use crate::canonical::{N_THREE_LEVEL, N_TWO_LEVEL};

// ============================================================
// 常量
// ============================================================

/// 统计文件格式版本
const STATS_VERSION: u32 = 1;

/// 统计文件魔数
const STATS_MAGIC: &[u8; 4] = b"AVBS";

/// 体制数上限（陆地/海洋/其他）
pub const MAX_REGIMES: usize = 3;

// ============================================================
// 数据结构
// ============================================================

/// 粗网格平衡回归系数集
///
/// 所有矩阵按纬度带主序平铺：`[band][level…]`。
/// 层索引自下而上（0 = 最底层）。
#[derive(Debug, Clone)]
pub struct BalanceStats {
    /// 垂直层数
    pub nlev: usize,
    /// 纬度带数
    pub nlat: usize,
    /// 统计纬度轴 [deg]，严格单调递增
    pub lat_axis: Vec<f64>,
    /// 参考气压廓线 [hPa]，自下而上
    pub p_ref: Vec<f64>,
    /// 参考地面气压 [hPa]
    pub ps_ref: f64,
    /// 温度-流函数耦合，nlat × nlev × nlev
    pub t_on_sf: Vec<f64>,
    /// 速度势-流函数耦合，nlat × nlev
    pub vp_on_sf: Vec<f64>,
    /// 地面气压-流函数耦合，nlat × nlev
    pub ps_on_sf: Vec<f64>,
    /// 地面气压-温度耦合，nlat × nlev
    pub ps_on_t: Vec<f64>,
    /// 扩展模式系数表（可选）
    pub extended: Option<ExtendedStats>,
}

/// 扩展模式系数表
///
/// 按纬度体制（陆地/海洋/其他）分表存放 55 个三层系数矩阵与
/// 11 个二层系数向量，规范顺序见 [`crate::canonical`]。
#[derive(Debug, Clone)]
pub struct ExtendedStats {
    /// 纬度体制数（1..=3）
    pub n_regimes: usize,
    /// 纬度带数（与外层一致，用于寻址）
    pub nlat: usize,
    /// 垂直层数（与外层一致，用于寻址）
    pub nlev: usize,
    /// 三层系数，n_regimes × 55 × nlat × nlev × nlev
    pub three_level: Vec<f64>,
    /// 二层系数，n_regimes × 11 × nlat × nlev
    pub two_level: Vec<f64>,
}

impl BalanceStats {
    /// 温度-流函数系数 (纬度带, 目标层, 预报层)
    #[inline]
    pub fn t_on_sf(&self, band: usize, k: usize, l: usize) -> f64 {
        self.t_on_sf[(band * self.nlev + k) * self.nlev + l]
    }

    /// 速度势-流函数系数 (纬度带, 层)
    #[inline]
    pub fn vp_on_sf(&self, band: usize, k: usize) -> f64 {
        self.vp_on_sf[band * self.nlev + k]
    }

    /// 地面气压-流函数系数 (纬度带, 层)
    #[inline]
    pub fn ps_on_sf(&self, band: usize, k: usize) -> f64 {
        self.ps_on_sf[band * self.nlev + k]
    }

    /// 地面气压-温度系数 (纬度带, 层)
    #[inline]
    pub fn ps_on_t(&self, band: usize, k: usize) -> f64 {
        self.ps_on_t[band * self.nlev + k]
    }

    /// 一致性验证（尺寸、纬度轴单调性、参考气压）
    pub fn validate(&self) -> AvResult<()> {
        if self.nlev == 0 {
            return Err(AvError::invalid_input("垂直层数不能为零"));
        }
        if self.nlat < 2 {
            return Err(AvError::invalid_input("纬度带数至少为 2"));
        }
        AvError::check_size("lat_axis", self.nlat, self.lat_axis.len())?;
        AvError::check_size("p_ref", self.nlev, self.p_ref.len())?;
        AvError::check_size("t_on_sf", self.nlat * self.nlev * self.nlev, self.t_on_sf.len())?;
        AvError::check_size("vp_on_sf", self.nlat * self.nlev, self.vp_on_sf.len())?;
        AvError::check_size("ps_on_sf", self.nlat * self.nlev, self.ps_on_sf.len())?;
        AvError::check_size("ps_on_t", self.nlat * self.nlev, self.ps_on_t.len())?;
        for w in self.lat_axis.windows(2) {
            if !(w[1] > w[0]) {
                return Err(AvError::format("统计纬度轴必须严格单调递增"));
            }
        }
        if !(self.ps_ref > 0.0) {
            return Err(AvError::out_of_range("ps_ref", self.ps_ref, f64::MIN_POSITIVE, f64::MAX));
        }
        if let Some(ext) = &self.extended {
            ext.validate(self.nlat, self.nlev)?;
        }
        Ok(())
    }

    /// 保存到文件
    pub fn save(&self, path: &Path) -> AvResult<()> {
        self.validate()?;
        let file = File::create(path)
            .map_err(|e| AvError::io_with_source(format!("创建 {} 失败", path.display()), e))?;
        let mut w = BufWriter::new(file);

        w.write_all(STATS_MAGIC)?;
        write_u32(&mut w, STATS_VERSION)?;
        write_u32(&mut w, self.nlev as u32)?;
        write_u32(&mut w, self.nlat as u32)?;
        let n_regimes = self.extended.as_ref().map_or(0, |e| e.n_regimes);
        write_u32(&mut w, n_regimes as u32)?;

        write_f64_slice(&mut w, &self.lat_axis)?;
        write_f64_slice(&mut w, &self.p_ref)?;
        write_f64(&mut w, self.ps_ref)?;

        write_f64_slice(&mut w, &self.t_on_sf)?;
        write_f64_slice(&mut w, &self.vp_on_sf)?;
        write_f64_slice(&mut w, &self.ps_on_sf)?;
        write_f64_slice(&mut w, &self.ps_on_t)?;

        if let Some(ext) = &self.extended {
            write_f64_slice(&mut w, &ext.three_level)?;
            write_f64_slice(&mut w, &ext.two_level)?;
        }

        w.flush()?;
        Ok(())
    }

    /// 从文件加载
    pub fn load(path: &Path) -> AvResult<Self> {
        if !path.exists() {
            return Err(AvError::file_not_found(path));
        }
        let file = File::open(path)
            .map_err(|e| AvError::io_with_source(format!("打开 {} 失败", path.display()), e))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != STATS_MAGIC {
            return Err(AvError::format("魔数不匹配，不是统计文件"));
        }
        let version = read_u32(&mut r)?;
        if version != STATS_VERSION {
            return Err(AvError::format(format!(
                "不支持的文件版本 {version}（当前 {STATS_VERSION}）"
            )));
        }

        let nlev = read_u32(&mut r)? as usize;
        let nlat = read_u32(&mut r)? as usize;
        let n_regimes = read_u32(&mut r)? as usize;
        if nlev == 0 || nlev > 512 {
            return Err(AvError::format(format!("垂直层数异常: {nlev}")));
        }
        if nlat < 2 || nlat > 4096 {
            return Err(AvError::format(format!("纬度带数异常: {nlat}")));
        }
        if n_regimes > MAX_REGIMES {
            return Err(AvError::format(format!("体制数异常: {n_regimes}")));
        }

        let lat_axis = read_f64_vec(&mut r, nlat)?;
        let p_ref = read_f64_vec(&mut r, nlev)?;
        let ps_ref = read_f64(&mut r)?;

        let t_on_sf = read_f64_vec(&mut r, nlat * nlev * nlev)?;
        let vp_on_sf = read_f64_vec(&mut r, nlat * nlev)?;
        let ps_on_sf = read_f64_vec(&mut r, nlat * nlev)?;
        let ps_on_t = read_f64_vec(&mut r, nlat * nlev)?;

        let extended = if n_regimes > 0 {
            let three_level =
                read_f64_vec(&mut r, n_regimes * N_THREE_LEVEL * nlat * nlev * nlev)?;
            let two_level = read_f64_vec(&mut r, n_regimes * N_TWO_LEVEL * nlat * nlev)?;
            Some(ExtendedStats {
                n_regimes,
                nlat,
                nlev,
                three_level,
                two_level,
            })
        } else {
            None
        };

        let stats = Self {
            nlev,
            nlat,
            lat_axis,
            p_ref,
            ps_ref,
            t_on_sf,
            vp_on_sf,
            ps_on_sf,
            ps_on_t,
            extended,
        };
        stats.validate()?;
        Ok(stats)
    }

    /// 生成确定性的合成统计（自检与测试用）
    ///
    /// 系数取平滑的解析函数，纬度轴覆盖 [-80, 80]，
    /// 参考气压廓线单调递减、保证截断层存在。
    pub fn synthetic(nlev: usize, nlat: usize, n_regimes: usize) -> Self {
        assert!(nlev >= 2 && nlat >= 2 && n_regimes <= MAX_REGIMES);
        let ps_ref = 1000.0;
        let lat_axis: Vec<f64> = (0..nlat)
            .map(|b| -80.0 + 160.0 * b as f64 / (nlat - 1) as f64)
            .collect();
        // 底层取 ps_ref 本身，保证截断层出现在内部而非底层
        let p_ref: Vec<f64> = (0..nlev)
            .map(|k| ps_ref * (-(k as f64) / (0.4 * nlev as f64)).exp())
            .collect();

        let smooth = |a: usize, b: usize, c: usize| -> f64 {
            0.1 * ((a as f64 * 0.7).sin() + (b as f64 * 0.3).cos() * 0.5)
                / (1.0 + (b as f64 - c as f64).abs())
        };

        let mut t_on_sf = Vec::with_capacity(nlat * nlev * nlev);
        for band in 0..nlat {
            for k in 0..nlev {
                for l in 0..nlev {
                    t_on_sf.push(smooth(band, k, l));
                }
            }
        }
        let mut vp_on_sf = Vec::with_capacity(nlat * nlev);
        let mut ps_on_sf = Vec::with_capacity(nlat * nlev);
        let mut ps_on_t = Vec::with_capacity(nlat * nlev);
        for band in 0..nlat {
            for k in 0..nlev {
                vp_on_sf.push(0.2 + smooth(band, k, 0));
                ps_on_sf.push(0.05 + smooth(band, k, 1));
                ps_on_t.push(0.01 + smooth(band, k, 2) * 0.1);
            }
        }

        let extended = (n_regimes > 0).then(|| {
            let mut three_level =
                Vec::with_capacity(n_regimes * N_THREE_LEVEL * nlat * nlev * nlev);
            for r in 0..n_regimes {
                for c in 0..N_THREE_LEVEL {
                    for band in 0..nlat {
                        for k in 0..nlev {
                            for l in 0..nlev {
                                three_level.push(smooth(r + c + band, k, l) * 0.5);
                            }
                        }
                    }
                }
            }
            let mut two_level = Vec::with_capacity(n_regimes * N_TWO_LEVEL * nlat * nlev);
            for r in 0..n_regimes {
                for c in 0..N_TWO_LEVEL {
                    for band in 0..nlat {
                        for k in 0..nlev {
                            two_level.push(smooth(r + c, band, k) * 0.2);
                        }
                    }
                }
            }
            ExtendedStats {
                n_regimes,
                nlat,
                nlev,
                three_level,
                two_level,
            }
        });

        Self {
            nlev,
            nlat,
            lat_axis,
            p_ref,
            ps_ref,
            t_on_sf,
            vp_on_sf,
            ps_on_sf,
            ps_on_t,
            extended,
        }
    }
}

impl ExtendedStats {
    /// 三层系数 (体制, 规范索引, 纬度带, 目标层, 预报层)
    #[inline]
    pub fn three_level(&self, regime: usize, coeff: usize, band: usize, k: usize, l: usize) -> f64 {
        let base = ((regime * N_THREE_LEVEL + coeff) * self.nlat + band) * self.nlev * self.nlev;
        self.three_level[base + k * self.nlev + l]
    }

    /// 二层系数 (体制, 规范索引, 纬度带, 层)
    #[inline]
    pub fn two_level(&self, regime: usize, coeff: usize, band: usize, k: usize) -> f64 {
        let base = ((regime * N_TWO_LEVEL + coeff) * self.nlat + band) * self.nlev;
        self.two_level[base + k]
    }

    fn validate(&self, nlat: usize, nlev: usize) -> AvResult<()> {
        if self.n_regimes == 0 || self.n_regimes > MAX_REGIMES {
            return Err(AvError::invalid_input("纬度体制数必须在 1..=3"));
        }
        if self.nlat != nlat || self.nlev != nlev {
            return Err(AvError::invalid_input("扩展表尺寸与外层不一致"));
        }
        AvError::check_size(
            "three_level",
            self.n_regimes * N_THREE_LEVEL * nlat * nlev * nlev,
            self.three_level.len(),
        )?;
        AvError::check_size(
            "two_level",
            self.n_regimes * N_TWO_LEVEL * nlat * nlev,
            self.two_level.len(),
        )?;
        Ok(())
    }
}

// ============================================================
// 读写辅助
// ============================================================

fn write_u32<W: Write>(w: &mut W, v: u32) -> AvResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f64<W: Write>(w: &mut W, v: f64) -> AvResult<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_f64_slice<W: Write>(w: &mut W, vals: &[f64]) -> AvResult<()> {
    for &v in vals {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> AvResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> AvResult<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_f64_vec<R: Read>(r: &mut R, n: usize) -> AvResult<Vec<f64>> {
    let mut out = vec![0.0f64; n];
    let mut buf = [0u8; 8];
    for v in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *v = f64::from_le_bytes(buf);
    }
    Ok(out)
}

// ============================================================
// 测试
// ============================================================
