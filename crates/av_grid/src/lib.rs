// crates/av_grid/src/lib.rs

//! AtmoVar 网格层
//!
//! 提供平衡算子所需的水平网格元数据与纬度插值：
//! - [`decomposition`]: 全球网格与子域分解描述
//! - [`latitude`]: 统计纬度轴小数索引解析与子域纬度映射
//!
//! 网格元数据建成后只读，供每次变换调用无同步并发读取。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decomposition;
pub mod latitude;

// 重导出常用类型
pub use decomposition::{GlobalGrid, TileSpec};
pub use latitude::{LatitudeInterpolator, LatitudeMap};
