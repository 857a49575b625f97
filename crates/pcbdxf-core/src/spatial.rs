//! 端点空间索引
//!
//! 基于网格的哈希索引，网格单元大小等于匹配容差。查询时检查 3×3 邻域，
//! 再用真实距离过滤，因此容差内的两个端点即使落在相邻单元也能匹配。

use crate::math::Point2;
use std::collections::HashMap;

/// 路径段的一个端点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    /// 段在段池中的序号
    pub segment: usize,
    /// 是否为段的起点
    pub at_start: bool,
}

/// 端点网格索引
#[derive(Debug)]
pub struct EndpointIndex {
    /// 网格单元大小
    cell_size: f64,

    /// 网格映射：网格坐标 -> 端点列表
    grid: HashMap<(i64, i64), Vec<(EndpointKey, Point2)>>,
}

impl EndpointIndex {
    /// 创建新的端点索引，`tolerance` 必须为正
    pub fn new(tolerance: f64) -> Self {
        Self {
            cell_size: tolerance,
            grid: HashMap::new(),
        }
    }

    /// 将世界坐标转换为网格坐标
    fn to_grid_coord(&self, p: &Point2) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    /// 插入端点
    pub fn insert(&mut self, key: EndpointKey, point: Point2) {
        let cell = self.to_grid_coord(&point);
        self.grid.entry(cell).or_default().push((key, point));
    }

    /// 查询容差内的所有端点，按 (段序号, 起点优先) 排序以保证确定性
    pub fn query(&self, point: &Point2) -> Vec<EndpointKey> {
        let (gx, gy) = self.to_grid_coord(point);
        let mut result = Vec::new();

        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(entries) = self.grid.get(&(gx + dx, gy + dy)) {
                    for (key, p) in entries {
                        if (p - point).norm() <= self.cell_size {
                            result.push(*key);
                        }
                    }
                }
            }
        }

        result.sort_by_key(|k| (k.segment, !k.at_start));
        result
    }

    /// 获取端点数量
    pub fn len(&self) -> usize {
        self.grid.values().map(Vec::len).sum()
    }

    /// 检查是否为空
    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }
}
