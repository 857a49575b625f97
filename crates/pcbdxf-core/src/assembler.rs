//! 路径拼接
//!
//! 机械 CAD 导出的 DXF 常把板框拆成互不相连、仅共享端点的 LINE/ARC。
//! 本模块把这些片段拼接成闭合环，无法闭合的部分作为残段上报。
//!
//! 实现要点：
//! - 段池 (arena) 按序号存放全部段，另有一个按序号的 `consumed` 向量
//! - 每一步消耗一个段，因此链条追踪必然终止，不依赖迭代次数上限
//! - 分叉处选择转角最小的延续方向，转角相同时取序号最小者

use crate::diagnostic::Diagnostic;
use crate::geometry::{Loop, Path, Segment};
use crate::math::{Point2, Vector2};
use crate::spatial::{EndpointIndex, EndpointKey};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// 默认相对容差（乘以文件范围）
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-6;

/// 容差下限
pub const MIN_TOLERANCE: f64 = 1e-9;

/// 拼接配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// 绝对容差（原始文件单位）；为空时按文件范围推算
    pub tolerance: Option<f64>,
    /// 相对容差系数
    pub relative_tolerance: f64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            tolerance: None,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

impl AssemblyConfig {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance: Some(tolerance),
            ..Self::default()
        }
    }

    /// 根据文件范围计算实际使用的容差
    pub fn effective_tolerance(&self, extent: f64) -> f64 {
        self.tolerance
            .unwrap_or(extent * self.relative_tolerance)
            .max(MIN_TOLERANCE)
    }
}

/// 带源实体序号的路径段
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcedSegment {
    pub segment: Segment,
    pub source: usize,
}

impl SourcedSegment {
    pub fn new(segment: Segment, source: usize) -> Self {
        Self { segment, source }
    }
}

/// 拼接结果
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    /// 闭合环（按最小源实体序号排序）
    pub loops: Vec<Loop>,
    /// 未闭合的残段
    pub residues: Vec<Path>,
    pub diagnostics: Vec<Diagnostic>,
}

/// 路径拼接器
#[derive(Debug, Clone, Copy)]
pub struct PathAssembler {
    tolerance: f64,
}

impl PathAssembler {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(MIN_TOLERANCE),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 拼接单个图层的段
    ///
    /// `closed` 中的路径（闭合多段线）视为已闭合，直接成为环，不参与拼接。
    pub fn assemble(&self, layer: &str, segments: &[SourcedSegment], closed: Vec<Path>) -> Assembly {
        let mut index = EndpointIndex::new(self.tolerance);
        for (i, s) in segments.iter().enumerate() {
            index.insert(EndpointKey { segment: i, at_start: true }, s.segment.start());
            index.insert(EndpointKey { segment: i, at_start: false }, s.segment.end());
        }

        let mut consumed = vec![false; segments.len()];
        let mut result = Assembly::default();

        for seed in 0..segments.len() {
            if consumed[seed] {
                continue;
            }
            consumed[seed] = true;

            let mut chain = VecDeque::from([segments[seed]]);
            let mut closed_chain = self.is_closed(&chain);

            // 向前延伸
            while !closed_chain {
                let Some(tail) = chain.back() else { break };
                let point = tail.segment.end();
                let incoming = tail.segment.end_tangent();
                match self.next_segment(layer, point, incoming, true, segments, &index, &consumed, &mut result) {
                    Some((i, seg)) => {
                        consumed[i] = true;
                        chain.push_back(seg);
                        closed_chain = self.is_closed(&chain);
                    }
                    None => break,
                }
            }

            // 死路：从起点向后延伸，使残段尽可能完整
            while !closed_chain {
                let Some(head) = chain.front() else { break };
                let point = head.segment.start();
                let outgoing = head.segment.start_tangent();
                match self.next_segment(layer, point, outgoing, false, segments, &index, &consumed, &mut result) {
                    Some((i, seg)) => {
                        consumed[i] = true;
                        chain.push_front(seg);
                        closed_chain = self.is_closed(&chain);
                    }
                    None => break,
                }
            }

            let sources = chain.iter().map(|s| s.source).collect::<Vec<_>>();
            let path = Path::new(chain.into_iter().map(|s| s.segment).collect(), layer, sources);

            if closed_chain {
                result.loops.push(Loop::from_path(path));
            } else {
                result.diagnostics.push(Diagnostic::Residue {
                    layer: layer.to_string(),
                    segments: path.segments.len(),
                    sources: path.sources.clone(),
                });
                result.residues.push(path);
            }
        }

        result.loops.extend(closed.into_iter().map(Loop::from_path));
        result
            .loops
            .sort_by_key(|l| l.sources().iter().copied().min().unwrap_or(usize::MAX));

        debug!(
            layer,
            segments = segments.len(),
            loops = result.loops.len(),
            residues = result.residues.len(),
            tolerance = self.tolerance,
            "assembled layer"
        );

        result
    }

    /// 链条首尾重合且总长度超过容差
    fn is_closed(&self, chain: &VecDeque<SourcedSegment>) -> bool {
        let (Some(head), Some(tail)) = (chain.front(), chain.back()) else {
            return false;
        };
        let gap = (tail.segment.end() - head.segment.start()).norm();
        let length: f64 = chain.iter().map(|s| s.segment.length()).sum();
        gap <= self.tolerance && length > self.tolerance
    }

    /// 在 `point` 处寻找下一个未消耗的段
    ///
    /// `forward` 为真时返回的段以 `point` 为起点；否则以 `point` 为终点。
    /// `tangent` 是链条在该点的行进方向，用于分叉时选择转角最小者。
    #[allow(clippy::too_many_arguments)]
    fn next_segment(
        &self,
        layer: &str,
        point: Point2,
        tangent: Vector2,
        forward: bool,
        segments: &[SourcedSegment],
        index: &EndpointIndex,
        consumed: &[bool],
        result: &mut Assembly,
    ) -> Option<(usize, SourcedSegment)> {
        let mut candidates: Vec<(usize, SourcedSegment)> = Vec::new();
        for key in index.query(&point) {
            if consumed[key.segment] || candidates.iter().any(|(i, _)| *i == key.segment) {
                continue;
            }
            let original = segments[key.segment];
            // 前向需要起点在 point，后向需要终点在 point
            let segment = if key.at_start == forward {
                original.segment
            } else {
                original.segment.reversed()
            };
            candidates.push((key.segment, SourcedSegment::new(segment, original.source)));
        }

        if candidates.len() > 1 {
            result.diagnostics.push(Diagnostic::Branch {
                layer: layer.to_string(),
                point,
                candidates: candidates.len(),
            });
        }

        candidates
            .into_iter()
            .map(|(i, s)| {
                let continuation = if forward {
                    s.segment.start_tangent()
                } else {
                    s.segment.end_tangent()
                };
                (turn_angle(&tangent, &continuation), i, s)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, i, s)| (i, s))
    }
}

/// 两个方向之间的转角 [0, π]；零向量视为无转角
fn turn_angle(a: &Vector2, b: &Vector2) -> f64 {
    if a.norm() == 0.0 || b.norm() == 0.0 {
        0.0
    } else {
        a.angle(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Arc, Line};
    use std::f64::consts::PI;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64, source: usize) -> SourcedSegment {
        SourcedSegment::new(
            Segment::Line(Line::new(Point2::new(x0, y0), Point2::new(x1, y1))),
            source,
        )
    }

    fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64, first: usize) -> Vec<SourcedSegment> {
        vec![
            line(x0, y0, x1, y0, first),
            line(x1, y0, x1, y1, first + 1),
            line(x1, y1, x0, y1, first + 2),
            line(x0, y1, x0, y0, first + 3),
        ]
    }

    fn consumed_sources(a: &Assembly) -> Vec<usize> {
        let mut all: Vec<usize> = a
            .loops
            .iter()
            .flat_map(|l| l.sources().to_vec())
            .chain(a.residues.iter().flat_map(|p| p.sources.clone()))
            .collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn test_simple_rectangle() {
        let asm = PathAssembler::new(1e-3).assemble("L", &rectangle(0.0, 0.0, 10.0, 5.0, 0), vec![]);
        assert_eq!(asm.loops.len(), 1);
        assert_eq!(asm.loops[0].vertex_count(), 4);
        assert!((asm.loops[0].abs_area() - 50.0).abs() < 1e-9);
        assert!(asm.residues.is_empty());
        assert!(asm.diagnostics.is_empty());
    }

    #[test]
    fn test_mixed_orientation() {
        // 段方向不一致时需要翻转
        let segs = vec![
            line(0.0, 0.0, 10.0, 0.0, 0),
            line(10.0, 5.0, 10.0, 0.0, 1),
            line(10.0, 5.0, 0.0, 5.0, 2),
            line(0.0, 0.0, 0.0, 5.0, 3),
        ];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert_eq!(asm.loops.len(), 1);
        let lp = &asm.loops[0];
        for pair in lp.segments().windows(2) {
            assert!((pair[0].end() - pair[1].start()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_shuffle_invariance() {
        let mut segs = rectangle(0.0, 0.0, 10.0, 5.0, 0);
        segs.extend(rectangle(20.0, 20.0, 25.0, 26.0, 4));
        segs.push(SourcedSegment::new(
            Segment::Arc(Arc::new(Point2::new(50.0, 0.0), 2.0, 0.0, PI, true)),
            8,
        ));
        segs.push(line(48.0, 0.0, 52.0, 0.0, 9));

        let baseline = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        let mut shuffled = segs.clone();
        shuffled.reverse();
        shuffled.swap(0, 5);
        shuffled.swap(2, 7);
        let other = PathAssembler::new(1e-3).assemble("L", &shuffled, vec![]);

        assert_eq!(baseline.loops.len(), 3);
        assert_eq!(other.loops.len(), 3);
        for (a, b) in baseline.loops.iter().zip(other.loops.iter()) {
            assert!((a.abs_area() - b.abs_area()).abs() < 1e-9);
            assert!((a.bounding_box().min - b.bounding_box().min).norm() < 1e-9);
            assert!((a.bounding_box().max - b.bounding_box().max).norm() < 1e-9);
        }
    }

    #[test]
    fn test_tolerance_matching() {
        let segs = vec![
            line(0.0, 0.0, 10.0, 0.0, 0),
            line(10.0005, 0.0, 10.0, 5.0, 1),
            line(10.0, 5.0, 0.0, 5.0, 2),
            line(0.0, 5.0, 0.0, 0.0003, 3),
        ];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert_eq!(asm.loops.len(), 1);

        let strict = PathAssembler::new(1e-5).assemble("L", &segs, vec![]);
        assert!(strict.loops.is_empty());
        assert_eq!(consumed_sources(&strict), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_open_residue_is_maximal() {
        // 从中间段开始时，向后延伸也要把前面的段收进来
        let segs = vec![
            line(10.0, 0.0, 20.0, 0.0, 0),
            line(0.0, 0.0, 10.0, 0.0, 1),
            line(20.0, 0.0, 20.0, 10.0, 2),
        ];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert!(asm.loops.is_empty());
        assert_eq!(asm.residues.len(), 1);
        assert_eq!(asm.residues[0].segments.len(), 3);
        assert!((asm.residues[0].start().unwrap() - Point2::new(0.0, 0.0)).norm() < 1e-9);
        assert!(matches!(asm.diagnostics[0], Diagnostic::Residue { segments: 3, .. }));
    }

    #[test]
    fn test_every_segment_consumed_once() {
        let mut segs = rectangle(0.0, 0.0, 10.0, 10.0, 0);
        segs.push(line(10.0, 10.0, 15.0, 15.0, 4)); // 分叉出去的尾巴
        segs.push(line(30.0, 30.0, 31.0, 30.0, 5));
        segs.push(line(40.0, 40.0, 40.0, 40.0, 6)); // 零长度
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert_eq!(consumed_sources(&asm), vec![0, 1, 2, 3, 4, 5, 6]);
        // 在 (10,10) 处尾巴转角更小，矩形因此不闭合，以残段和分叉诊断上报
        assert!(asm.loops.is_empty());
        assert_eq!(asm.residues.len(), 3);
        assert!(asm
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::Branch { .. })));
    }

    #[test]
    fn test_branch_prefers_smallest_turn() {
        // 在 (10,0) 处：直行到 (20,0) 与左转到 (10,10)
        let segs = vec![
            line(0.0, 0.0, 10.0, 0.0, 0),
            line(10.0, 0.0, 10.0, 10.0, 1),
            line(10.0, 0.0, 20.0, 0.0, 2),
        ];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert!(asm
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::Branch { candidates: 2, .. })));
        let first = &asm.residues[0];
        assert_eq!(first.sources, vec![0, 2]);
        assert_eq!(asm.residues.len(), 2);
    }

    #[test]
    fn test_zero_length_segments_terminate() {
        let segs = vec![
            line(1.0, 1.0, 1.0, 1.0, 0),
            line(1.0, 1.0, 1.0, 1.0, 1),
            line(1.0, 1.0, 1.0, 1.0, 2),
        ];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert!(asm.loops.is_empty());
        assert_eq!(consumed_sources(&asm), vec![0, 1, 2]);
    }

    #[test]
    fn test_full_circle_arc_closes_alone() {
        let segs = vec![SourcedSegment::new(
            Segment::Arc(Arc::new(Point2::new(5.0, 5.0), 1.0, 0.0, 0.0, true)),
            0,
        )];
        let asm = PathAssembler::new(1e-3).assemble("L", &segs, vec![]);
        assert_eq!(asm.loops.len(), 1);
        assert!((asm.loops[0].abs_area() - PI).abs() < 1e-9);
    }

    #[test]
    fn test_closed_paths_bypass_assembly() {
        let closed = Path::new(
            rectangle(0.0, 0.0, 2.0, 2.0, 0).into_iter().map(|s| s.segment).collect(),
            "L",
            vec![3],
        );
        let asm = PathAssembler::new(1e-3).assemble("L", &rectangle(5.0, 5.0, 6.0, 6.0, 10), vec![closed]);
        assert_eq!(asm.loops.len(), 2);
        // 按源实体序号排序：多段线 (3) 在前
        assert_eq!(asm.loops[0].sources(), &[3]);
    }

    #[test]
    fn test_effective_tolerance() {
        let config = AssemblyConfig::default();
        assert!((config.effective_tolerance(100.0) - 1e-4).abs() < 1e-15);
        assert_eq!(config.effective_tolerance(0.0), MIN_TOLERANCE);
        assert_eq!(AssemblyConfig::with_tolerance(0.01).effective_tolerance(1e6), 0.01);
    }
}
