//! 诊断信息
//!
//! 几何歧义（分叉、未闭合残段、多个板框候选、无法分类的形状、可疑的单位头）
//! 按确定性规则处理后以诊断形式上报，既不致命也不静默丢弃。

use crate::math::Point2;
use serde::Serialize;
use std::fmt;

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// 端点处有多于一条可继续的路径段
    Branch {
        layer: String,
        point: Point2,
        candidates: usize,
    },
    /// 未能闭合的路径
    Residue {
        layer: String,
        segments: usize,
        sources: Vec<usize>,
    },
    /// 多个闭合环竞争板框，最大者胜出
    MultipleOutlines { count: usize, layers: Vec<String> },
    /// 形状未被分配任何角色
    Unclassified {
        layer: String,
        sources: Vec<usize>,
        reason: String,
    },
    /// 文件头单位被拒绝
    UnitHeader { header: String, reason: String },
}

impl Diagnostic {
    /// 日志中使用的简短类别名
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::Branch { .. } => "branch",
            Diagnostic::Residue { .. } => "residue",
            Diagnostic::MultipleOutlines { .. } => "multiple_outlines",
            Diagnostic::Unclassified { .. } => "unclassified",
            Diagnostic::UnitHeader { .. } => "unit_header",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Branch {
                layer,
                point,
                candidates,
            } => write!(
                f,
                "layer '{}': {} segments meet at ({:.4}, {:.4}), picked smallest turn",
                layer, candidates, point.x, point.y
            ),
            Diagnostic::Residue {
                layer,
                segments,
                sources,
            } => write!(
                f,
                "layer '{}': open path of {} segments (entities {:?}) does not close",
                layer, segments, sources
            ),
            Diagnostic::MultipleOutlines { count, layers } => write!(
                f,
                "{} outline candidates on layers {:?}, largest kept, others become cutouts",
                count, layers
            ),
            Diagnostic::Unclassified {
                layer,
                sources,
                reason,
            } => write!(
                f,
                "layer '{}': shape from entities {:?} left unclassified ({})",
                layer, sources, reason
            ),
            Diagnostic::UnitHeader { header, reason } => {
                write!(f, "unit header {} ignored: {}", header, reason)
            }
        }
    }
}
