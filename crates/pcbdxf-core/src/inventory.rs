//! 实体清单
//!
//! DXF 读取器把文件内容转换为 [`Inventory`]：按出现顺序编号的实体记录、
//! 首次出现顺序的图层表以及文件头信息。后续各阶段只读取清单，不再接触 DXF。

use crate::error::ImportError;
use crate::geometry::{Arc, Circle, Line, Polyline, Segment};
use crate::math::{BoundingBox2, Point2};
use crate::units::HeaderUnit;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 文字注释（TEXT / MTEXT）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNote {
    pub content: String,
    pub position: Point2,
    pub height: f64,
    /// 旋转角度（弧度）
    pub rotation: f64,
}

/// 填充（HATCH）
///
/// 每个边界是一组首尾相接的段，可能来自多段线边界或线/弧边界。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hatch {
    pub boundaries: Vec<Vec<Segment>>,
    pub solid: bool,
}

impl Hatch {
    pub fn bounding_box(&self) -> BoundingBox2 {
        self.boundaries
            .iter()
            .flatten()
            .fold(BoundingBox2::empty(), |bb, s| bb.union(&s.bounding_box()))
    }
}

/// 实体内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Line(Line),
    Arc(Arc),
    Polyline(Polyline),
    Circle(Circle),
    Text(TextNote),
    Hatch(Hatch),
    /// 不支持的实体（样条、块引用、3D 实体……），只计数
    Unsupported,
}

impl EntityKind {
    /// 参与几何的实体的包围盒
    pub fn bounding_box(&self) -> Option<BoundingBox2> {
        match self {
            EntityKind::Line(l) => Some(l.bounding_box()),
            EntityKind::Arc(a) => Some(a.bounding_box()),
            EntityKind::Polyline(p) => Some(p.bounding_box()),
            EntityKind::Circle(c) => Some(c.bounding_box()),
            EntityKind::Hatch(h) => Some(h.bounding_box()),
            EntityKind::Text(_) | EntityKind::Unsupported => None,
        }
    }
}

/// 实体记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// 在实体流中的序号
    pub index: usize,
    pub layer: String,
    /// DXF 类型名，如 `LINE`、`LWPOLYLINE`
    pub dxf_type: String,
    pub kind: EntityKind,
}

/// DXF 文件内容清单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub dxf_version: String,
    pub header_unit: Option<HeaderUnit>,
    /// 图层 -> 实体数，保持首次出现顺序
    layers: IndexMap<String, usize>,
    entities: Vec<EntityRecord>,
}

impl Inventory {
    pub fn new(dxf_version: impl Into<String>, header_unit: Option<HeaderUnit>) -> Self {
        Self {
            dxf_version: dxf_version.into(),
            header_unit,
            layers: IndexMap::new(),
            entities: Vec::new(),
        }
    }

    /// 追加实体，返回分配的序号
    pub fn push(&mut self, layer: impl Into<String>, dxf_type: impl Into<String>, kind: EntityKind) -> usize {
        let layer = layer.into();
        let index = self.entities.len();
        *self.layers.entry(layer.clone()).or_insert(0) += 1;
        self.entities.push(EntityRecord {
            index,
            layer,
            dxf_type: dxf_type.into(),
            kind,
        });
        index
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 图层及其实体数（首次出现顺序）
    pub fn layers(&self) -> &IndexMap<String, usize> {
        &self.layers
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        self.layers.contains_key(layer)
    }

    /// 按 DXF 类型统计
    pub fn entity_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entities {
            *counts.entry(e.dxf_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// 所有几何实体的包围盒
    pub fn bounding_box(&self) -> BoundingBox2 {
        self.entities
            .iter()
            .filter_map(|e| e.kind.bounding_box())
            .fold(BoundingBox2::empty(), |bb, b| bb.union(&b))
    }

    /// 检查坐标有限、半径为正
    pub fn validate(&self) -> Result<(), ImportError> {
        for e in &self.entities {
            if let Err(reason) = validate_kind(&e.kind) {
                return Err(ImportError::MalformedEntity {
                    index: e.index,
                    layer: e.layer.clone(),
                    dxf_type: e.dxf_type.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

fn finite(p: &Point2) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

fn validate_radius(r: f64) -> Result<(), String> {
    if r.is_finite() && r > 0.0 {
        Ok(())
    } else {
        Err(format!("radius {} is not positive", r))
    }
}

fn validate_segment(s: &Segment) -> Result<(), String> {
    match s {
        Segment::Line(l) => validate_points(&[l.start, l.end]),
        Segment::Arc(a) => validate_arc(a),
    }
}

fn validate_arc(a: &Arc) -> Result<(), String> {
    validate_points(&[a.center])?;
    validate_radius(a.radius)?;
    if !(a.start_angle.is_finite() && a.end_angle.is_finite()) {
        return Err("non-finite arc angle".to_string());
    }
    Ok(())
}

fn validate_points(points: &[Point2]) -> Result<(), String> {
    match points.iter().find(|p| !finite(p)) {
        Some(p) => Err(format!("non-finite coordinate ({}, {})", p.x, p.y)),
        None => Ok(()),
    }
}

fn validate_kind(kind: &EntityKind) -> Result<(), String> {
    match kind {
        EntityKind::Line(l) => validate_points(&[l.start, l.end]),
        EntityKind::Arc(a) => validate_arc(a),
        EntityKind::Circle(c) => {
            validate_points(&[c.center])?;
            validate_radius(c.radius)
        }
        EntityKind::Polyline(p) => {
            for v in &p.vertices {
                validate_points(&[v.point])?;
                if !v.bulge.is_finite() {
                    return Err("non-finite bulge".to_string());
                }
            }
            Ok(())
        }
        EntityKind::Hatch(h) => h.boundaries.iter().flatten().try_for_each(validate_segment),
        EntityKind::Text(_) | EntityKind::Unsupported => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> EntityKind {
        EntityKind::Line(Line::new(Point2::new(x0, y0), Point2::new(x1, y1)))
    }

    #[test]
    fn test_layers_keep_encounter_order() {
        let mut inv = Inventory::new("R2018", None);
        assert_eq!(inv.push("Z", "LINE", line(0.0, 0.0, 1.0, 0.0)), 0);
        assert_eq!(inv.push("A", "LINE", line(0.0, 0.0, 0.0, 1.0)), 1);
        inv.push("Z", "SPLINE", EntityKind::Unsupported);

        let layers: Vec<_> = inv.layers().iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(layers, vec![("Z", 2), ("A", 1)]);

        let counts = inv.entity_counts();
        assert_eq!(counts.get("LINE"), Some(&2));
        assert_eq!(counts.get("SPLINE"), Some(&1));
        assert_eq!(inv.len(), 3);
    }

    #[test]
    fn test_bounding_box_skips_text() {
        let mut inv = Inventory::new("R12", None);
        inv.push("0", "LINE", line(0.0, 0.0, 10.0, 5.0));
        inv.push(
            "NOTES",
            "TEXT",
            EntityKind::Text(TextNote {
                content: "far away".to_string(),
                position: Point2::new(1000.0, 1000.0),
                height: 2.5,
                rotation: 0.0,
            }),
        );
        inv.push("0", "CIRCLE", EntityKind::Circle(Circle::new(Point2::new(10.0, 5.0), 1.0)));

        let bb = inv.bounding_box();
        assert!((bb.min.x - 0.0).abs() < 1e-12);
        assert!((bb.max.x - 11.0).abs() < 1e-12);
        assert!((bb.max.y - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        let mut inv = Inventory::new("R12", None);
        inv.push("0", "LINE", line(0.0, 0.0, 10.0, 5.0));
        assert!(inv.validate().is_ok());

        inv.push("HOLES", "CIRCLE", EntityKind::Circle(Circle::new(Point2::new(1.0, 1.0), 0.0)));
        match inv.validate() {
            Err(ImportError::MalformedEntity { index, layer, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(layer, "HOLES");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut inv = Inventory::new("R12", None);
        inv.push("0", "LINE", line(0.0, f64::NAN, 10.0, 5.0));
        assert!(inv.validate().is_err());
    }
}
