//! 导入流水线
//!
//! 清单 → 几何集合（逐图层拼接）→ 单位检测 → 分类。每个阶段都是纯函数，
//! 诊断信息沿途累积并随结果返回。

use crate::assembler::{AssemblyConfig, PathAssembler, SourcedSegment};
use crate::classify::{ClassifiedResult, Classifier, KeywordGroups, LayerMap};
use crate::codegen::{self, CodegenOptions};
use crate::diagnostic::Diagnostic;
use crate::error::ImportError;
use crate::geometry::{CircleShape, Loop, Path, Segment};
use crate::inventory::{EntityKind, Inventory, TextNote};
use crate::math::BoundingBox2;
use crate::units::{detect_unit, LengthUnit, UnitInfo};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// 注释：文字和填充，不参与分类
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Text {
        layer: String,
        source: usize,
        note: TextNote,
    },
    Hatch {
        layer: String,
        source: usize,
        solid: bool,
        /// 边界拼接出的闭合环
        loops: Vec<Loop>,
    },
}

/// 原始坐标下的几何集合，尚未附带单位
#[derive(Debug, Clone, Default)]
pub struct GeometrySet {
    pub loops: Vec<Loop>,
    pub circles: Vec<CircleShape>,
    pub residues: Vec<Path>,
    pub annotations: Vec<Annotation>,
    pub diagnostics: Vec<Diagnostic>,
    /// 拼接使用的容差
    pub tolerance: f64,
}

impl GeometrySet {
    /// 环、圆、残段的总包围盒
    pub fn bounding_box(&self) -> BoundingBox2 {
        let loops = self.loops.iter().map(Loop::bounding_box);
        let circles = self.circles.iter().map(|c| c.circle.bounding_box());
        let residues = self.residues.iter().map(Path::bounding_box);
        loops
            .chain(circles)
            .chain(residues)
            .fold(BoundingBox2::empty(), |acc, b| acc.union(&b))
    }

    /// 最大边长，空集合为 0
    pub fn extent(&self) -> f64 {
        self.bounding_box().extent()
    }
}

/// 单个图层待拼接的内容
#[derive(Default)]
struct LayerBucket {
    segments: Vec<SourcedSegment>,
    closed: Vec<Path>,
}

/// 从清单构建几何集合
///
/// LINE、ARC 和开放多段线按图层拼接；闭合多段线直接成为环。
/// 图层按首次出现顺序处理。
pub fn build_geometry(inventory: &Inventory, config: &AssemblyConfig) -> GeometrySet {
    let tolerance = config.effective_tolerance(inventory.bounding_box().extent());
    let assembler = PathAssembler::new(tolerance);

    let mut layers: IndexMap<&str, LayerBucket> = IndexMap::new();
    let mut set = GeometrySet {
        tolerance: assembler.tolerance(),
        ..Default::default()
    };

    for e in inventory.entities() {
        match &e.kind {
            EntityKind::Line(l) => layers
                .entry(e.layer.as_str())
                .or_default()
                .segments
                .push(SourcedSegment::new(Segment::Line(*l), e.index)),
            EntityKind::Arc(a) => layers
                .entry(e.layer.as_str())
                .or_default()
                .segments
                .push(SourcedSegment::new(Segment::Arc(*a), e.index)),
            EntityKind::Polyline(p) => {
                let segments = p.explode();
                if segments.is_empty() {
                    continue;
                }
                let bucket = layers.entry(e.layer.as_str()).or_default();
                let path = Path::new(segments, e.layer.clone(), vec![e.index]);
                if p.closed && path.is_closed(assembler.tolerance()) {
                    bucket.closed.push(path);
                } else {
                    bucket
                        .segments
                        .extend(path.segments.into_iter().map(|s| SourcedSegment::new(s, e.index)));
                }
            }
            EntityKind::Circle(c) => set.circles.push(CircleShape::new(*c, e.layer.clone(), e.index)),
            EntityKind::Text(note) => set.annotations.push(Annotation::Text {
                layer: e.layer.clone(),
                source: e.index,
                note: note.clone(),
            }),
            EntityKind::Hatch(h) => {
                let segments: Vec<SourcedSegment> = h
                    .boundaries
                    .iter()
                    .flatten()
                    .map(|s| SourcedSegment::new(*s, e.index))
                    .collect();
                let assembly = assembler.assemble(&e.layer, &segments, Vec::new());
                set.annotations.push(Annotation::Hatch {
                    layer: e.layer.clone(),
                    source: e.index,
                    solid: h.solid,
                    loops: assembly.loops,
                });
            }
            EntityKind::Unsupported => {
                debug!(index = e.index, dxf_type = %e.dxf_type, "skipping unsupported entity");
            }
        }
    }

    for (layer, bucket) in layers {
        let assembly = assembler.assemble(layer, &bucket.segments, bucket.closed);
        set.loops.extend(assembly.loops);
        set.residues.extend(assembly.residues);
        set.diagnostics.extend(assembly.diagnostics);
    }

    for d in &set.diagnostics {
        warn!(kind = d.kind(), "{}", d);
    }
    debug!(
        loops = set.loops.len(),
        circles = set.circles.len(),
        residues = set.residues.len(),
        annotations = set.annotations.len(),
        tolerance = set.tolerance,
        "geometry built"
    );

    set
}

/// 导入选项
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub assembly: AssemblyConfig,
    /// 显式单位，覆盖文件头和启发式
    pub unit: Option<LengthUnit>,
    /// 非空时进入显式图层映射模式
    pub layer_map: LayerMap,
    pub keywords: KeywordGroups,
}

/// 导入结果摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub outline: bool,
    pub cutouts: usize,
    pub holes: usize,
    pub keepouts: usize,
    pub soldermask_openings: usize,
    pub ignored: usize,
    pub unclassified: usize,
    pub residues: usize,
    pub annotations: usize,
    pub diagnostics: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Outline:      {}", if self.outline { "found" } else { "not found" })?;
        writeln!(f, "  Cutouts:      {}", self.cutouts)?;
        writeln!(f, "  Holes:        {}", self.holes)?;
        if self.keepouts > 0 {
            writeln!(f, "  Keepouts:     {}", self.keepouts)?;
        }
        if self.soldermask_openings > 0 {
            writeln!(f, "  Mask:         {}", self.soldermask_openings)?;
        }
        writeln!(f, "  Unclassified: {}", self.unclassified)?;
        write!(f, "  Residues:     {}", self.residues)
    }
}

/// 导入结果
#[derive(Debug, Clone)]
pub struct Import {
    pub result: ClassifiedResult,
    pub annotations: Vec<Annotation>,
    pub tolerance: f64,
}

impl Import {
    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            outline: self.result.outline.is_some(),
            cutouts: self.result.cutouts.len(),
            holes: self.result.holes.len(),
            keepouts: self.result.keepouts.len(),
            soldermask_openings: self.result.soldermask_openings.len(),
            ignored: self.result.ignored.len(),
            unclassified: self.result.unclassified.len(),
            residues: self.result.residues.len(),
            annotations: self.annotations.len(),
            diagnostics: self.result.diagnostics.len(),
        }
    }

    /// 生成板子代码
    pub fn generate(&self, options: &CodegenOptions) -> String {
        codegen::generate(&self.result, options)
    }
}

/// 完整导入：校验、几何重建、单位检测、分类
pub fn import(inventory: &Inventory, options: &ImportOptions) -> Result<Import, ImportError> {
    if inventory.is_empty() {
        return Err(ImportError::NoEntities);
    }
    options.layer_map.validate(inventory)?;
    inventory.validate()?;

    let geometry = build_geometry(inventory, &options.assembly);
    let detection = detect_unit(options.unit, inventory.header_unit.as_ref(), geometry.extent());

    let classifier = Classifier::with_layer_map(options.layer_map.clone(), options.keywords.clone());
    let mut result = classifier.classify(geometry.loops, geometry.circles, geometry.residues, detection.info);

    let mut diagnostics = geometry.diagnostics;
    diagnostics.extend(detection.diagnostics);
    diagnostics.append(&mut result.diagnostics);
    result.diagnostics = diagnostics;

    let import = Import {
        result,
        annotations: geometry.annotations,
        tolerance: geometry.tolerance,
    };
    let summary = import.summary();
    info!(
        outline = summary.outline,
        cutouts = summary.cutouts,
        holes = summary.holes,
        unclassified = summary.unclassified,
        unit = %import.result.unit.unit,
        "import classified"
    );

    Ok(import)
}

/// 图层摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub entities: usize,
}

/// 文件检查报告
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub dxf_version: String,
    pub header_unit: Option<String>,
    pub layers: Vec<LayerSummary>,
    pub entity_counts: BTreeMap<String, usize>,
    pub total_entities: usize,
    pub bounding_box: Option<BoundingBox2>,
    pub unit: UnitInfo,
    pub tolerance: f64,
    pub loops: usize,
    pub circles: usize,
    pub residues: usize,
    pub annotations: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// 检查文件内容，不做分类
pub fn inspect(inventory: &Inventory, config: &AssemblyConfig, unit: Option<LengthUnit>) -> Inspection {
    let geometry = build_geometry(inventory, config);
    let detection = detect_unit(unit, inventory.header_unit.as_ref(), geometry.extent());
    let bbox = inventory.bounding_box();

    let mut diagnostics = geometry.diagnostics;
    diagnostics.extend(detection.diagnostics);

    Inspection {
        dxf_version: inventory.dxf_version.clone(),
        header_unit: inventory.header_unit.as_ref().map(ToString::to_string),
        layers: inventory
            .layers()
            .iter()
            .map(|(name, count)| LayerSummary {
                name: name.clone(),
                entities: *count,
            })
            .collect(),
        entity_counts: inventory.entity_counts(),
        total_entities: inventory.len(),
        bounding_box: (!bbox.is_empty()).then_some(bbox),
        unit: detection.info,
        tolerance: geometry.tolerance,
        loops: geometry.loops.len(),
        circles: geometry.circles.len(),
        residues: geometry.residues.len(),
        annotations: geometry.annotations.len(),
        diagnostics,
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version:  {}", self.dxf_version)?;
        writeln!(
            f,
            "Units:    {}",
            self.header_unit.as_deref().unwrap_or("not specified")
        )?;
        writeln!(f, "Detected: {} ({:?})", self.unit.unit, self.unit.source)?;
        writeln!(f)?;

        if let Some(bb) = &self.bounding_box {
            writeln!(
                f,
                "Bounding box: ({:.3}, {:.3}) to ({:.3}, {:.3})",
                bb.min.x, bb.min.y, bb.max.x, bb.max.y
            )?;
            writeln!(f, "Extent:       {:.3} x {:.3}", bb.width(), bb.height())?;
            writeln!(f)?;
        }

        writeln!(f, "Layers:")?;
        for layer in &self.layers {
            writeln!(f, "  {:30} {:5} entities", layer.name, layer.entities)?;
        }
        writeln!(f)?;

        writeln!(f, "Entity types:")?;
        for (kind, count) in &self.entity_counts {
            writeln!(f, "  {:20} {:5}", kind, count)?;
        }
        writeln!(f)?;

        writeln!(f, "Total entities: {}", self.total_entities)?;
        write!(
            f,
            "Closed loops: {}, circles: {}, open residues: {}",
            self.loops, self.circles, self.residues
        )?;

        for d in &self.diagnostics {
            write!(f, "\nwarning: {}", d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Circle, Line, Polyline};
    use crate::inventory::Hatch;
    use crate::math::Point2;
    use crate::units::{HeaderUnit, UnitSource};

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> EntityKind {
        EntityKind::Line(Line::new(Point2::new(x0, y0), Point2::new(x1, y1)))
    }

    fn rect_polyline(x0: f64, y0: f64, x1: f64, y1: f64) -> EntityKind {
        EntityKind::Polyline(Polyline::from_points(
            [
                Point2::new(x0, y0),
                Point2::new(x1, y0),
                Point2::new(x1, y1),
                Point2::new(x0, y1),
            ],
            true,
        ))
    }

    #[test]
    fn test_build_geometry_per_layer() {
        let mut inv = Inventory::new("R2018", None);
        // 同一矩形的四条边分散在两个图层，各自都无法闭合
        inv.push("A", "LINE", line(0.0, 0.0, 10.0, 0.0));
        inv.push("B", "LINE", line(10.0, 0.0, 10.0, 10.0));
        inv.push("A", "LINE", line(10.0, 10.0, 0.0, 10.0));
        inv.push("B", "LINE", line(0.0, 10.0, 0.0, 0.0));
        inv.push("C", "LWPOLYLINE", rect_polyline(20.0, 0.0, 30.0, 10.0));
        inv.push("C", "CIRCLE", EntityKind::Circle(Circle::new(Point2::new(25.0, 5.0), 1.0)));

        let set = build_geometry(&inv, &AssemblyConfig::default());
        assert_eq!(set.loops.len(), 1);
        assert_eq!(set.loops[0].layer(), "C");
        assert_eq!(set.residues.len(), 4);
        assert_eq!(set.circles.len(), 1);
        assert!((set.extent() - 30.0).abs() < 1e-9);
        assert!((set.tolerance - 30.0e-6).abs() < 1e-12);
    }

    #[test]
    fn test_open_polyline_joins_lines() {
        let mut inv = Inventory::new("R2018", None);
        inv.push(
            "Edge",
            "LWPOLYLINE",
            EntityKind::Polyline(Polyline::from_points(
                [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(10.0, 10.0)],
                false,
            )),
        );
        inv.push("Edge", "LINE", line(10.0, 10.0, 0.0, 10.0));
        inv.push("Edge", "LINE", line(0.0, 0.0, 0.0, 10.0));

        let set = build_geometry(&inv, &AssemblyConfig::default());
        assert_eq!(set.loops.len(), 1);
        assert!(set.residues.is_empty());
        assert!((set.loops[0].abs_area() - 100.0).abs() < 1e-9);
        let mut sources = set.loops[0].sources().to_vec();
        sources.sort_unstable();
        sources.dedup();
        assert_eq!(sources, vec![0, 1, 2]);
    }

    #[test]
    fn test_hatch_is_annotation() {
        let mut inv = Inventory::new("R2018", None);
        let boundary = Polyline::from_points(
            [Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), Point2::new(5.0, 5.0)],
            true,
        );
        inv.push(
            "Fill",
            "HATCH",
            EntityKind::Hatch(Hatch {
                boundaries: vec![boundary.explode()],
                solid: true,
            }),
        );
        let set = build_geometry(&inv, &AssemblyConfig::default());
        assert!(set.loops.is_empty());
        match &set.annotations[..] {
            [Annotation::Hatch { loops, solid, .. }] => {
                assert!(*solid);
                assert_eq!(loops.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_errors() {
        let inv = Inventory::new("R2018", None);
        assert_eq!(
            import(&inv, &ImportOptions::default()).unwrap_err(),
            ImportError::NoEntities
        );

        let mut inv = Inventory::new("R2018", None);
        inv.push("Edge", "LWPOLYLINE", rect_polyline(0.0, 0.0, 10.0, 10.0));
        let options = ImportOptions {
            layer_map: LayerMap::from_entries(["Outline=outline"]).unwrap(),
            ..Default::default()
        };
        match import(&inv, &options) {
            Err(ImportError::UnknownLayer { layer, available }) => {
                assert_eq!(layer, "Outline");
                assert_eq!(available, vec!["Edge".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_merges_diagnostics() {
        let mut inv = Inventory::new("R2018", Some(HeaderUnit::Unitless));
        inv.push("Edge", "LWPOLYLINE", rect_polyline(0.0, 0.0, 100.0, 50.0));
        inv.push("0", "LINE", line(200.0, 0.0, 210.0, 0.0));

        let import = import(&inv, &ImportOptions::default()).unwrap();
        let kinds: Vec<_> = import.result.diagnostics.iter().map(Diagnostic::kind).collect();
        assert_eq!(kinds, vec!["residue", "unit_header"]);
        assert_eq!(import.result.unit.source, UnitSource::Heuristic);
        let summary = import.summary();
        assert!(summary.outline);
        assert_eq!(summary.residues, 1);
    }

    #[test]
    fn test_inspect() {
        let mut inv = Inventory::new("AC1015", Some(HeaderUnit::Millimeters));
        inv.push("Edge", "LWPOLYLINE", rect_polyline(0.0, 0.0, 100.0, 50.0));
        inv.push("Holes", "CIRCLE", EntityKind::Circle(Circle::new(Point2::new(50.0, 25.0), 1.5)));
        inv.push("Edge", "SPLINE", EntityKind::Unsupported);

        let report = inspect(&inv, &AssemblyConfig::default(), None);
        assert_eq!(report.total_entities, 3);
        assert_eq!(report.loops, 1);
        assert_eq!(report.circles, 1);
        assert_eq!(report.layers[0], LayerSummary { name: "Edge".to_string(), entities: 2 });
        assert_eq!(report.unit.unit, LengthUnit::Millimeter);
        assert_eq!(report.unit.source, UnitSource::Header);

        let text = report.to_string();
        assert!(text.contains("Units:    mm"));
        assert!(text.contains("Extent:       100.000 x 50.000"));
        assert!(text.contains("Total entities: 3"));
    }
}
