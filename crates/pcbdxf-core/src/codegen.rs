//! JITX Python 代码生成
//!
//! 输入分类结果，先在几何层面完成单位换算与居中，再把形状写成文本。
//! 相同输入产生逐字节相同的输出。

use crate::classify::ClassifiedResult;
use crate::geometry::{Feature, Loop, Segment};
use crate::math::{normalize_angle, Vector2};
use crate::units::LengthUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 单行 Polygon 允许的最多顶点数
const INLINE_POLYGON_POINTS: usize = 6;

const INDENT: &str = "    ";

/// 代码生成选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    pub class_name: String,
    /// 写入文件头文档字符串的来源名
    pub module_name: Option<String>,
    pub output_unit: LengthUnit,
    /// 只输出 `board_shape` / `cutouts` 赋值
    pub snippet: bool,
    /// 把板框包围盒中心移到原点
    pub recenter: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            class_name: "ImportedBoard".to_string(),
            module_name: None,
            output_unit: LengthUnit::Millimeter,
            snippet: false,
            recenter: true,
        }
    }
}

/// 换算到输出单位并居中后的板子几何
#[derive(Debug, Clone, PartialEq)]
pub struct BoardShapes {
    pub outline: Option<Loop>,
    pub cutouts: Vec<Loop>,
    pub holes: Vec<Feature>,
    /// 施加的平移量（输出单位）
    pub offset: Vector2,
}

impl BoardShapes {
    /// 从分类结果构造：缩放到输出单位，按需居中
    pub fn prepare(result: &ClassifiedResult, options: &CodegenOptions) -> Self {
        let factor = result.unit.factor_to(options.output_unit);
        let outline = result.outline.as_ref().map(|l| l.scaled(factor));
        let cutouts: Vec<Loop> = result.cutouts.iter().map(|l| l.scaled(factor)).collect();
        let holes: Vec<Feature> = result.holes.iter().map(|f| f.scaled(factor)).collect();

        let offset = match (&outline, options.recenter) {
            (Some(o), true) => -o.bounding_box().center().coords,
            _ => Vector2::zeros(),
        };

        Self {
            outline: outline.map(|l| l.translated(offset)),
            cutouts: cutouts.iter().map(|l| l.translated(offset)).collect(),
            holes: holes.iter().map(|f| f.translated(offset)).collect(),
            offset,
        }
    }

    /// 用到的形状类型，按名称排序
    fn shape_imports(&self) -> BTreeSet<&'static str> {
        fn add_loop(l: &Loop, names: &mut BTreeSet<&'static str>) {
            if l.has_arcs() {
                names.insert("ArcPolyline");
                names.insert("Arc");
            } else {
                names.insert("Polygon");
            }
        }

        let mut names = BTreeSet::new();
        for l in self.outline.iter().chain(&self.cutouts) {
            add_loop(l, &mut names);
        }
        for f in &self.holes {
            match f {
                Feature::Loop(l) => add_loop(l, &mut names),
                Feature::Circle(_) => {
                    names.insert("Circle");
                }
            }
        }
        names
    }

    fn has_cutouts(&self) -> bool {
        !self.cutouts.is_empty() || !self.holes.is_empty()
    }

    /// `cutouts` 列表项：挖槽在前，孔在后
    fn cutout_expressions(&self, indent: usize) -> Vec<String> {
        self.cutouts
            .iter()
            .map(|l| loop_expression(l, indent))
            .chain(self.holes.iter().map(|f| feature_expression(f, indent)))
            .collect()
    }
}

/// 按行累积的源码写入器
#[derive(Debug, Default)]
struct CodeWriter {
    lines: Vec<String>,
}

impl CodeWriter {
    fn line(&mut self, indent: usize, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", INDENT.repeat(indent), text.as_ref()));
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    /// 以换行结尾的完整文本
    fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    fn write_cutouts(&mut self, shapes: &BoardShapes, indent: usize) {
        self.line(indent, "cutouts = [");
        for expr in shapes.cutout_expressions(indent + 1) {
            self.line(indent + 1, format!("{},", expr));
        }
        self.line(indent, "]");
    }
}

/// 生成代码
pub fn generate(result: &ClassifiedResult, options: &CodegenOptions) -> String {
    let shapes = BoardShapes::prepare(result, options);
    if options.snippet {
        generate_snippet(&shapes)
    } else {
        generate_board(&shapes, options)
    }
}

fn generate_board(shapes: &BoardShapes, options: &CodegenOptions) -> String {
    let mut w = CodeWriter::default();

    let source = options.module_name.as_deref().unwrap_or("DXF");
    w.line(0, format!("\"\"\"Board definition imported from {}.\"\"\"", source));
    w.blank();
    w.line(0, "from jitx.board import Board");
    let imports = shapes.shape_imports();
    if !imports.is_empty() {
        let names: Vec<&str> = imports.into_iter().collect();
        w.line(0, format!("from jitx.shapes.primitive import {}", names.join(", ")));
    }
    w.blank();
    w.blank();

    w.line(0, format!("class {}(Board):", options.class_name));
    match &shapes.outline {
        Some(outline) => w.line(1, format!("board_shape = {}", loop_expression(outline, 1))),
        None => w.line(1, "board_shape = None  # No outline detected in DXF"),
    }

    if shapes.has_cutouts() {
        w.blank();
        w.write_cutouts(shapes, 1);
    }

    w.finish()
}

fn generate_snippet(shapes: &BoardShapes) -> String {
    let mut w = CodeWriter::default();

    match &shapes.outline {
        Some(outline) => w.line(0, format!("board_shape = {}", loop_expression(outline, 0))),
        None => w.line(0, "# No outline detected in DXF"),
    }

    if shapes.has_cutouts() {
        w.blank();
        w.write_cutouts(shapes, 0);
    }

    w.finish()
}

/// 格式化坐标：4 位小数，去掉尾随零但至少保留一位小数
pub fn format_number(value: f64) -> String {
    if value.abs() < 1e-6 {
        return "0.0".to_string();
    }
    let fixed = format!("{:.4}", value);
    let trimmed = fixed.trim_end_matches('0');
    let s = if trimmed.ends_with('.') {
        format!("{}0", trimmed)
    } else {
        trimmed.to_string()
    };
    if s == "-0.0" {
        "0.0".to_string()
    } else {
        s
    }
}

fn point(x: f64, y: f64) -> String {
    format!("({}, {})", format_number(x), format_number(y))
}

fn feature_expression(feature: &Feature, indent: usize) -> String {
    match feature {
        Feature::Loop(l) => loop_expression(l, indent),
        Feature::Circle(c) => format!(
            "Circle(radius={}).at({}, {})",
            format_number(c.circle.radius),
            format_number(c.circle.center.x),
            format_number(c.circle.center.y)
        ),
    }
}

/// 闭合环的形状表达式；`indent` 是表达式所在行的缩进级别
fn loop_expression(l: &Loop, indent: usize) -> String {
    if l.has_arcs() {
        arc_polyline_expression(l, indent)
    } else {
        polygon_expression(l, indent)
    }
}

fn polygon_expression(l: &Loop, indent: usize) -> String {
    let points: Vec<String> = l
        .segments()
        .iter()
        .map(|s| {
            let p = s.start();
            point(p.x, p.y)
        })
        .collect();

    if points.len() <= INLINE_POLYGON_POINTS {
        return format!("Polygon([{}])", points.join(", "));
    }
    format!("Polygon([{}])", multiline(&points, indent))
}

/// 直线段写起点；圆弧写起点后跟 `Arc((cx, cy), r, start_deg, sweep_deg)`
fn arc_polyline_expression(l: &Loop, indent: usize) -> String {
    let mut elements = Vec::new();
    for seg in l.segments() {
        let start = seg.start();
        elements.push(point(start.x, start.y));
        if let Segment::Arc(a) = seg {
            elements.push(format!(
                "Arc({}, {}, {}, {})",
                point(a.center.x, a.center.y),
                format_number(a.radius),
                format_number(normalize_angle(a.start_angle).to_degrees()),
                format_number(a.sweep().to_degrees())
            ));
        }
    }
    format!("ArcPolyline([{}])", multiline(&elements, indent))
}

/// 每项一行，缩进比所在行深一级，末项后带逗号
fn multiline(items: &[String], indent: usize) -> String {
    let pad = INDENT.repeat(indent + 1);
    let mut out = String::from("\n");
    for item in items {
        out.push_str(&pad);
        out.push_str(item);
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(indent));
    out
}
