//! 几何图元定义
//!
//! 支持的基本图元：
//! - 线段 (Line)
//! - 圆弧 (Arc)，带方向标志
//! - 圆 (Circle)
//! - 多段线 (Polyline)，顶点带凸度 (bulge)
//! - 路径 (Path) 与闭合环 (Loop)
//!
//! 所有坐标均为原始文件单位，单位检测完成前不附带任何单位。

use crate::math::{normalize_angle, BoundingBox2, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// 圆心角小于此值的凸度段视为直线，须大于 `Arc::sweep` 的整圆判定阈值
const MIN_BULGE_SWEEP: f64 = 1e-8;

/// 圆弧离散化的最大步长（5°），用于点包含测试
const FLATTEN_STEP: f64 = 5.0 * PI / 180.0;

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

impl Line {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 计算线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 单位方向向量；零长度线段返回零向量
    pub fn direction(&self) -> Vector2 {
        let d = self.end - self.start;
        let len = d.norm();
        if len < EPSILON {
            Vector2::zeros()
        } else {
            d / len
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points([self.start, self.end])
    }
}

/// 圆弧
///
/// 角度为弧度。`ccw` 为真时从 `start_angle` 逆时针扫到 `end_angle`，
/// 否则顺时针。起止角度相同表示整圆。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point2,
    pub radius: f64,
    /// 起始角度（弧度）
    pub start_angle: f64,
    /// 终止角度（弧度）
    pub end_angle: f64,
    /// 扫掠方向
    pub ccw: bool,
}

impl Arc {
    pub fn new(center: Point2, radius: f64, start_angle: f64, end_angle: f64, ccw: bool) -> Self {
        Self {
            center,
            radius,
            start_angle,
            end_angle,
            ccw,
        }
    }

    /// 带符号的扫掠角：逆时针为正，顺时针为负
    pub fn sweep(&self) -> f64 {
        let raw = if self.ccw {
            self.end_angle - self.start_angle
        } else {
            self.start_angle - self.end_angle
        };
        let mut sweep = normalize_angle(raw);
        if sweep < EPSILON {
            sweep = TAU;
        }
        if self.ccw {
            sweep
        } else {
            -sweep
        }
    }

    pub fn length(&self) -> f64 {
        self.sweep().abs() * self.radius
    }

    pub fn point_at_angle(&self, angle: f64) -> Point2 {
        Point2::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }

    pub fn start_point(&self) -> Point2 {
        self.point_at_angle(self.start_angle)
    }

    pub fn end_point(&self) -> Point2 {
        self.point_at_angle(self.end_angle)
    }

    /// 沿扫掠方向的切向量
    fn tangent_at(&self, angle: f64) -> Vector2 {
        if self.ccw {
            Vector2::new(-angle.sin(), angle.cos())
        } else {
            Vector2::new(angle.sin(), -angle.cos())
        }
    }

    /// 检查角度是否在弧的扫掠范围内
    pub fn contains_angle(&self, angle: f64) -> bool {
        let offset = if self.ccw {
            normalize_angle(angle - self.start_angle)
        } else {
            normalize_angle(self.start_angle - angle)
        };
        offset <= self.sweep().abs() + EPSILON
    }

    pub fn reversed(&self) -> Self {
        Self {
            center: self.center,
            radius: self.radius,
            start_angle: self.end_angle,
            end_angle: self.start_angle,
            ccw: !self.ccw,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        let mut bbox = BoundingBox2::from_points([self.start_point(), self.end_point()]);

        // 检查象限点
        for angle in [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2] {
            if self.contains_angle(angle) {
                bbox.expand_to_include(&self.point_at_angle(angle));
            }
        }

        bbox
    }

    /// 按固定步长离散化（包含起点和终点）
    pub fn flatten(&self) -> Vec<Point2> {
        let sweep = self.sweep();
        let steps = ((sweep.abs() / FLATTEN_STEP).ceil() as usize).max(8);
        (0..=steps)
            .map(|i| self.point_at_angle(self.start_angle + sweep * i as f64 / steps as f64))
            .collect()
    }
}

/// 圆
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// 计算面积
    pub fn area(&self) -> f64 {
        PI * self.radius * self.radius
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::new(
            Point2::new(self.center.x - self.radius, self.center.y - self.radius),
            Point2::new(self.center.x + self.radius, self.center.y + self.radius),
        )
    }

    /// 拆成两段逆时针半圆弧，用于圆需要以闭合环身份出现的场合
    pub fn to_segments(&self) -> Vec<Segment> {
        vec![
            Segment::Arc(Arc::new(self.center, self.radius, 0.0, PI, true)),
            Segment::Arc(Arc::new(self.center, self.radius, PI, TAU, true)),
        ]
    }
}

/// 路径段：直线或圆弧
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Line(Line),
    Arc(Arc),
}

impl Segment {
    pub fn start(&self) -> Point2 {
        match self {
            Segment::Line(l) => l.start,
            Segment::Arc(a) => a.start_point(),
        }
    }

    pub fn end(&self) -> Point2 {
        match self {
            Segment::Line(l) => l.end,
            Segment::Arc(a) => a.end_point(),
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Segment::Line(l) => l.length(),
            Segment::Arc(a) => a.length(),
        }
    }

    pub fn is_arc(&self) -> bool {
        matches!(self, Segment::Arc(_))
    }

    /// 反向（起点与终点互换，圆弧方向翻转）
    pub fn reversed(&self) -> Segment {
        match self {
            Segment::Line(l) => Segment::Line(Line::new(l.end, l.start)),
            Segment::Arc(a) => Segment::Arc(a.reversed()),
        }
    }

    /// 起点处沿行进方向的单位切向量
    pub fn start_tangent(&self) -> Vector2 {
        match self {
            Segment::Line(l) => l.direction(),
            Segment::Arc(a) => a.tangent_at(a.start_angle),
        }
    }

    /// 终点处沿行进方向的单位切向量
    pub fn end_tangent(&self) -> Vector2 {
        match self {
            Segment::Line(l) => l.direction(),
            Segment::Arc(a) => a.tangent_at(a.end_angle),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        match self {
            Segment::Line(l) => l.bounding_box(),
            Segment::Arc(a) => a.bounding_box(),
        }
    }

    /// 有向面积贡献：弦的鞋带项加上弓形面积
    pub fn area_term(&self) -> f64 {
        let (s, e) = (self.start(), self.end());
        let chord = (s.x * e.y - e.x * s.y) / 2.0;
        match self {
            Segment::Line(_) => chord,
            Segment::Arc(a) => {
                let phi = a.sweep();
                chord + a.radius * a.radius * (phi - phi.sin()) / 2.0
            }
        }
    }

    pub fn translated(&self, offset: Vector2) -> Segment {
        match self {
            Segment::Line(l) => Segment::Line(Line::new(l.start + offset, l.end + offset)),
            Segment::Arc(a) => Segment::Arc(Arc { center: a.center + offset, ..*a }),
        }
    }

    /// 以原点为中心缩放
    pub fn scaled(&self, factor: f64) -> Segment {
        match self {
            Segment::Line(l) => Segment::Line(Line::new(l.start * factor, l.end * factor)),
            Segment::Arc(a) => Segment::Arc(Arc {
                center: a.center * factor,
                radius: a.radius * factor,
                ..*a
            }),
        }
    }
}

/// 由多段线顶点对与凸度构造路径段
///
/// 凸度 = tan(圆心角/4)，正值为逆时针。圆心角近于零或弦长为零时返回直线。
pub fn arc_from_bulge(p1: Point2, p2: Point2, bulge: f64) -> Segment {
    let chord = p2 - p1;
    let c = chord.norm();

    if 4.0 * bulge.abs().atan() < MIN_BULGE_SWEEP || c < EPSILON {
        return Segment::Line(Line::new(p1, p2));
    }

    let radius = c * (1.0 + bulge * bulge) / (4.0 * bulge.abs());
    // 圆心到弦中点的有向距离（沿弦的左法线方向）
    let d = (c / 2.0) * (1.0 - bulge * bulge) / (2.0 * bulge);
    let normal = Vector2::new(-chord.y, chord.x) / c;
    let mid = Point2::new((p1.x + p2.x) / 2.0, (p1.y + p2.y) / 2.0);
    let center = mid + normal * d;

    let start_angle = (p1.y - center.y).atan2(p1.x - center.x);
    let end_angle = (p2.y - center.y).atan2(p2.x - center.x);

    Segment::Arc(Arc::new(center, radius, start_angle, end_angle, bulge > 0.0))
}

/// 多段线顶点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolylineVertex {
    pub point: Point2,
    /// 凸度（bulge）- 用于弧线段，0表示直线
    pub bulge: f64,
}

impl PolylineVertex {
    pub fn new(point: Point2) -> Self {
        Self { point, bulge: 0.0 }
    }

    pub fn with_bulge(point: Point2, bulge: f64) -> Self {
        Self { point, bulge }
    }
}

/// 多段线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub vertices: Vec<PolylineVertex>,
    /// 是否闭合
    pub closed: bool,
}

impl Polyline {
    pub fn new(vertices: Vec<PolylineVertex>, closed: bool) -> Self {
        Self { vertices, closed }
    }

    /// 从点列表创建（所有顶点都是直线连接）
    pub fn from_points(points: impl IntoIterator<Item = Point2>, closed: bool) -> Self {
        Self {
            vertices: points.into_iter().map(PolylineVertex::new).collect(),
            closed,
        }
    }

    /// 线段数量
    pub fn segment_count(&self) -> usize {
        if self.vertices.len() < 2 {
            return 0;
        }
        if self.closed {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// 爆炸为独立的线段/圆弧
    pub fn explode(&self) -> Vec<Segment> {
        (0..self.segment_count())
            .map(|i| {
                let v1 = &self.vertices[i];
                let v2 = &self.vertices[(i + 1) % self.vertices.len()];
                arc_from_bulge(v1.point, v2.point, v1.bulge)
            })
            .collect()
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        self.explode()
            .iter()
            .fold(BoundingBox2::from_points(self.vertices.iter().map(|v| v.point)), |acc, s| {
                acc.union(&s.bounding_box())
            })
    }
}

/// 有序路径段序列
///
/// 相邻段首尾相接（容差内）。`sources` 记录消耗的源实体序号。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<Segment>,
    /// 来源图层
    pub layer: String,
    /// 源实体序号
    pub sources: Vec<usize>,
}

impl Path {
    pub fn new(segments: Vec<Segment>, layer: impl Into<String>, sources: Vec<usize>) -> Self {
        Self {
            segments,
            layer: layer.into(),
            sources,
        }
    }

    pub fn start(&self) -> Option<Point2> {
        self.segments.first().map(Segment::start)
    }

    pub fn end(&self) -> Option<Point2> {
        self.segments.last().map(Segment::end)
    }

    pub fn length(&self) -> f64 {
        self.segments.iter().map(Segment::length).sum()
    }

    /// 首尾重合（容差内）且总长度非零
    pub fn is_closed(&self, tolerance: f64) -> bool {
        match (self.start(), self.end()) {
            (Some(s), Some(e)) => (e - s).norm() <= tolerance && self.length() > tolerance,
            _ => false,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        self.segments
            .iter()
            .fold(BoundingBox2::empty(), |acc, s| acc.union(&s.bounding_box()))
    }
}

/// 闭合环，附带包围盒和有向面积（逆时针为正）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    path: Path,
    bbox: BoundingBox2,
    area: f64,
}

impl Loop {
    /// 由已闭合的路径构造；闭合性由调用方保证
    pub fn from_path(path: Path) -> Self {
        let bbox = path.bounding_box();
        let area = path.segments.iter().map(Segment::area_term).sum();
        Self { path, bbox, area }
    }

    pub fn from_circle(circle: &Circle, layer: impl Into<String>, sources: Vec<usize>) -> Self {
        Self::from_path(Path::new(circle.to_segments(), layer, sources))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.path.segments
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layer(&self) -> &str {
        &self.path.layer
    }

    pub fn sources(&self) -> &[usize] {
        &self.path.sources
    }

    /// 有向面积
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn abs_area(&self) -> f64 {
        self.area.abs()
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        self.bbox
    }

    /// 顶点数（每段贡献一个起点）
    pub fn vertex_count(&self) -> usize {
        self.path.segments.len()
    }

    pub fn has_arcs(&self) -> bool {
        self.path.segments.iter().any(Segment::is_arc)
    }

    /// 离散化后的多边形顶点
    pub fn flatten(&self) -> Vec<Point2> {
        let mut points = Vec::new();
        for seg in &self.path.segments {
            match seg {
                Segment::Line(l) => points.push(l.start),
                Segment::Arc(a) => {
                    let mut pts = a.flatten();
                    pts.pop();
                    points.extend(pts);
                }
            }
        }
        points
    }

    /// 射线法点包含测试（+X 方向）
    pub fn contains_point(&self, point: &Point2) -> bool {
        if !self.bbox.contains(point) {
            return false;
        }
        let polygon = self.flatten();
        let n = polygon.len();
        let mut inside = false;
        for i in 0..n {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            if (a.y <= point.y && point.y < b.y) || (b.y <= point.y && point.y < a.y) {
                let t = (point.y - a.y) / (b.y - a.y);
                if a.x + t * (b.x - a.x) > point.x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    pub fn translated(&self, offset: Vector2) -> Loop {
        let segments = self.path.segments.iter().map(|s| s.translated(offset)).collect();
        Loop::from_path(Path::new(segments, self.path.layer.clone(), self.path.sources.clone()))
    }

    pub fn scaled(&self, factor: f64) -> Loop {
        let segments = self.path.segments.iter().map(|s| s.scaled(factor)).collect();
        Loop::from_path(Path::new(segments, self.path.layer.clone(), self.path.sources.clone()))
    }
}

/// 带图层和来源的圆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    pub circle: Circle,
    pub layer: String,
    /// 源实体序号
    pub source: usize,
}

impl CircleShape {
    pub fn new(circle: Circle, layer: impl Into<String>, source: usize) -> Self {
        Self {
            circle,
            layer: layer.into(),
            source,
        }
    }

    pub fn to_loop(&self) -> Loop {
        Loop::from_circle(&self.circle, self.layer.clone(), vec![self.source])
    }

    pub fn translated(&self, offset: Vector2) -> CircleShape {
        CircleShape {
            circle: Circle::new(self.circle.center + offset, self.circle.radius),
            ..self.clone()
        }
    }

    pub fn scaled(&self, factor: f64) -> CircleShape {
        CircleShape {
            circle: Circle::new(self.circle.center * factor, self.circle.radius * factor),
            ..self.clone()
        }
    }
}

/// 参与分类的形状：闭合环或圆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Feature {
    Loop(Loop),
    Circle(CircleShape),
}

impl Feature {
    pub fn layer(&self) -> &str {
        match self {
            Feature::Loop(l) => l.layer(),
            Feature::Circle(c) => &c.layer,
        }
    }

    pub fn sources(&self) -> Vec<usize> {
        match self {
            Feature::Loop(l) => l.sources().to_vec(),
            Feature::Circle(c) => vec![c.source],
        }
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        match self {
            Feature::Loop(l) => l.bounding_box(),
            Feature::Circle(c) => c.circle.bounding_box(),
        }
    }

    pub fn translated(&self, offset: Vector2) -> Feature {
        match self {
            Feature::Loop(l) => Feature::Loop(l.translated(offset)),
            Feature::Circle(c) => Feature::Circle(c.translated(offset)),
        }
    }

    pub fn scaled(&self, factor: f64) -> Feature {
        match self {
            Feature::Loop(l) => Feature::Loop(l.scaled(factor)),
            Feature::Circle(c) => Feature::Circle(c.scaled(factor)),
        }
    }
}
