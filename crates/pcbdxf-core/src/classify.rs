//! 形状分类
//!
//! 把闭合环和圆分配为板框 (outline)、挖槽 (cutout)、孔 (hole)、禁布区 (keepout)、
//! 阻焊开窗 (soldermask) 或忽略。禁布区和阻焊开窗只随结果报告，不进入生成代码。
//! 分类由有序规则表驱动，每个候选形状由第一条命中的规则决定角色：
//!
//! - 显式图层映射模式：`[LayerMap]`，完全不使用启发式
//! - 启发式模式：`[Keyword, Containment]`；圆只按孔关键字匹配，其余交给包含规则
//!
//! 无论哪种模式，最多产生一个板框；多余的板框候选按面积降级为挖槽。

use crate::diagnostic::Diagnostic;
use crate::error::ImportError;
use crate::geometry::{CircleShape, Feature, Loop, Path};
use crate::inventory::Inventory;
use crate::units::UnitInfo;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// 形状角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Outline,
    Cutout,
    Hole,
    Keepout,
    Soldermask,
    /// 注释层上的形状，不进入生成代码
    Ignore,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Outline => "outline",
            Role::Cutout => "cutout",
            Role::Hole => "hole",
            Role::Keepout => "keepout",
            Role::Soldermask => "soldermask",
            Role::Ignore => "ignore",
        })
    }
}

impl FromStr for Role {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outline" => Ok(Role::Outline),
            "cutout" => Ok(Role::Cutout),
            "hole" => Ok(Role::Hole),
            "keepout" => Ok(Role::Keepout),
            "soldermask" => Ok(Role::Soldermask),
            "ignore" => Ok(Role::Ignore),
            _ => Err(ImportError::InvalidRole(s.to_string())),
        }
    }
}

/// 显式图层映射：图层名 -> 角色
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMap(IndexMap<String, Role>);

impl LayerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析 `LAYER=ROLE` 形式的条目
    pub fn parse_entry(entry: &str) -> Result<(String, Role), ImportError> {
        let (layer, role) = entry
            .split_once('=')
            .ok_or_else(|| ImportError::InvalidLayerMapEntry(entry.to_string()))?;
        let layer = layer.trim();
        if layer.is_empty() {
            return Err(ImportError::InvalidLayerMapEntry(entry.to_string()));
        }
        Ok((layer.to_string(), role.parse()?))
    }

    pub fn from_entries<I, S>(entries: I) -> Result<Self, ImportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for entry in entries {
            let (layer, role) = Self::parse_entry(entry.as_ref())?;
            map.insert(layer, role);
        }
        Ok(map)
    }

    /// 插入映射，同名图层后者覆盖前者
    pub fn insert(&mut self, layer: impl Into<String>, role: Role) {
        self.0.insert(layer.into(), role);
    }

    pub fn get(&self, layer: &str) -> Option<Role> {
        self.0.get(layer).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Role)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 映射中的图层必须都存在于清单中
    pub fn validate(&self, inventory: &Inventory) -> Result<(), ImportError> {
        for layer in self.0.keys() {
            if !inventory.has_layer(layer) {
                return Err(ImportError::UnknownLayer {
                    layer: layer.clone(),
                    available: inventory.layers().keys().cloned().collect(),
                });
            }
        }
        Ok(())
    }
}

/// 图层名关键字组（大小写不敏感的子串匹配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordGroups {
    pub outline: Vec<String>,
    pub cutout: Vec<String>,
    pub hole: Vec<String>,
    pub keepout: Vec<String>,
    pub soldermask: Vec<String>,
    pub annotation: Vec<String>,
}

impl Default for KeywordGroups {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            outline: words(&["outline", "board", "boundary", "profile", "edge", "border"]),
            cutout: words(&["cutout", "route", "rout", "slot"]),
            hole: words(&["hole", "drill", "mount"]),
            keepout: words(&["keepout", "keep-out", "keep_out", "restrict"]),
            soldermask: words(&["mask", "soldermask", "solder"]),
            annotation: words(&["dim", "dimension", "note", "text", "anno"]),
        }
    }
}

impl KeywordGroups {
    /// 按 outline、cutout、hole、keepout、soldermask、annotation 的顺序匹配图层名
    ///
    /// 注释组映射为 [`Role::Ignore`]。
    pub fn match_layer(&self, layer: &str) -> Option<Role> {
        let lower = layer.to_lowercase();
        let hit = |group: &[String]| group.iter().any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()));

        if hit(&self.outline) {
            Some(Role::Outline)
        } else if hit(&self.cutout) {
            Some(Role::Cutout)
        } else if hit(&self.hole) {
            Some(Role::Hole)
        } else if hit(&self.keepout) {
            Some(Role::Keepout)
        } else if hit(&self.soldermask) {
            Some(Role::Soldermask)
        } else if hit(&self.annotation) {
            Some(Role::Ignore)
        } else {
            None
        }
    }
}

/// 分类规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// 显式图层映射
    LayerMap,
    /// 图层名关键字
    Keyword,
    /// 几何包含关系
    Containment,
}

/// 分类结果
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedResult {
    pub outline: Option<Loop>,
    pub cutouts: Vec<Loop>,
    /// 圆孔或槽孔（闭合环）
    pub holes: Vec<Feature>,
    pub keepouts: Vec<Feature>,
    pub soldermask_openings: Vec<Feature>,
    /// 注释层上被忽略的形状
    pub ignored: Vec<Feature>,
    pub unclassified: Vec<Feature>,
    pub residues: Vec<Path>,
    pub unit: UnitInfo,
    /// 每个角色贡献形状的图层
    pub layers: BTreeMap<Role, BTreeSet<String>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ClassifiedResult {
    pub fn is_empty(&self) -> bool {
        self.outline.is_none() && self.cutouts.is_empty() && self.holes.is_empty()
    }
}

/// 分类器
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    layer_map: Option<LayerMap>,
    keywords: KeywordGroups,
}

/// 带发现顺序的候选形状
struct Candidate {
    order: usize,
    feature: Feature,
}

/// 分类过程中的中间状态，每个桶保存 (发现顺序, 形状)
#[derive(Default)]
struct Buckets {
    outlines: Vec<(usize, Loop)>,
    cutouts: Vec<(usize, Loop)>,
    holes: Vec<(usize, Feature)>,
    keepouts: Vec<(usize, Feature)>,
    soldermask: Vec<(usize, Feature)>,
    ignored: Vec<(usize, Feature)>,
    unclassified: Vec<(usize, Feature, String)>,
    diagnostics: Vec<Diagnostic>,
}

impl Buckets {
    fn assign(&mut self, order: usize, feature: Feature, role: Role) {
        match role {
            Role::Outline => self.outlines.push((order, into_loop(feature))),
            Role::Cutout => self.cutouts.push((order, into_loop(feature))),
            Role::Hole => self.holes.push((order, feature)),
            Role::Keepout => self.keepouts.push((order, feature)),
            Role::Soldermask => self.soldermask.push((order, feature)),
            Role::Ignore => self.ignored.push((order, feature)),
        }
    }

    /// 保留面积最大的板框候选，其余降级为挖槽
    fn resolve_outlines(&mut self) {
        if self.outlines.len() <= 1 {
            return;
        }
        let layers = self
            .outlines
            .iter()
            .map(|(_, l)| l.layer().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.diagnostics.push(Diagnostic::MultipleOutlines {
            count: self.outlines.len(),
            layers,
        });

        let best = largest(&self.outlines);
        let mut candidates = std::mem::take(&mut self.outlines);
        let keep = candidates.remove(best);
        self.cutouts.extend(candidates);
        self.outlines.push(keep);
    }

    fn outline(&self) -> Option<&Loop> {
        self.outlines.first().map(|(_, l)| l)
    }
}

/// 面积最大者的下标；面积相同时取发现顺序靠前者
fn largest(loops: &[(usize, Loop)]) -> usize {
    let mut best = 0;
    for (i, (order, l)) in loops.iter().enumerate() {
        let (best_order, best_loop) = &loops[best];
        if l.abs_area() > best_loop.abs_area() || (l.abs_area() == best_loop.abs_area() && order < best_order) {
            best = i;
        }
    }
    best
}

fn into_loop(feature: Feature) -> Loop {
    match feature {
        Feature::Loop(l) => l,
        Feature::Circle(c) => c.to_loop(),
    }
}

impl Classifier {
    /// 启发式分类器
    pub fn new(keywords: KeywordGroups) -> Self {
        Self {
            layer_map: None,
            keywords,
        }
    }

    /// 显式图层映射分类器；空映射退化为启发式
    pub fn with_layer_map(layer_map: LayerMap, keywords: KeywordGroups) -> Self {
        Self {
            layer_map: (!layer_map.is_empty()).then_some(layer_map),
            keywords,
        }
    }

    pub fn layer_map(&self) -> Option<&LayerMap> {
        self.layer_map.as_ref()
    }

    /// 当前模式下按顺序生效的规则
    pub fn rules(&self) -> &'static [Rule] {
        if self.layer_map.is_some() {
            &[Rule::LayerMap]
        } else {
            &[Rule::Keyword, Rule::Containment]
        }
    }

    /// 分类闭合环与圆
    ///
    /// 候选顺序为 `loops` 在前、`circles` 在后，输出各列表保持该顺序。
    pub fn classify(
        &self,
        loops: Vec<Loop>,
        circles: Vec<CircleShape>,
        residues: Vec<Path>,
        unit: UnitInfo,
    ) -> ClassifiedResult {
        let mut pending: Vec<Candidate> = loops
            .into_iter()
            .map(Feature::Loop)
            .chain(circles.into_iter().map(Feature::Circle))
            .enumerate()
            .map(|(order, feature)| Candidate { order, feature })
            .collect();

        let mut buckets = Buckets::default();
        for rule in self.rules() {
            let before = pending.len();
            pending = match rule {
                Rule::LayerMap => self.apply_layer_map(pending, &mut buckets),
                Rule::Keyword => self.apply_keywords(pending, &mut buckets),
                Rule::Containment => apply_containment(pending, &mut buckets),
            };
            buckets.resolve_outlines();
            debug!(?rule, matched = before - pending.len(), remaining = pending.len(), "classification rule applied");
        }

        let reason = if self.layer_map.is_some() {
            "layer not in layer map"
        } else {
            "no outline to test containment against"
        };
        for c in pending {
            buckets.unclassified.push((c.order, c.feature, reason.to_string()));
        }

        finish(buckets, residues, unit)
    }

    fn apply_layer_map(&self, pending: Vec<Candidate>, buckets: &mut Buckets) -> Vec<Candidate> {
        let Some(map) = &self.layer_map else {
            return pending;
        };
        let mut rest = Vec::new();
        for c in pending {
            match map.get(c.feature.layer()) {
                Some(role) => buckets.assign(c.order, c.feature, role),
                None => rest.push(c),
            }
        }
        rest
    }

    fn apply_keywords(&self, pending: Vec<Candidate>, buckets: &mut Buckets) -> Vec<Candidate> {
        let mut rest = Vec::new();
        for c in pending {
            let role = self.keywords.match_layer(c.feature.layer());
            match (&c.feature, role) {
                // 圆只认孔关键字，板框层上的圆交给包含规则
                (Feature::Circle(_), Some(Role::Hole)) => buckets.assign(c.order, c.feature, Role::Hole),
                (Feature::Circle(_), _) | (_, None) => rest.push(c),
                (Feature::Loop(_), Some(role)) => buckets.assign(c.order, c.feature, role),
            }
        }
        rest
    }
}

/// 包含关系兜底
///
/// 若还没有板框，面积最大的闭合环成为板框。随后圆心在板框内的圆成为孔，
/// 包围盒严格位于板框包围盒内、面积更小且包围盒中心在板框内的环成为挖槽。
fn apply_containment(mut pending: Vec<Candidate>, buckets: &mut Buckets) -> Vec<Candidate> {
    if buckets.outline().is_none() {
        let loops: Vec<(usize, usize, f64)> = pending
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match &c.feature {
                Feature::Loop(l) => Some((i, c.order, l.abs_area())),
                Feature::Circle(_) => None,
            })
            .collect();
        let best = loops
            .iter()
            .copied()
            .reduce(|best, x| if x.2 > best.2 || (x.2 == best.2 && x.1 < best.1) { x } else { best });
        if let Some((i, order, _)) = best {
            let c = pending.remove(i);
            buckets.assign(order, c.feature, Role::Outline);
        }
    }

    let Some(outline) = buckets.outline().cloned() else {
        return pending;
    };
    let outline_bbox = outline.bounding_box();

    for c in pending {
        match &c.feature {
            Feature::Circle(shape) => {
                if outline.contains_point(&shape.circle.center) {
                    buckets.assign(c.order, c.feature, Role::Hole);
                } else {
                    buckets
                        .unclassified
                        .push((c.order, c.feature, "center outside outline".to_string()));
                }
            }
            Feature::Loop(l) => {
                let bbox = l.bounding_box();
                if outline_bbox.strictly_contains(&bbox, 0.0)
                    && l.abs_area() < outline.abs_area()
                    && outline.contains_point(&bbox.center())
                {
                    buckets.assign(c.order, c.feature, Role::Cutout);
                } else {
                    buckets
                        .unclassified
                        .push((c.order, c.feature, "not inside outline".to_string()));
                }
            }
        }
    }
    Vec::new()
}

fn finish(mut buckets: Buckets, residues: Vec<Path>, unit: UnitInfo) -> ClassifiedResult {
    buckets.cutouts.sort_by_key(|(order, _)| *order);
    buckets.holes.sort_by_key(|(order, _)| *order);
    buckets.keepouts.sort_by_key(|(order, _)| *order);
    buckets.soldermask.sort_by_key(|(order, _)| *order);
    buckets.ignored.sort_by_key(|(order, _)| *order);
    buckets.unclassified.sort_by_key(|(order, _, _)| *order);

    let mut layers: BTreeMap<Role, BTreeSet<String>> = BTreeMap::new();
    let mut record = |role: Role, layer: &str| {
        layers.entry(role).or_default().insert(layer.to_string());
    };
    for (_, l) in &buckets.outlines {
        record(Role::Outline, l.layer());
    }
    for (_, l) in &buckets.cutouts {
        record(Role::Cutout, l.layer());
    }
    for (_, f) in &buckets.holes {
        record(Role::Hole, f.layer());
    }
    for (_, f) in &buckets.keepouts {
        record(Role::Keepout, f.layer());
    }
    for (_, f) in &buckets.soldermask {
        record(Role::Soldermask, f.layer());
    }
    for (_, f) in &buckets.ignored {
        record(Role::Ignore, f.layer());
    }

    let mut diagnostics = buckets.diagnostics;
    for (_, f, reason) in &buckets.unclassified {
        diagnostics.push(Diagnostic::Unclassified {
            layer: f.layer().to_string(),
            sources: f.sources(),
            reason: reason.clone(),
        });
    }
    for d in &diagnostics {
        warn!(kind = d.kind(), "{}", d);
    }

    ClassifiedResult {
        outline: buckets.outlines.pop().map(|(_, l)| l),
        cutouts: buckets.cutouts.into_iter().map(|(_, l)| l).collect(),
        holes: buckets.holes.into_iter().map(|(_, f)| f).collect(),
        keepouts: buckets.keepouts.into_iter().map(|(_, f)| f).collect(),
        soldermask_openings: buckets.soldermask.into_iter().map(|(_, f)| f).collect(),
        ignored: buckets.ignored.into_iter().map(|(_, f)| f).collect(),
        unclassified: buckets.unclassified.into_iter().map(|(_, f, _)| f).collect(),
        residues,
        unit,
        layers,
        diagnostics,
    }
}
