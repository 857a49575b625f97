//! DXF文件读取
//!
//! 把 `dxf` crate 解析出的图纸转换为实体清单。HATCH 由 [`crate::dxf_raw`] 补充。

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::dxf_raw::{parse_hatches, DxfRawParser};
use crate::error::FileError;
use dxf::entities::EntityType;
use dxf::enums::Units;
use pcbdxf_core::geometry::{Arc, Circle, Line, Polyline, PolylineVertex};
use pcbdxf_core::inventory::{EntityKind, Inventory, TextNote};
use pcbdxf_core::math::Point2;
use pcbdxf_core::units::HeaderUnit;
use tracing::{debug, info, warn};

/// 从DXF文件读取实体清单
pub fn load_inventory(path: &Path) -> Result<Inventory, FileError> {
    let bytes = fs::read(path)?;
    let inventory = load_bytes(&bytes)?;
    info!(
        path = %path.display(),
        entities = inventory.len(),
        layers = inventory.layers().len(),
        "loaded DXF"
    );
    Ok(inventory)
}

/// 从任意读取器读取实体清单
pub fn load_inventory_from_reader<R: Read>(mut reader: R) -> Result<Inventory, FileError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    load_bytes(&bytes)
}

fn load_bytes(bytes: &[u8]) -> Result<Inventory, FileError> {
    let drawing = dxf::Drawing::load(&mut Cursor::new(bytes)).map_err(|e| FileError::Dxf(e.to_string()))?;

    let version = format!("{:?}", drawing.header.version);
    let header_unit = header_unit(&drawing.header.default_drawing_units);
    debug!(%version, header_unit = ?header_unit, "DXF header");

    let mut inventory = Inventory::new(version, header_unit);

    for entity in drawing.entities() {
        let (dxf_type, kind) = convert_dxf_entity(&entity.specific);
        inventory.push(entity.common.layer.clone(), dxf_type, kind);
    }

    append_hatches(bytes, &mut inventory);

    Ok(inventory)
}

/// `$INSUNITS` 映射；0 视为未设置
fn header_unit(units: &Units) -> Option<HeaderUnit> {
    match units {
        Units::Unitless => None,
        Units::Millimeters => Some(HeaderUnit::Millimeters),
        Units::Inches => Some(HeaderUnit::Inches),
        Units::Mils => Some(HeaderUnit::Mils),
        other => Some(HeaderUnit::Other(format!("{:?}", other))),
    }
}

/// 将DXF实体转换为清单条目，返回 (DXF 类型名, 内容)
fn convert_dxf_entity(specific: &EntityType) -> (String, EntityKind) {
    match specific {
        EntityType::Line(line) => {
            let start = Point2::new(line.p1.x, line.p1.y);
            let end = Point2::new(line.p2.x, line.p2.y);
            ("LINE".into(), EntityKind::Line(Line::new(start, end)))
        }

        EntityType::Circle(circle) => {
            let center = Point2::new(circle.center.x, circle.center.y);
            ("CIRCLE".into(), EntityKind::Circle(Circle::new(center, circle.radius)))
        }

        EntityType::Arc(arc) => {
            let center = Point2::new(arc.center.x, arc.center.y);
            let start_angle = arc.start_angle.to_radians();
            let end_angle = arc.end_angle.to_radians();
            // DXF 圆弧总是逆时针
            let arc = Arc::new(center, arc.radius, start_angle, end_angle, true);
            ("ARC".into(), EntityKind::Arc(arc))
        }

        EntityType::LwPolyline(lwpoly) => {
            let vertices: Vec<PolylineVertex> = lwpoly
                .vertices
                .iter()
                .map(|v| PolylineVertex::with_bulge(Point2::new(v.x, v.y), v.bulge))
                .collect();

            let polyline = Polyline::new(vertices, lwpoly.is_closed());
            ("LWPOLYLINE".into(), EntityKind::Polyline(polyline))
        }

        EntityType::Polyline(poly) => {
            let vertices: Vec<PolylineVertex> = poly
                .vertices()
                .map(|v| PolylineVertex::with_bulge(Point2::new(v.location.x, v.location.y), v.bulge))
                .collect();

            let polyline = Polyline::new(vertices, poly.is_closed());
            ("POLYLINE".into(), EntityKind::Polyline(polyline))
        }

        EntityType::Text(text) => {
            let note = TextNote {
                content: text.value.clone(),
                position: Point2::new(text.location.x, text.location.y),
                height: text.text_height,
                rotation: text.rotation.to_radians(),
            };
            ("TEXT".into(), EntityKind::Text(note))
        }

        EntityType::MText(mtext) => {
            // 只处理段落换行，其余格式代码原样保留
            let note = TextNote {
                content: mtext.text.replace("\\P", "\n"),
                position: Point2::new(mtext.insertion_point.x, mtext.insertion_point.y),
                height: mtext.initial_text_height,
                rotation: mtext.rotation_angle.to_radians(),
            };
            ("MTEXT".into(), EntityKind::Text(note))
        }

        other => (unsupported_type_name(other), EntityKind::Unsupported),
    }
}

/// 由变体名得到类型名，例如 `Spline(..)` → `SPLINE`
fn unsupported_type_name(specific: &EntityType) -> String {
    let debug = format!("{:?}", specific);
    let name = debug.split(['(', ' ', '{']).next().unwrap_or_default();
    if name.is_empty() {
        "UNKNOWN".to_string()
    } else {
        name.to_uppercase()
    }
}

/// 补充读取 HATCH；失败时只告警
fn append_hatches(bytes: &[u8], inventory: &mut Inventory) {
    if DxfRawParser::is_binary(bytes) {
        warn!("binary DXF: HATCH entities are not read");
        return;
    }

    let mut parser = match DxfRawParser::parse(Cursor::new(bytes)) {
        Ok(parser) => parser,
        Err(e) => {
            warn!(error = %e, "raw DXF pass failed, HATCH entities skipped");
            return;
        }
    };

    for raw in parse_hatches(&mut parser) {
        inventory.push(raw.layer, "HATCH", EntityKind::Hatch(raw.hatch));
    }
}
