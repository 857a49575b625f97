//! 长度单位检测
//!
//! 决策顺序（先适用者胜出）：
//! 1. 调用方显式指定
//! 2. 文件头 `$INSUNITS`，仅接受毫米/英寸/密耳，且换算后范围不超过 5 m
//! 3. 范围启发式：最大边长 > 500 视为密耳，否则毫米
//!
//! 第 3 步假设机械零件为几十毫米或几英寸量级，不满足该假设的文件会被误判，
//! 这是已知局限，需要时请用显式单位覆盖。

use crate::diagnostic::Diagnostic;
use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// 范围超过此值（原始单位）判定为密耳
pub const MIL_EXTENT_THRESHOLD: f64 = 500.0;

/// 文件头单位换算后允许的最大板子范围（毫米）
pub const MAX_BOARD_EXTENT_MM: f64 = 5000.0;

/// 长度单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "mm")]
    Millimeter,
    #[serde(rename = "in")]
    Inch,
    #[serde(rename = "mil")]
    Mil,
}

impl LengthUnit {
    /// 换算到毫米的系数
    pub fn to_mm(&self) -> f64 {
        match self {
            LengthUnit::Millimeter => 1.0,
            LengthUnit::Inch => 25.4,
            LengthUnit::Mil => 0.0254,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            LengthUnit::Millimeter => "mm",
            LengthUnit::Inch => "in",
            LengthUnit::Mil => "mil",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for LengthUnit {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" => Ok(LengthUnit::Millimeter),
            "in" | "inch" | "inches" => Ok(LengthUnit::Inch),
            "mil" | "mils" => Ok(LengthUnit::Mil),
            _ => Err(ImportError::InvalidUnit(s.to_string())),
        }
    }
}

/// 文件头中的 `$INSUNITS` 值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderUnit {
    Unitless,
    Millimeters,
    Inches,
    Mils,
    /// 其他单位（英尺、米……），保存原始名称用于诊断
    Other(String),
}

impl HeaderUnit {
    /// 映射到支持的长度单位
    pub fn length_unit(&self) -> Option<LengthUnit> {
        match self {
            HeaderUnit::Millimeters => Some(LengthUnit::Millimeter),
            HeaderUnit::Inches => Some(LengthUnit::Inch),
            HeaderUnit::Mils => Some(LengthUnit::Mil),
            HeaderUnit::Unitless | HeaderUnit::Other(_) => None,
        }
    }
}

impl fmt::Display for HeaderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderUnit::Unitless => f.write_str("unitless"),
            HeaderUnit::Millimeters => f.write_str("mm"),
            HeaderUnit::Inches => f.write_str("in"),
            HeaderUnit::Mils => f.write_str("mil"),
            HeaderUnit::Other(name) => f.write_str(name),
        }
    }
}

/// 单位来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSource {
    Override,
    Header,
    Heuristic,
}

/// 检测结果：单位及原始坐标到毫米的换算系数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub unit: LengthUnit,
    pub source: UnitSource,
    pub scale_to_mm: f64,
}

impl UnitInfo {
    pub fn new(unit: LengthUnit, source: UnitSource) -> Self {
        Self {
            unit,
            source,
            scale_to_mm: unit.to_mm(),
        }
    }

    /// 原始坐标换算到 `output` 单位的系数
    pub fn factor_to(&self, output: LengthUnit) -> f64 {
        self.scale_to_mm / output.to_mm()
    }
}

/// 单位检测输出
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDetection {
    pub info: UnitInfo,
    pub diagnostics: Vec<Diagnostic>,
}

/// 检测文件单位
///
/// `extent` 为全部已拼接几何的最大边长（原始单位）。
pub fn detect_unit(
    override_unit: Option<LengthUnit>,
    header: Option<&HeaderUnit>,
    extent: f64,
) -> UnitDetection {
    let mut diagnostics = Vec::new();

    if let Some(unit) = override_unit {
        debug!(%unit, "unit from override");
        return UnitDetection {
            info: UnitInfo::new(unit, UnitSource::Override),
            diagnostics,
        };
    }

    if let Some(header) = header {
        match header.length_unit() {
            Some(unit) if extent * unit.to_mm() <= MAX_BOARD_EXTENT_MM => {
                debug!(%unit, "unit from header");
                return UnitDetection {
                    info: UnitInfo::new(unit, UnitSource::Header),
                    diagnostics,
                };
            }
            Some(unit) => diagnostics.push(Diagnostic::UnitHeader {
                header: header.to_string(),
                reason: format!(
                    "extent {:.3} {} exceeds {} mm",
                    extent, unit, MAX_BOARD_EXTENT_MM
                ),
            }),
            None => diagnostics.push(Diagnostic::UnitHeader {
                header: header.to_string(),
                reason: "no mm/in/mil mapping".to_string(),
            }),
        }
    }

    for d in &diagnostics {
        warn!(kind = d.kind(), "{}", d);
    }

    let unit = if extent > MIL_EXTENT_THRESHOLD {
        LengthUnit::Mil
    } else {
        LengthUnit::Millimeter
    };
    debug!(%unit, extent, "unit from extent heuristic");

    UnitDetection {
        info: UnitInfo::new(unit, UnitSource::Heuristic),
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_mil() {
        let d = detect_unit(None, None, 600.0);
        assert_eq!(d.info.unit, LengthUnit::Mil);
        assert_eq!(d.info.source, UnitSource::Heuristic);
        assert!((d.info.scale_to_mm - 0.0254).abs() < 1e-12);
    }

    #[test]
    fn test_heuristic_mm() {
        let d = detect_unit(None, None, 80.0);
        assert_eq!(d.info.unit, LengthUnit::Millimeter);
        assert!(d.diagnostics.is_empty());

        // 恰好 500 仍为毫米
        assert_eq!(detect_unit(None, None, 500.0).info.unit, LengthUnit::Millimeter);
        assert_eq!(detect_unit(None, None, 0.0).info.unit, LengthUnit::Millimeter);
    }

    #[test]
    fn test_override_wins() {
        let header = HeaderUnit::Millimeters;
        for extent in [0.0, 80.0, 600.0, 1e7] {
            let d = detect_unit(Some(LengthUnit::Inch), Some(&header), extent);
            assert_eq!(d.info.unit, LengthUnit::Inch);
            assert_eq!(d.info.source, UnitSource::Override);
        }
    }

    #[test]
    fn test_header_accepted() {
        let d = detect_unit(None, Some(&HeaderUnit::Inches), 4.0);
        assert_eq!(d.info.unit, LengthUnit::Inch);
        assert_eq!(d.info.source, UnitSource::Header);

        // 毫米头即使范围 > 500 也采用
        let d = detect_unit(None, Some(&HeaderUnit::Millimeters), 600.0);
        assert_eq!(d.info.unit, LengthUnit::Millimeter);
    }

    #[test]
    fn test_header_rejected_falls_through() {
        let d = detect_unit(None, Some(&HeaderUnit::Unitless), 600.0);
        assert_eq!(d.info.unit, LengthUnit::Mil);
        assert_eq!(d.info.source, UnitSource::Heuristic);
        assert_eq!(d.diagnostics.len(), 1);

        let d = detect_unit(None, Some(&HeaderUnit::Other("Meters".to_string())), 80.0);
        assert_eq!(d.info.unit, LengthUnit::Millimeter);
        assert!(matches!(&d.diagnostics[0], Diagnostic::UnitHeader { header, .. } if header == "Meters"));
    }

    #[test]
    fn test_header_out_of_range() {
        // 3000 英寸 = 76.2 m，显然不是 PCB
        let d = detect_unit(None, Some(&HeaderUnit::Inches), 3000.0);
        assert_eq!(d.info.unit, LengthUnit::Mil);
        assert_eq!(d.info.source, UnitSource::Heuristic);
        assert_eq!(d.diagnostics.len(), 1);
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!("mm".parse::<LengthUnit>().unwrap(), LengthUnit::Millimeter);
        assert_eq!("IN".parse::<LengthUnit>().unwrap(), LengthUnit::Inch);
        assert_eq!("mils".parse::<LengthUnit>().unwrap(), LengthUnit::Mil);
        assert_eq!(
            "ft".parse::<LengthUnit>(),
            Err(ImportError::InvalidUnit("ft".to_string()))
        );
    }

    #[test]
    fn test_factor_to() {
        let info = UnitInfo::new(LengthUnit::Mil, UnitSource::Heuristic);
        assert!((info.factor_to(LengthUnit::Millimeter) - 0.0254).abs() < 1e-12);
        assert!((info.factor_to(LengthUnit::Inch) - 0.001).abs() < 1e-12);
    }
}
