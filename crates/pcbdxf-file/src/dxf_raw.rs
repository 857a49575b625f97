//! DXF 原始组码解析器
//!
//! `dxf` crate 不解析 HATCH 实体，这里直接读取 ENTITIES 段的组码补上。
//!
//! # 组码 (Group Code)
//!
//! 每个数据项由两行组成：
//! - 第一行：组码（数字）
//! - 第二行：值
//!
//! HATCH 中用到的组码：
//! - 8: 图层名
//! - 70: 实心填充标志
//! - 91: 边界路径数
//! - 92: 边界类型标志（位 2 表示多段线边界）
//! - 72 / 73 / 93: 凸度标志 / 闭合标志 / 顶点数（多段线边界）
//! - 93 / 72: 边数 / 边类型（1 直线、2 圆弧、3 椭圆弧、4 样条）
//! - 10, 20 / 11, 21: 点坐标
//! - 40, 42, 50, 51: 半径、凸度、起止角度
//! - 97: 关联对象数，随后是同样数量的 330

use std::io::BufRead;

use crate::error::FileError;
use pcbdxf_core::geometry::{Arc, Line, Polyline, PolylineVertex, Segment};
use pcbdxf_core::inventory::Hatch;
use pcbdxf_core::math::Point2;
use tracing::debug;

/// 二进制 DXF 的文件头
const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// DXF 组码-值对
#[derive(Debug, Clone)]
pub struct DxfPair {
    pub code: i32,
    pub value: String,
}

impl DxfPair {
    pub fn new(code: i32, value: impl Into<String>) -> Self {
        Self { code, value: value.into() }
    }

    /// 解析为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse().ok()
    }

    /// 解析为整数
    pub fn as_i32(&self) -> Option<i32> {
        self.value.trim().parse().ok()
    }
}

/// DXF 原始解析器
pub struct DxfRawParser {
    pairs: Vec<DxfPair>,
    position: usize,
}

impl DxfRawParser {
    /// 是否为二进制 DXF（原始解析器只处理文本格式）
    pub fn is_binary(bytes: &[u8]) -> bool {
        bytes.starts_with(BINARY_SENTINEL)
    }

    /// 从文本解析
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, FileError> {
        let mut pairs = Vec::new();
        let mut lines = reader.lines();

        loop {
            // 读取组码
            let code_line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(FileError::Io(e)),
                None => break,
            };

            // 读取值
            let value_line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(FileError::Io(e)),
                None => break,
            };

            let code: i32 = code_line
                .trim()
                .parse()
                .map_err(|_| FileError::InvalidFormat(format!("Invalid group code: {}", code_line)))?;

            pairs.push(DxfPair::new(code, value_line.trim_end_matches('\r')));

            if code == 0 && pairs.last().map(|p| p.value.trim()) == Some("EOF") {
                break;
            }
        }

        Ok(Self { pairs, position: 0 })
    }

    /// 获取当前对
    pub fn current(&self) -> Option<&DxfPair> {
        self.pairs.get(self.position)
    }

    /// 前进一步
    pub fn advance(&mut self) -> Option<&DxfPair> {
        if self.position < self.pairs.len() {
            let pair = &self.pairs[self.position];
            self.position += 1;
            Some(pair)
        } else {
            None
        }
    }

    /// 跳到下一个指定组码
    pub fn skip_to(&mut self, code: i32, value: Option<&str>) -> bool {
        while let Some(pair) = self.advance() {
            if pair.code == code && value.map_or(true, |v| pair.value.trim() == v) {
                return true;
            }
        }
        false
    }

    /// 读取直到遇到组码 0
    pub fn read_until_zero(&mut self) -> Vec<DxfPair> {
        let mut result = Vec::new();
        while let Some(pair) = self.current() {
            if pair.code == 0 {
                break;
            }
            result.push(pair.clone());
            self.advance();
        }
        result
    }
}

/// 从原始组码解析出的填充
#[derive(Debug, Clone, PartialEq)]
pub struct RawHatch {
    pub layer: String,
    pub hatch: Hatch,
}

/// 实体内部的顺序游标
struct PairCursor<'a> {
    pairs: &'a [DxfPair],
    position: usize,
}

impl<'a> PairCursor<'a> {
    fn new(pairs: &'a [DxfPair]) -> Self {
        Self { pairs, position: 0 }
    }

    /// 向前查找下一个 `code`，返回其值
    fn seek(&mut self, code: i32) -> Option<&'a DxfPair> {
        while let Some(pair) = self.pairs.get(self.position) {
            self.position += 1;
            if pair.code == code {
                return Some(pair);
            }
        }
        None
    }

    fn float(&mut self, code: i32) -> Option<f64> {
        self.seek(code).and_then(DxfPair::as_f64)
    }

    fn int(&mut self, code: i32) -> Option<i32> {
        self.seek(code).and_then(DxfPair::as_i32)
    }

    fn point(&mut self, x_code: i32) -> Option<Point2> {
        Some(Point2::new(self.float(x_code)?, self.float(x_code + 10)?))
    }

    /// 下一个组码是否为 `code`（不消耗）
    fn peek_is(&self, code: i32) -> bool {
        self.pairs.get(self.position).is_some_and(|p| p.code == code)
    }
}

/// 解析 ENTITIES 段中的 HATCH 实体
pub fn parse_hatches(parser: &mut DxfRawParser) -> Vec<RawHatch> {
    let mut hatches = Vec::new();

    // 跳到 ENTITIES 段
    parser.position = 0;
    if !parser.skip_to(2, Some("ENTITIES")) {
        return hatches;
    }

    while let Some(pair) = parser.advance() {
        if pair.code == 0 && pair.value.trim() == "ENDSEC" {
            break;
        }

        if pair.code == 0 && pair.value.trim() == "HATCH" {
            let pairs = parser.read_until_zero();
            hatches.push(parse_hatch(&pairs));
        }
    }

    debug!(count = hatches.len(), "raw hatch pass");
    hatches
}

fn parse_hatch(pairs: &[DxfPair]) -> RawHatch {
    let layer = pairs
        .iter()
        .find(|p| p.code == 8)
        .map(|p| p.value.trim().to_string())
        .unwrap_or_else(|| "0".to_string());

    let mut cursor = PairCursor::new(pairs);
    let solid = cursor.int(70).is_some_and(|v| v == 1);
    let path_count = cursor.int(91).unwrap_or(0).max(0) as usize;

    let mut boundaries = Vec::with_capacity(path_count);
    for _ in 0..path_count {
        match parse_boundary(&mut cursor) {
            Some(segments) if !segments.is_empty() => boundaries.push(segments),
            Some(_) => {}
            // 无法继续定位后续边界
            None => break,
        }
    }

    RawHatch {
        layer,
        hatch: Hatch { boundaries, solid },
    }
}

/// 解析单个边界路径；遇到样条边或数据缺失返回 `None`
fn parse_boundary(cursor: &mut PairCursor<'_>) -> Option<Vec<Segment>> {
    let flags = cursor.int(92)?;

    let segments = if flags & 2 != 0 {
        let has_bulge = cursor.int(72)? != 0;
        let _closed = cursor.int(73)?;
        let count = cursor.int(93)?.max(0) as usize;
        let mut vertices = Vec::with_capacity(count);
        for _ in 0..count {
            let point = cursor.point(10)?;
            let bulge = if has_bulge && cursor.peek_is(42) { cursor.float(42)? } else { 0.0 };
            vertices.push(PolylineVertex::with_bulge(point, bulge));
        }
        // 填充边界总是闭合的
        Polyline::new(vertices, true).explode()
    } else {
        let count = cursor.int(93)?.max(0) as usize;
        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            match cursor.int(72)? {
                1 => {
                    let start = cursor.point(10)?;
                    let end = cursor.point(11)?;
                    segments.push(Segment::Line(Line::new(start, end)));
                }
                2 => {
                    let center = cursor.point(10)?;
                    let radius = cursor.float(40)?;
                    let start = cursor.float(50)?;
                    let end = cursor.float(51)?;
                    let ccw = cursor.int(73)? != 0;
                    // 顺时针圆弧的角度按镜像存储
                    let arc = if ccw {
                        Arc::new(center, radius, start.to_radians(), end.to_radians(), true)
                    } else {
                        Arc::new(center, radius, (-start).to_radians(), (-end).to_radians(), false)
                    };
                    segments.push(Segment::Arc(arc));
                }
                3 => {
                    // 椭圆弧：读完字段后丢弃
                    cursor.point(10)?;
                    cursor.point(11)?;
                    cursor.float(40)?;
                    cursor.float(50)?;
                    cursor.float(51)?;
                    cursor.int(73)?;
                }
                _ => return None,
            }
        }
        segments
    };

    // 关联对象句柄；97 可能省略，不能越过下一个边界去找
    if cursor.peek_is(97) {
        cursor.seek(97);
        while cursor.peek_is(330) {
            cursor.seek(330);
        }
    }

    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn dxf_text(pairs: &[(i32, &str)]) -> String {
        let mut out = String::new();
        for (code, value) in pairs {
            out.push_str(&format!("{:>3}\n{}\n", code, value));
        }
        out
    }

    #[test]
    fn test_parse_pair() {
        let pair = DxfPair::new(10, "100.5");
        assert_eq!(pair.as_f64(), Some(100.5));

        let pair = DxfPair::new(70, "42");
        assert_eq!(pair.as_i32(), Some(42));
    }

    #[test]
    fn test_invalid_group_code() {
        let result = DxfRawParser::parse(Cursor::new("abc\nSECTION\n"));
        assert!(matches!(result, Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_hatches() {
        let text = dxf_text(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "LINE"),
            (8, "0"),
            (10, "0.0"),
            (20, "0.0"),
            (11, "1.0"),
            (21, "1.0"),
            (0, "HATCH"),
            (8, "Fill"),
            (10, "0.0"),
            (20, "0.0"),
            (30, "0.0"),
            (2, "SOLID"),
            (70, "1"),
            (71, "0"),
            (91, "2"),
            // 多段线边界：带凸度的半圆 + 直线
            (92, "2"),
            (72, "1"),
            (73, "1"),
            (93, "2"),
            (10, "0.0"),
            (20, "0.0"),
            (42, "1.0"),
            (10, "10.0"),
            (20, "0.0"),
            (42, "0.0"),
            (97, "0"),
            // 边界：三条直线
            (92, "1"),
            (93, "3"),
            (72, "1"),
            (10, "20.0"),
            (20, "0.0"),
            (11, "30.0"),
            (21, "0.0"),
            (72, "1"),
            (10, "30.0"),
            (20, "0.0"),
            (11, "30.0"),
            (21, "10.0"),
            (72, "1"),
            (10, "30.0"),
            (20, "10.0"),
            (11, "20.0"),
            (21, "0.0"),
            (97, "1"),
            (330, "2F"),
            (75, "0"),
            (76, "1"),
            (98, "0"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);

        let mut parser = DxfRawParser::parse(Cursor::new(text)).unwrap();
        let hatches = parse_hatches(&mut parser);
        assert_eq!(hatches.len(), 1);

        let raw = &hatches[0];
        assert_eq!(raw.layer, "Fill");
        assert!(raw.hatch.solid);
        assert_eq!(raw.hatch.boundaries.len(), 2);
        assert_eq!(raw.hatch.boundaries[0].len(), 2);
        assert!(raw.hatch.boundaries[0][0].is_arc());
        assert_eq!(raw.hatch.boundaries[1].len(), 3);
        assert!(!raw.hatch.boundaries[1][0].is_arc());
    }

    #[test]
    fn test_boundary_without_source_count() {
        let text = dxf_text(&[
            (0, "SECTION"),
            (2, "ENTITIES"),
            (0, "HATCH"),
            (8, "Fill"),
            (70, "0"),
            (91, "2"),
            // 第一个边界没有 97
            (92, "1"),
            (93, "1"),
            (72, "1"),
            (10, "0.0"),
            (20, "0.0"),
            (11, "5.0"),
            (21, "0.0"),
            (92, "1"),
            (93, "2"),
            (72, "1"),
            (10, "0.0"),
            (20, "1.0"),
            (11, "5.0"),
            (21, "1.0"),
            (72, "1"),
            (10, "5.0"),
            (20, "1.0"),
            (11, "5.0"),
            (21, "3.0"),
            (97, "1"),
            (330, "2F"),
            (75, "0"),
            (0, "ENDSEC"),
            (0, "EOF"),
        ]);

        let mut parser = DxfRawParser::parse(Cursor::new(text)).unwrap();
        let hatches = parse_hatches(&mut parser);
        assert_eq!(hatches.len(), 1);
        assert!(!hatches[0].hatch.solid);
        assert_eq!(hatches[0].hatch.boundaries.len(), 2);
        assert_eq!(hatches[0].hatch.boundaries[0].len(), 1);
        assert_eq!(hatches[0].hatch.boundaries[1].len(), 2);
    }

    #[test]
    fn test_no_entities_section() {
        let text = dxf_text(&[(0, "SECTION"), (2, "HEADER"), (0, "ENDSEC"), (0, "EOF")]);
        let mut parser = DxfRawParser::parse(Cursor::new(text)).unwrap();
        assert!(parse_hatches(&mut parser).is_empty());
    }

    #[test]
    fn test_binary_detection() {
        assert!(DxfRawParser::is_binary(b"AutoCAD Binary DXF\r\n\x1a\0"));
        assert!(!DxfRawParser::is_binary(b"  0\nSECTION\n"));
    }
}
