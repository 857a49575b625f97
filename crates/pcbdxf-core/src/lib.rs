//! PCBDXF 核心引擎
//!
//! 把 DXF 实体清单重建为闭合轮廓，检测长度单位，分类出板框、挖槽和孔，
//! 并生成 JITX 板子代码。
//!
//! # 流程
//!
//! - `inventory`: 读取器产出的实体清单
//! - `assembler`: 逐图层把线段/圆弧拼接成闭合环
//! - `units`: 单位检测（显式 > 文件头 > 范围启发式）
//! - `classify`: 有序规则表分类
//! - `codegen`: 代码生成
//! - `pipeline`: 把以上阶段串起来
//!
//! # 示例
//!
//! ```rust
//! use pcbdxf_core::prelude::*;
//!
//! let mut inventory = Inventory::new("AC1015", None);
//! let rect = Polyline::from_points(
//!     [
//!         Point2::new(0.0, 0.0),
//!         Point2::new(100.0, 0.0),
//!         Point2::new(100.0, 50.0),
//!         Point2::new(0.0, 50.0),
//!     ],
//!     true,
//! );
//! inventory.push("BOARD_OUTLINE", "LWPOLYLINE", EntityKind::Polyline(rect));
//!
//! let import = import(&inventory, &ImportOptions::default()).unwrap();
//! assert!(import.result.outline.is_some());
//! println!("{}", import.generate(&CodegenOptions::default()));
//! ```

pub mod assembler;
pub mod classify;
pub mod codegen;
pub mod diagnostic;
pub mod error;
pub mod geometry;
pub mod inventory;
pub mod math;
pub mod pipeline;
pub mod spatial;
pub mod units;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::assembler::{AssemblyConfig, PathAssembler, SourcedSegment};
    pub use crate::classify::{ClassifiedResult, Classifier, KeywordGroups, LayerMap, Role, Rule};
    pub use crate::codegen::{generate, BoardShapes, CodegenOptions};
    pub use crate::diagnostic::Diagnostic;
    pub use crate::error::ImportError;
    pub use crate::geometry::{
        arc_from_bulge, Arc, Circle, CircleShape, Feature, Line, Loop, Path, Polyline, PolylineVertex, Segment,
    };
    pub use crate::inventory::{EntityKind, EntityRecord, Hatch, Inventory, TextNote};
    pub use crate::math::{BoundingBox2, Point2, Vector2};
    pub use crate::pipeline::{
        build_geometry, import, inspect, Annotation, GeometrySet, Import, ImportOptions, ImportSummary, Inspection,
    };
    pub use crate::units::{detect_unit, HeaderUnit, LengthUnit, UnitInfo, UnitSource};
}
