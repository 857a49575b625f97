//! PCBDXF 文件处理
//!
//! 把 DXF 文件读成 [`pcbdxf_core::inventory::Inventory`]：
//! - 常规实体经 `dxf` crate 解析
//! - HATCH 边界由原始组码解析器补充

pub mod dxf_io;
pub mod dxf_raw;
pub mod error;

pub use dxf_io::{load_inventory, load_inventory_from_reader};
pub use error::FileError;
