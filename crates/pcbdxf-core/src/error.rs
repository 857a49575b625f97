//! 导入错误定义

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Drawing contains no entities")]
    NoEntities,

    #[error("Layer map references unknown layer '{layer}' (available: {})", available.join(", "))]
    UnknownLayer { layer: String, available: Vec<String> },

    #[error("Malformed {dxf_type} entity #{index} on layer '{layer}': {reason}")]
    MalformedEntity {
        index: usize,
        layer: String,
        dxf_type: String,
        reason: String,
    },

    #[error("Invalid role '{0}' (expected outline, cutout, hole or ignore)")]
    InvalidRole(String),

    #[error("Invalid layer map entry '{0}' (expected LAYER=ROLE)")]
    InvalidLayerMapEntry(String),

    #[error("Invalid unit '{0}' (expected mm, in or mil)")]
    InvalidUnit(String),
}
