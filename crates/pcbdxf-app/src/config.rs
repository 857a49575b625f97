//! 配置文件
//!
//! 可选的 TOML 文件，命令行参数优先：
//!
//! ```toml
//! [import]
//! class_name = "MainBoard"
//! recenter = true
//! tolerance = 0.01
//! unit = "mm"
//!
//! [layer_map]
//! Mech1 = "outline"
//! Drills = "hole"
//!
//! [keywords]
//! outline = ["outline", "board", "edge"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pcbdxf_core::prelude::*;
use serde::Deserialize;
use tracing::debug;

/// 当前目录下自动加载的配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "pcbdxf.toml";

/// `[import]` 段
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSection {
    pub class_name: Option<String>,
    pub recenter: Option<bool>,
    pub tolerance: Option<f64>,
    pub unit: Option<LengthUnit>,
    pub snippet: Option<bool>,
}

/// 配置文件内容
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub import: ImportSection,
    pub layer_map: LayerMap,
    pub keywords: KeywordGroups,
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub class_name: Option<String>,
    pub snippet: bool,
    pub no_recenter: bool,
    pub tolerance: Option<f64>,
    pub unit: Option<LengthUnit>,
    pub layer_map: Vec<String>,
}

/// 合并后的导入与生成选项
#[derive(Debug, Clone)]
pub struct Settings {
    pub import: ImportOptions,
    pub codegen: CodegenOptions,
}

impl AppConfig {
    /// 解析 TOML 文本
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    /// 加载配置：显式路径必须存在；否则尝试当前目录下的默认文件
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("in {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// 合并命令行参数
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings> {
        let mut layer_map = self.layer_map.clone();
        for entry in &overrides.layer_map {
            let (layer, role) = LayerMap::parse_entry(entry)?;
            layer_map.insert(layer, role);
        }

        let assembly = AssemblyConfig {
            tolerance: overrides.tolerance.or(self.import.tolerance),
            ..Default::default()
        };

        let import = ImportOptions {
            assembly,
            unit: overrides.unit.or(self.import.unit),
            layer_map,
            keywords: self.keywords.clone(),
        };

        let defaults = CodegenOptions::default();
        let codegen = CodegenOptions {
            class_name: overrides
                .class_name
                .clone()
                .or_else(|| self.import.class_name.clone())
                .unwrap_or(defaults.class_name),
            snippet: overrides.snippet || self.import.snippet.unwrap_or(false),
            recenter: !overrides.no_recenter && self.import.recenter.unwrap_or(defaults.recenter),
            ..defaults
        };

        Ok(Settings { import, codegen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());

        let settings = config.resolve(&Overrides::default()).unwrap();
        assert_eq!(settings.codegen, CodegenOptions::default());
        assert!(settings.import.layer_map.is_empty());
        assert_eq!(settings.import.unit, None);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
[import]
class_name = "MainBoard"
recenter = false
tolerance = 0.05
unit = "mil"

[layer_map]
Mech1 = "outline"
Drills = "hole"
Mech13 = "keepout"

[keywords]
outline = ["rand"]
soldermask = ["lack"]
"#;
        let config = AppConfig::from_toml(text).unwrap();
        assert_eq!(config.layer_map.len(), 3);
        assert_eq!(config.layer_map.get("Drills"), Some(Role::Hole));
        assert_eq!(config.layer_map.get("Mech13"), Some(Role::Keepout));
        assert_eq!(config.keywords.outline, vec!["rand".to_string()]);
        assert_eq!(config.keywords.match_layer("Top_Lack"), Some(Role::Soldermask));
        // 未写出的关键字组保持默认
        assert_eq!(config.keywords.hole, KeywordGroups::default().hole);

        let settings = config.resolve(&Overrides::default()).unwrap();
        assert_eq!(settings.codegen.class_name, "MainBoard");
        assert!(!settings.codegen.recenter);
        assert_eq!(settings.import.assembly.tolerance, Some(0.05));
        assert_eq!(settings.import.unit, Some(LengthUnit::Mil));
    }

    #[test]
    fn test_overrides_win() {
        let config = AppConfig::from_toml(
            r#"
[import]
class_name = "MainBoard"
unit = "mil"

[layer_map]
Mech1 = "outline"
"#,
        )
        .unwrap();

        let overrides = Overrides {
            class_name: Some("Other".to_string()),
            unit: Some(LengthUnit::Inch),
            layer_map: vec!["Mech1=cutout".to_string(), "Mech2=outline".to_string()],
            no_recenter: true,
            ..Default::default()
        };
        let settings = config.resolve(&overrides).unwrap();
        assert_eq!(settings.codegen.class_name, "Other");
        assert!(!settings.codegen.recenter);
        assert_eq!(settings.import.unit, Some(LengthUnit::Inch));
        assert_eq!(settings.import.layer_map.get("Mech1"), Some(Role::Cutout));
        assert_eq!(settings.import.layer_map.get("Mech2"), Some(Role::Outline));
    }

    #[test]
    fn test_invalid_entries() {
        assert!(AppConfig::from_toml("[import]\nunit = \"furlong\"\n").is_err());
        assert!(AppConfig::from_toml("[layer_map]\nMech1 = \"keepin\"\n").is_err());
        assert!(AppConfig::from_toml("[unknown]\nx = 1\n").is_err());

        let overrides = Overrides {
            layer_map: vec!["Mech1".to_string()],
            ..Default::default()
        };
        assert!(AppConfig::default().resolve(&overrides).is_err());
    }
}
