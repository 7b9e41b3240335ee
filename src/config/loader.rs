//! YAML configuration loading
//!
//! Turns the embedded default file and a user `--config` file into
//! `ParamLayer`s. Typing is left to the resolver so type conflicts are
//! reported as invalid params rather than parse failures.

use super::params::ParamLayer;
use crate::error::{Result, WavprepError};
use std::path::Path;
use tracing::{debug, warn};

/// Built-in default configuration, shipped with the binary
const DEFAULT_CONFIG_YAML: &str = include_str!("../../configs/default.yaml");

/// Name used for the embedded default file in error messages
const DEFAULT_CONFIG_NAME: &str = "<built-in configs/default.yaml>";

/// Parse the built-in default file
pub fn builtin_default_layer() -> Result<ParamLayer> {
    parse_layer(DEFAULT_CONFIG_YAML, Path::new(DEFAULT_CONFIG_NAME))
}

/// Load a user config file
pub fn load_config_layer(path: &Path) -> Result<ParamLayer> {
    if !path.exists() {
        return Err(WavprepError::config_error(path, "config path does not exist"));
    }

    let text = std::fs::read_to_string(path)
        .map_err(|e| WavprepError::config_error(path, format!("failed to read: {}", e)))?;

    let layer = parse_layer(&text, path)?;
    debug!("Loaded config layer from {}", path.display());
    Ok(layer)
}

fn parse_layer(text: &str, origin: &Path) -> Result<ParamLayer> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| WavprepError::config_error(origin, format!("failed to parse YAML: {}", e)))?;

    let json = serde_json::to_value(&yaml).map_err(|e| {
        WavprepError::config_error(origin, format!("unsupported YAML structure: {}", e))
    })?;

    let layer = ParamLayer::from_value(json)
        .map_err(|e| WavprepError::config_error(origin, e.to_string()))?;

    for key in layer.unknown_keys() {
        warn!("Ignoring unknown config key '{}' in {}", key, origin.display());
    }

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::params::{resolve, IngestParams, ParamSource};
    use tempfile::TempDir;

    #[test]
    fn test_builtin_defaults_parse() {
        let layer = builtin_default_layer().unwrap();
        let resolved = resolve(&IngestParams::default(), &layer, None, &ParamLayer::new()).unwrap();
        assert_eq!(resolved.params, IngestParams::default());
        assert_eq!(resolved.provenance.get("sample_rate"), Some(ParamSource::Default));
    }

    #[test]
    fn test_user_config_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "sample_rate: 22050\nnormalize: true\n").unwrap();

        let layer = load_config_layer(&path).unwrap();
        let resolved =
            resolve(&IngestParams::default(), &ParamLayer::new(), Some(&layer), &ParamLayer::new())
                .unwrap();
        assert_eq!(resolved.params.sample_rate, 22050);
        assert!(resolved.params.normalize);
    }

    #[test]
    fn test_missing_config_is_error() {
        let err = load_config_layer(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_empty_config_is_empty_layer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(load_config_layer(&path).unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.yaml");
        std::fs::write(&path, "- 1\n- 2\n").unwrap();
        assert!(load_config_layer(&path).is_err());
    }
}
