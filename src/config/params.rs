//! Effective ingest parameters and their provenance
//!
//! Layers merge as hard-coded defaults → built-in default file → user config
//! file → CLI flags. A layer only overrides the keys it explicitly sets; a
//! `null` value counts as unset. Provenance records the winning layer only.
//!
//! Resolution is a pure function: identical layers produce identical params
//! and provenance, which keeps `params_digest` stable across runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Fixed name of the single-pass loudness normalization mode
pub const NORMALIZE_MODE: &str = "loudnorm_r7_v1";

/// Fixed EBU R128 loudnorm filter used when `normalize` is enabled
pub const NORMALIZE_FILTERGRAPH: &str =
    "loudnorm=I=-16:LRA=11:TP=-1.5:linear=true:print_format=summary";

/// The only supported output bit depth
pub const SUPPORTED_BIT_DEPTH: u32 = 16;

/// Keys a config layer may set
pub const PARAM_FIELDS: &[&str] = &[
    "sample_rate",
    "channels",
    "bit_depth",
    "normalize",
    "ffmpeg_extra_args",
    "audio_stream_index",
    "audio_language",
];

/// Keys that are accepted in config files but derived, never read
pub const DERIVED_FIELDS: &[&str] = &["normalize_mode", "normalize_config"];

/// Accepted spelling for `ffmpeg_extra_args`
const EXTRA_ARGS_ALIAS: &str = "extra_args";

/// Loudness normalization configuration, fixed for a given mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub filtergraph: String,
    pub mode: String,
    pub notes: String,
}

impl NormalizeConfig {
    /// The one configuration wavprep applies; no parameter sweep
    pub fn fixed() -> Self {
        Self {
            filtergraph: NORMALIZE_FILTERGRAPH.to_string(),
            mode: NORMALIZE_MODE.to_string(),
            notes: "Single-pass EBU R128 loudnorm with fixed parameters; no measurement pass."
                .to_string(),
        }
    }
}

/// Effective parameters for one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestParams {
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub normalize: bool,
    pub normalize_mode: Option<String>,
    pub normalize_config: Option<NormalizeConfig>,
    #[serde(rename = "ffmpeg_extra_args")]
    pub extra_args: Vec<String>,
    pub audio_stream_index: Option<u32>,
    pub audio_language: Option<String>,
}

impl Default for IngestParams {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            bit_depth: SUPPORTED_BIT_DEPTH,
            normalize: false,
            normalize_mode: None,
            normalize_config: None,
            extra_args: Vec::new(),
            audio_stream_index: None,
            audio_language: None,
        }
    }
}

/// Which layer supplied a parameter's effective value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Default,
    Config,
    Cli,
}

/// Field name → winning source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamProvenance(BTreeMap<String, ParamSource>);

impl ParamProvenance {
    pub fn get(&self, field: &str) -> Option<ParamSource> {
        self.0.get(field).copied()
    }

    fn set(&mut self, field: &str, source: ParamSource) {
        self.0.insert(field.to_string(), source);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamSource)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One loosely typed configuration layer (file or CLI)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamLayer {
    values: Map<String, Value>,
}

impl ParamLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a layer from a parsed document; `null` is an empty layer
    pub fn from_value(value: Value) -> Result<Self, ParamError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(ParamError::NotAMapping(json_type(&other))),
        }
    }

    /// Set a key explicitly
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Value explicitly set for `field`, treating `null` as unset
    fn lookup(&self, field: &str) -> Option<&Value> {
        let direct = self.values.get(field).filter(|v| !v.is_null());
        if direct.is_none() && field == "ffmpeg_extra_args" {
            return self.values.get(EXTRA_ARGS_ALIAS).filter(|v| !v.is_null());
        }
        direct
    }

    /// Keys that the resolver will not read
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .map(|k| k.as_str())
            .filter(|k| {
                !PARAM_FIELDS.contains(k) && !DERIVED_FIELDS.contains(k) && *k != EXTRA_ARGS_ALIAS
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Invalid or conflicting parameter values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("parameter '{field}' expects {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("bit_depth {0} is not supported; only 16-bit PCM output is produced")]
    UnsupportedBitDepth(u64),

    #[error("parameter '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    #[error("config layer must be a mapping, got {0}")]
    NotAMapping(String),
}

impl ParamError {
    /// Short remediation hint
    pub fn hint(&self) -> &'static str {
        match self {
            ParamError::UnsupportedBitDepth(_) => "Use --bit-depth 16",
            ParamError::WrongType { .. } => "Check the value types in the config file and CLI flags",
            ParamError::OutOfRange { .. } => "Use a positive value",
            ParamError::NotAMapping(_) => "Config files must be YAML mappings of parameter names",
        }
    }
}

/// Resolved parameters with provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParams {
    pub params: IngestParams,
    pub provenance: ParamProvenance,
}

/// Merge the four layers into effective params
pub fn resolve(
    builtin: &IngestParams,
    file_defaults: &ParamLayer,
    user_config: Option<&ParamLayer>,
    cli: &ParamLayer,
) -> Result<ResolvedParams, ParamError> {
    let mut params = builtin.clone();
    let mut provenance = ParamProvenance::default();

    for field in PARAM_FIELDS {
        let (value, source) = if let Some(v) = cli.lookup(field) {
            (Some(v), ParamSource::Cli)
        } else if let Some(v) = user_config.and_then(|layer| layer.lookup(field)) {
            (Some(v), ParamSource::Config)
        } else {
            (file_defaults.lookup(field), ParamSource::Default)
        };

        if let Some(value) = value {
            apply_field(&mut params, field, value)?;
        }
        provenance.set(field, source);
    }

    // normalize_mode/config follow the normalize flag and its source
    let normalize_source = provenance.get("normalize").unwrap_or(ParamSource::Default);
    if params.normalize {
        let config = NormalizeConfig::fixed();
        params.normalize_mode = Some(config.mode.clone());
        params.normalize_config = Some(config);
    } else {
        params.normalize_mode = None;
        params.normalize_config = None;
    }
    for field in DERIVED_FIELDS {
        provenance.set(field, normalize_source);
    }

    validate(&params)?;

    Ok(ResolvedParams { params, provenance })
}

/// Check invariants on effective params
pub fn validate(params: &IngestParams) -> Result<(), ParamError> {
    if params.bit_depth != SUPPORTED_BIT_DEPTH {
        return Err(ParamError::UnsupportedBitDepth(params.bit_depth as u64));
    }
    if params.sample_rate == 0 {
        return Err(ParamError::OutOfRange {
            field: "sample_rate".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if params.channels == 0 {
        return Err(ParamError::OutOfRange {
            field: "channels".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

fn apply_field(params: &mut IngestParams, field: &str, value: &Value) -> Result<(), ParamError> {
    match field {
        "sample_rate" => params.sample_rate = as_u32(field, value)?,
        "channels" => params.channels = as_u32(field, value)?,
        "bit_depth" => {
            // Report unsupported depths by value rather than as a range error
            let depth = as_u64(field, value)?;
            if depth != SUPPORTED_BIT_DEPTH as u64 {
                return Err(ParamError::UnsupportedBitDepth(depth));
            }
            params.bit_depth = SUPPORTED_BIT_DEPTH;
        }
        "normalize" => {
            params.normalize = value.as_bool().ok_or_else(|| wrong_type(field, "a boolean", value))?
        }
        "ffmpeg_extra_args" => params.extra_args = as_string_list(field, value)?,
        "audio_stream_index" => params.audio_stream_index = Some(as_u32(field, value)?),
        "audio_language" => {
            params.audio_language = Some(
                value
                    .as_str()
                    .ok_or_else(|| wrong_type(field, "a string", value))?
                    .to_string(),
            )
        }
        _ => {}
    }
    Ok(())
}

fn as_u64(field: &str, value: &Value) -> Result<u64, ParamError> {
    value
        .as_u64()
        .ok_or_else(|| wrong_type(field, "a non-negative integer", value))
}

fn as_u32(field: &str, value: &Value) -> Result<u32, ParamError> {
    let raw = as_u64(field, value)?;
    u32::try_from(raw).map_err(|_| ParamError::OutOfRange {
        field: field.to_string(),
        reason: format!("{} does not fit in 32 bits", raw),
    })
}

fn as_string_list(field: &str, value: &Value) -> Result<Vec<String>, ParamError> {
    let items = value
        .as_array()
        .ok_or_else(|| wrong_type(field, "a list of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(field, "a list of strings", item))
        })
        .collect()
}

fn wrong_type(field: &str, expected: &'static str, value: &Value) -> ParamError {
    ParamError::WrongType {
        field: field.to_string(),
        expected,
        found: json_type(value),
    }
}

fn json_type(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "a mapping".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(value: Value) -> ParamLayer {
        ParamLayer::from_value(value).unwrap()
    }

    #[test]
    fn test_config_beats_builtin_file() {
        let builtin = IngestParams::default();
        let file = layer(json!({"sample_rate": 16000}));
        let user = layer(json!({"sample_rate": 22050}));
        let cli = ParamLayer::new();

        let resolved = resolve(&builtin, &file, Some(&user), &cli).unwrap();
        assert_eq!(resolved.params.sample_rate, 22050);
        assert_eq!(resolved.provenance.get("sample_rate"), Some(ParamSource::Config));
        assert_eq!(resolved.provenance.get("channels"), Some(ParamSource::Default));
    }

    #[test]
    fn test_cli_beats_config() {
        let mut cli = ParamLayer::new();
        cli.set("channels", 2);
        let user = layer(json!({"channels": 1}));

        let resolved =
            resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &cli).unwrap();
        assert_eq!(resolved.params.channels, 2);
        assert_eq!(resolved.provenance.get("channels"), Some(ParamSource::Cli));
    }

    #[test]
    fn test_null_does_not_override() {
        let file = layer(json!({"audio_language": "jpn"}));
        let user = layer(json!({"audio_language": null}));
        let resolved =
            resolve(&IngestParams::default(), &file, Some(&user), &ParamLayer::new()).unwrap();
        assert_eq!(resolved.params.audio_language.as_deref(), Some("jpn"));
        assert_eq!(resolved.provenance.get("audio_language"), Some(ParamSource::Default));
    }

    #[test]
    fn test_bit_depth_24_rejected() {
        let user = layer(json!({"bit_depth": 24}));
        let err = resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new())
            .unwrap_err();
        assert_eq!(err, ParamError::UnsupportedBitDepth(24));
    }

    #[test]
    fn test_non_integer_sample_rate_rejected() {
        let user = layer(json!({"sample_rate": "fast"}));
        let err = resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new())
            .unwrap_err();
        assert!(matches!(err, ParamError::WrongType { ref field, .. } if field == "sample_rate"));

        let user = layer(json!({"sample_rate": 44100.5}));
        assert!(resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new()).is_err());
    }

    #[test]
    fn test_normalize_derives_fixed_config() {
        let mut cli = ParamLayer::new();
        cli.set("normalize", true);
        let resolved = resolve(&IngestParams::default(), &ParamLayer::new(), None, &cli).unwrap();
        assert_eq!(resolved.params.normalize_mode.as_deref(), Some(NORMALIZE_MODE));
        assert_eq!(
            resolved.params.normalize_config.as_ref().map(|c| c.filtergraph.as_str()),
            Some(NORMALIZE_FILTERGRAPH)
        );
        assert_eq!(resolved.provenance.get("normalize_config"), Some(ParamSource::Cli));
    }

    #[test]
    fn test_extra_args_alias() {
        let user = layer(json!({"extra_args": ["-af", "volume=0.5"]}));
        let resolved =
            resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new()).unwrap();
        assert_eq!(resolved.params.extra_args, vec!["-af", "volume=0.5"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let user = layer(json!({"sample_rate": 48000, "normalize": true}));
        let a = resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new()).unwrap();
        let b = resolve(&IngestParams::default(), &ParamLayer::new(), Some(&user), &ParamLayer::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.provenance).unwrap(),
            serde_json::to_string(&b.provenance).unwrap()
        );
    }

    #[test]
    fn test_unknown_keys_reported() {
        let user = layer(json!({"sample_rate": 1, "samplerate": 2}));
        assert_eq!(user.unknown_keys(), vec!["samplerate"]);
    }

    #[test]
    fn test_layer_must_be_mapping() {
        assert!(ParamLayer::from_value(json!([1, 2])).is_err());
        assert!(ParamLayer::from_value(Value::Null).unwrap().is_empty());
    }
}
