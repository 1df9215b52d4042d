use std::ffi::{c_float, c_int};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BindingError, Result};
use crate::ffi::EntryPoint;

/// Output buffer capacity used when the caller does not choose one.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 4096;

pub const LIBRARY_ENV: &str = "IAMAI_LIBRARY";
pub const MODEL_ENV: &str = "IAMAI_MODEL";

/// Generation hyperparameters passed to `FullInit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub batch: u32,
    pub context_size: u32,
    pub threads: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
    pub seed: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            batch: 64,
            context_size: 2048,
            threads: 8,
            top_k: 50,
            top_p: 0.9,
            temperature: 0.5,
            seed: 42,
        }
    }
}

/// `GenerationConfig` converted to the engine's positional argument types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NativeParams {
    pub max_tokens: c_int,
    pub batch: c_int,
    pub context_size: c_int,
    pub threads: c_int,
    pub top_k: c_int,
    pub top_p: c_float,
    pub temperature: c_float,
    pub seed: u32,
}

impl GenerationConfig {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.to_native().map(|_| ())
    }

    pub(crate) fn to_native(&self) -> Result<NativeParams> {
        let top_k = c_int::try_from(self.top_k)
            .map_err(|_| invalid(format!("top_k {} exceeds i32::MAX", self.top_k)))?;
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid(format!("top_p {} is outside [0, 1]", self.top_p)));
        }
        if !(self.temperature.is_finite() && self.temperature >= 0.0) {
            return Err(invalid(format!(
                "temperature {} must be a finite value >= 0",
                self.temperature
            )));
        }

        Ok(NativeParams {
            max_tokens: positive_field("max_tokens", self.max_tokens)?,
            batch: positive_field("batch", self.batch)?,
            context_size: positive_field("context_size", self.context_size)?,
            threads: positive_field("threads", self.threads)?,
            top_k,
            top_p: self.top_p,
            temperature: self.temperature,
            seed: self.seed,
        })
    }
}

fn positive_field(name: &str, value: u32) -> Result<c_int> {
    if value == 0 {
        return Err(invalid(format!("{name} must be greater than zero")));
    }
    c_int::try_from(value).map_err(|_| invalid(format!("{name} {value} exceeds i32::MAX")))
}

fn invalid(message: String) -> BindingError {
    BindingError::InvalidConfig(message)
}

/// Which entry points a module must export to be accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolProfile {
    #[default]
    Core,
    Runtime,
    PromptFormat,
    All,
}

impl SymbolProfile {
    pub fn entry_points(self) -> &'static [EntryPoint] {
        match self {
            SymbolProfile::Core => EntryPoint::CORE,
            SymbolProfile::Runtime => EntryPoint::RUNTIME_VARIANT,
            SymbolProfile::PromptFormat => EntryPoint::PROMPT_FORMAT_VARIANT,
            SymbolProfile::All => &EntryPoint::ALL,
        }
    }
}

/// Everything needed to bring an engine up, usually read from a TOML file.
///
/// ```toml
/// library = "build/bin/libiamai-core.so"
/// model = "models/Llama-3.2-1B-Instruct-Q4_K_M.gguf"
/// symbols = "prompt-format"
/// prompt_format = "Human: {prompt}\nAssistant: "
///
/// [generation]
/// max_tokens = 128
/// threads = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub library: PathBuf,
    pub model: PathBuf,
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
    #[serde(default)]
    pub symbols: SymbolProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_format: Option<String>,
    /// `FullInit` parameters; `Init` with native defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,
}

impl Default for BindingConfig {
    /// The platform-named engine in the working directory.
    fn default() -> Self {
        BindingConfig::new(crate::ffi::default_library_path("."), "model.gguf")
    }
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

impl BindingConfig {
    pub fn new(library: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            model: model.into(),
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            symbols: SymbolProfile::default(),
            prompt_format: None,
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_symbols(mut self, symbols: SymbolProfile) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_prompt_format(mut self, format: impl Into<String>) -> Self {
        self.prompt_format = Some(format.into());
        self
    }

    /// Read a config file, then apply `IAMAI_LIBRARY` / `IAMAI_MODEL`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize binding config")
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(library) = lookup(LIBRARY_ENV).filter(|value| !value.trim().is_empty()) {
            debug!(library = %library, "library path overridden by {}", LIBRARY_ENV);
            self.library = PathBuf::from(library);
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|value| !value.trim().is_empty()) {
            debug!(model = %model, "model path overridden by {}", MODEL_ENV);
            self.model = PathBuf::from(model);
        }
    }

    /// Static checks that need no native module. [`Engine`](crate::Engine)
    /// runs these before it touches the library.
    pub fn check(&self) -> Result<()> {
        if self.output_capacity == 0 {
            return Err(invalid("output_capacity must be greater than zero".to_string()));
        }
        if let Some(generation) = &self.generation {
            generation.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_generation_config_is_valid() {
        let config = GenerationConfig::default();
        let native = config.to_native().unwrap();
        assert_eq!(native.max_tokens, 256);
        assert_eq!(native.batch, 64);
        assert_eq!(native.context_size, 2048);
        assert_eq!(native.threads, 8);
        assert_eq!(native.top_k, 50);
        assert_eq!(native.seed, 42);
    }

    #[test]
    fn test_zero_top_k_is_allowed() {
        let config = GenerationConfig {
            top_k: 0,
            ..GenerationConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        let cases = [
            GenerationConfig::default().with_max_tokens(0),
            GenerationConfig::default().with_threads(0),
            GenerationConfig {
                batch: u32::MAX,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                top_p: 1.5,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                top_p: f32::NAN,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                temperature: -0.1,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                temperature: f32::INFINITY,
                ..GenerationConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(BindingError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_full_config() {
        let config = BindingConfig::from_toml_str(
            r#"
library = "build/bin/libiamai-core.so"
model = "models/tiny.gguf"
symbols = "prompt-format"
prompt_format = "Human: {prompt}\nAssistant: "
output_capacity = 1024

[generation]
max_tokens = 128
batch = 32
context_size = 1024
threads = 4
top_k = 40
top_p = 0.8
temperature = 0.7
seed = 1337
"#,
        )
        .unwrap();

        assert_eq!(config.library, PathBuf::from("build/bin/libiamai-core.so"));
        assert_eq!(config.symbols, SymbolProfile::PromptFormat);
        assert_eq!(config.output_capacity, 1024);
        assert_eq!(
            config.prompt_format.as_deref(),
            Some("Human: {prompt}\nAssistant: ")
        );
        let generation = config.generation.unwrap();
        assert_eq!(generation.max_tokens, 128);
        assert_eq!(generation.seed, 1337);
        assert!((generation.top_p - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_default_config_points_at_platform_library() {
        let config = BindingConfig::default();
        assert_eq!(config.output_capacity, DEFAULT_OUTPUT_CAPACITY);
        assert!(
            config
                .library
                .to_string_lossy()
                .contains(crate::ffi::LIBRARY_STEM)
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config =
            BindingConfig::from_toml_str("library = \"lib.so\"\nmodel = \"m.gguf\"\n").unwrap();
        assert_eq!(config.output_capacity, DEFAULT_OUTPUT_CAPACITY);
        assert_eq!(config.symbols, SymbolProfile::Core);
        assert!(config.generation.is_none());
        assert!(config.prompt_format.is_none());
    }

    #[test]
    fn test_partial_generation_table_fills_defaults() {
        let config = BindingConfig::from_toml_str(
            "library = \"lib.so\"\nmodel = \"m.gguf\"\n[generation]\nthreads = 2\n",
        )
        .unwrap();
        let generation = config.generation.unwrap();
        assert_eq!(generation.threads, 2);
        assert_eq!(generation.max_tokens, 256);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(
            BindingConfig::from_toml_str(
                "library = \"lib.so\"\nmodel = \"m.gguf\"\nsymbols = \"everything\"\n"
            )
            .is_err()
        );
    }

    #[test]
    fn test_overrides_replace_paths() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(LIBRARY_ENV, "/opt/iamai/libiamai-core.so"), (MODEL_ENV, "  ")]);
        let mut config = BindingConfig::new("lib.so", "m.gguf");
        config.apply_overrides(|key| vars.get(key).map(|value| value.to_string()));

        assert_eq!(config.library, PathBuf::from("/opt/iamai/libiamai-core.so"));
        assert_eq!(config.model, PathBuf::from("m.gguf"));
    }

    #[test]
    fn test_check_rejects_bad_values() {
        let mut config = BindingConfig::new("lib.so", "m.gguf");
        config.output_capacity = 0;
        assert!(matches!(config.check(), Err(BindingError::InvalidConfig(_))));

        let config = BindingConfig::new("lib.so", "m.gguf")
            .with_generation(GenerationConfig::default().with_max_tokens(0));
        assert!(matches!(config.check(), Err(BindingError::InvalidConfig(_))));

        let config = BindingConfig::new("lib.so", "m.gguf")
            .with_generation(GenerationConfig::default());
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iamai.toml");
        let config = BindingConfig::new("lib.so", "m.gguf")
            .with_symbols(SymbolProfile::Runtime)
            .with_generation(GenerationConfig::default().with_seed(7));
        fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(BindingConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = BindingConfig::from_file(Path::new("/nonexistent/iamai.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
