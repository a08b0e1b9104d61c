//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Every section is optional: an empty document yields the built-in relay
//! list, detector signatures and hydration thresholds. Values may reference
//! environment variables as `${VAR}`; keys may be overridden with
//! `TOOLZ__SECTION__KEY` variables.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolzConfig {
    pub version: Option<String>,
    /// Relay endpoints in fallback order.
    pub proxies: Vec<ProxySpec>,
    pub http: HttpSpec,
    pub detector: DetectorSpec,
    pub hydration: HydrationSpec,
    pub webdriver: WebDriverSpec,
    pub llm: Option<LlmSpec>,
    pub logging: LoggingSpec,
}

impl Default for ToolzConfig {
    fn default() -> Self {
        Self {
            version: None,
            proxies: default_proxies(),
            http: HttpSpec::default(),
            detector: DetectorSpec::default(),
            hydration: HydrationSpec::default(),
            webdriver: WebDriverSpec::default(),
            llm: None,
            logging: LoggingSpec::default(),
        }
    }
}

impl ToolzConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxies.is_empty() {
            return Err(ConfigError::Message(
                "at least one proxy endpoint must be configured".into(),
            ));
        }
        if let Some(p) = self.proxies.iter().find(|p| p.base.trim().is_empty()) {
            return Err(ConfigError::Message(format!(
                "proxy `{}` has an empty base URL",
                p.name
            )));
        }
        if self.hydration.max_attempts == 0 {
            return Err(ConfigError::Message(
                "hydration.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One relay endpoint. The encoded target URL is appended to `base`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxySpec {
    pub name: String,
    pub base: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ProxySpec {
    fn new(name: &str, base: &str) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            headers: BTreeMap::new(),
        }
    }
}

pub fn default_proxies() -> Vec<ProxySpec> {
    let mut cors_anywhere = ProxySpec::new("cors-anywhere", "https://cors-anywhere.herokuapp.com/");
    cors_anywhere
        .headers
        .insert("X-Requested-With".into(), "XMLHttpRequest".into());
    vec![
        ProxySpec::new("allorigins", "https://api.allorigins.win/get?url="),
        cors_anywhere,
        ProxySpec::new("codetabs", "https://api.codetabs.com/v1/proxy?quest="),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSpec {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSpec {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
            user_agent: Some("Mozilla/5.0 (compatible; ToolzAnalyzer/1.0)".into()),
        }
    }
}

/// Signals that mark a page as client-rendered. Any single match is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSpec {
    /// Element ids frameworks mount into.
    pub root_ids: Vec<String>,
    /// Attributes frameworks stamp on their root element.
    pub root_attributes: Vec<String>,
    /// Substrings of `<script src>` paths typical of bundled apps.
    pub script_markers: Vec<String>,
    /// Substrings searched for in the unparsed markup.
    pub raw_signatures: Vec<String>,
}

impl Default for DetectorSpec {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            root_ids: strings(&["root", "__next"]),
            root_attributes: strings(&["data-reactroot"]),
            script_markers: strings(&["react", "bundle.js", "chunk", "webpack"]),
            raw_signatures: strings(&[
                "_reactRootContainer",
                "__NEXT_DATA__",
                "ReactDOM",
                "React.createElement",
                "_jsx(",
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HydrationSpec {
    /// When false, client-rendered pages fall back to their static text.
    pub enabled: bool,
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub min_text_len: usize,
    pub loading_marker: String,
    pub root_id: String,
    pub settle_ms: u64,
}

impl Default for HydrationSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 500,
            max_attempts: 20,
            min_text_len: 10,
            loading_marker: "Loading".into(),
            root_id: "root".into(),
            settle_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebDriverSpec {
    pub url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    /// Lets scripts inside the sandbox call their own APIs cross-origin.
    pub disable_web_security: bool,
}

impl Default for WebDriverSpec {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".into(),
            headless: true,
            window_width: 1024,
            window_height: 768,
            user_agent: None,
            disable_web_security: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmSpec {
    Gemini {
        api_key: String,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default = "default_gemini_endpoint")]
        endpoint: String,
    },
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash-latest".into()
}
fn default_gemini_endpoint() -> String {
    DEFAULT_GEMINI_ENDPOINT.into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSpec {
    pub dir: Option<String>,
    pub format: String,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingSpec {
    fn default() -> Self {
        Self {
            dir: None,
            format: "text".into(),
            stderr: false,
            filter: "info".into(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct ToolzConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ToolzConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolzConfigLoader {
    /// Start with no files; `TOOLZ__` env overrides are applied on [`load`](Self::load).
    ///
    /// ```
    /// use toolz_config::ToolzConfigLoader;
    ///
    /// let config = ToolzConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.proxies.len(), 3);
    /// assert_eq!(config.hydration.max_attempts, 20);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but silently skipped when missing.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use toolz_config::ToolzConfigLoader;
    ///
    /// let cfg = ToolzConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// proxies:
    ///   - name: "local"
    ///     base: "http://localhost:8080/raw?url="
    /// hydration:
    ///   max_attempts: 4
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.proxies.len(), 1);
    /// assert_eq!(cfg.proxies[0].name, "local");
    /// assert_eq!(cfg.hydration.max_attempts, 4);
    /// assert_eq!(cfg.hydration.interval_ms, 500);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// `TOOLZ__`-prefixed environment variables are layered last so they win
    /// over every file or snippet; `${VAR}` placeholders are expanded before
    /// typed deserialization.
    ///
    /// ```
    /// use toolz_config::{LlmSpec, ToolzConfigLoader};
    ///
    /// unsafe { std::env::set_var("DOC_GEMINI_KEY", "injected-from-env"); }
    ///
    /// let config = ToolzConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: "gemini"
    ///   api_key: "${DOC_GEMINI_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match config.llm {
    ///     Some(LlmSpec::Gemini { api_key, model, .. }) => {
    ///         assert_eq!(api_key, "injected-from-env");
    ///         assert_eq!(model, "gemini-1.5-flash-latest");
    ///     }
    ///     None => panic!("expected Gemini configuration"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOC_GEMINI_KEY"); }
    /// ```
    pub fn load(self) -> Result<ToolzConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("TOOLZ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ToolzConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}
