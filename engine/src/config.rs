//! Tool configuration files and engine settings
//!
//! A tool directory carries a `tool.conf` of `key=value` lines:
//!
//! ```text
//! # comment
//! tool-type=eslint
//! tool-invoke=tool-invoke.txt
//! tool-cmd=<tool-dir>/bin/eslint
//!     --no-eslintrc
//! ```
//!
//! Indented lines continue the previous value. A `tool-defaults` key names a
//! file in the same directory that is read first and overlaid. Values may
//! reference other keys with template tokens; they are expanded once after
//! merging, then `$NAME` and `${NAME}` are resolved from the environment.
//!
//! Engine settings come from defaults, an optional `cmdsplit.toml`, then
//! `CMDSPLIT_*` environment variables.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::budget::{host_arg_max, CommandBudget, DEFAULT_SAFETY_MARGIN};
use crate::profile::ToolProfile;
use crate::template::{is_truthy, LoadError, Template};
use crate::types::{SymbolTable, Value};

/// Tool configuration file name inside a tool directory
pub const TOOL_CONF: &str = "tool.conf";

/// Report file name template used when the tool does not set one
pub const DEFAULT_REPORT_TEMPLATE: &str = "assessment_report{0}.xml";

/// Engine settings file name
pub const SETTINGS_FILE: &str = "cmdsplit.toml";

/// Prefix of environment variables overriding engine settings
pub const ENV_PREFIX: &str = "CMDSPLIT_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Missing required key '{0}' in tool configuration")]
    MissingKey(String),

    #[error(transparent)]
    Template(#[from] LoadError),

    #[error("Invalid engine settings: {0}")]
    Settings(#[from] Box<figment::Error>),
}

/// Parse `tool.conf` text into key/value pairs
///
/// `origin` only labels syntax errors.
pub fn parse_conf(text: &str, origin: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    let mut last_key: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        let syntax = |message: &str| ConfigError::Syntax {
            path: origin.to_path_buf(),
            line: index + 1,
            message: message.to_owned(),
        };

        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            let key = last_key
                .as_ref()
                .ok_or_else(|| syntax("continuation line without a preceding key"))?;
            if let Some(value) = values.get_mut(key) {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| syntax("expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(syntax("empty key"));
        }
        values.insert(key.to_owned(), value.trim().to_owned());
        last_key = Some(key.to_owned());
    }

    Ok(values)
}

fn read_conf(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_conf(&text, path)
}

/// Environment variables of this process that are valid UTF-8
pub fn process_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Replace `$NAME` and `${NAME}` with values from `env`
///
/// Names not in `env` are left as written.
pub fn expand_env(text: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        match env.get(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[pos..=pos + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

/// Merged, expanded configuration of one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    dir: PathBuf,
    values: BTreeMap<String, String>,
}

impl ToolConfig {
    /// Load `tool.conf` (and its `tool-defaults`) from a tool directory
    ///
    /// Environment references resolve against this process's environment.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(dir, &process_environment())
    }

    /// [`load`](Self::load) with an explicit environment
    pub fn load_with_env(
        dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let conf = read_conf(&dir.join(TOOL_CONF))?;

        let merged = match conf.get("tool-defaults").cloned() {
            Some(defaults) => {
                let mut base = read_conf(&dir.join(defaults))?;
                base.extend(conf);
                base
            }
            None => conf,
        };

        log::debug!("Loaded {} keys from {}", merged.len(), dir.display());
        Ok(Self::from_values_with_env(dir, merged, env))
    }

    /// Build from already-merged pairs without an environment
    pub fn from_values(dir: impl Into<PathBuf>, values: BTreeMap<String, String>) -> Self {
        Self::from_values_with_env(dir, values, &BTreeMap::new())
    }

    /// Build from already-merged pairs: expand references and fill defaults
    pub fn from_values_with_env(
        dir: impl Into<PathBuf>,
        values: BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Self {
        let symbols: SymbolTable = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut expanded: BTreeMap<String, String> = values
            .into_iter()
            .map(|(key, value)| {
                let value = match Template::parse(&value) {
                    Ok(template) => template.substitute(&symbols),
                    Err(e) => {
                        log::debug!("Keeping '{}' unexpanded: {}", key, e);
                        value
                    }
                };
                let value = expand_env(&value, env);
                (key, value)
            })
            .collect();

        expanded
            .entry("assessment-report-template".to_owned())
            .or_insert_with(|| DEFAULT_REPORT_TEMPLATE.to_owned());

        Self {
            dir: dir.into(),
            values: expanded,
        }
    }

    /// Directory the configuration was loaded from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_owned()))
    }

    /// Whether a key holds a true-like value
    pub fn flag(&self, key: &str) -> bool {
        is_truthy(self.values.get(key).map(|v| Value::Scalar(v.clone())).as_ref())
    }

    /// Comma or whitespace separated list value
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split([',', ' ', '\t', '\n'])
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn tool_type(&self) -> Option<&str> {
        self.get("tool-type")
    }

    /// Report file name template, `{0}` or `{}` standing for the chunk id
    pub fn report_template(&self) -> &str {
        self.get("assessment-report-template")
            .unwrap_or(DEFAULT_REPORT_TEMPLATE)
    }

    pub fn report_on_stdout(&self) -> bool {
        self.flag("report-on-stdout")
    }

    /// All values as scalar symbols
    pub fn symbols(&self) -> SymbolTable {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Built-in profile for the tool type, adjusted by explicit keys
    pub fn profile(&self) -> ToolProfile {
        let mut profile = ToolProfile::for_tool_type(self.tool_type().unwrap_or_default());

        let excluded = self.list("exclude-extensions");
        if !excluded.is_empty() {
            profile = profile.excluding_extensions(excluded);
        }

        if self.values.contains_key("split-artifacts") {
            let split = self.flag("split-artifacts");
            profile = profile.with_split_predicate(move |_| split);
        }

        profile
    }

    /// Parse the template named by `tool-invoke`, relative to the tool directory
    pub fn invoke_template(&self) -> Result<Template, ConfigError> {
        let path = self.dir.join(self.require("tool-invoke")?);
        Ok(Template::load(&path)?)
    }

    /// Point `tool-config-file` at the package's own file or the default one
    ///
    /// Only applies when `tool-config-required` is set. A package file wins
    /// when it exists; otherwise `tool-default-config-file` is used.
    pub fn resolve_tool_config_file(&mut self, package_dir: &Path) -> Result<(), ConfigError> {
        if !self.flag("tool-config-required") {
            return Ok(());
        }

        let package_file = self
            .get("tool-config-file")
            .map(|f| package_dir.join(f))
            .filter(|p| p.is_file());

        let resolved = match package_file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => self.require("tool-default-config-file")?.to_owned(),
        };
        log::info!("Using tool configuration file {}", resolved);
        self.set("tool-config-file", resolved);
        Ok(())
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    /// Overrides the host `ARG_MAX`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_arg_size: Option<usize>,
    /// Bytes held back from the budget
    pub safety_margin: usize,
    /// Where reports and captured output go
    pub results_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_arg_size: None,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            results_dir: PathBuf::from("results"),
        }
    }
}

impl EngineSettings {
    /// Provider chain: defaults, `dir/cmdsplit.toml`, `CMDSPLIT_*` variables
    pub fn figment(dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(dir.join(SETTINGS_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| key.as_str().replace('_', "-").into()))
    }

    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::figment(dir)
            .extract()
            .map_err(|e| ConfigError::Settings(Box::new(e)))
    }

    pub fn budget(&self) -> CommandBudget {
        CommandBudget::new(self.max_arg_size.unwrap_or_else(host_arg_max))
            .with_safety_margin(self.safety_margin)
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn test_parse_comments_and_continuations() {
        let text = "# header\n\ntool-type=eslint\ntool-cmd=eslint\n    --no-eslintrc\n\t-f json\nempty=\n";
        let values = parse_conf(text, Path::new("tool.conf")).unwrap();
        assert_eq!(values["tool-type"], "eslint");
        assert_eq!(values["tool-cmd"], "eslint\n--no-eslintrc\n-f json");
        assert_eq!(values["empty"], "");
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let err = parse_conf("ok=1\nnot a pair\n", Path::new("tool.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 2, .. }));

        let err = parse_conf("  orphan\n", Path::new("tool.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_defaults_overlay_and_expansion() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "defaults.conf",
            "tool-dir=/opt/lint\ntool-cmd=<tool-dir>/bin/lint\ntool-type=old\n",
        );
        write(
            dir.path(),
            TOOL_CONF,
            "tool-defaults=defaults.conf\ntool-type=lint\ntool-invoke=invoke.txt\n",
        );

        let config = ToolConfig::load(dir.path()).unwrap();
        assert_eq!(config.tool_type(), Some("lint"));
        assert_eq!(config.get("tool-cmd"), Some("/opt/lint/bin/lint"));
        assert_eq!(config.report_template(), DEFAULT_REPORT_TEMPLATE);
    }

    #[test]
    fn test_unparseable_values_are_kept_verbatim() {
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        values.insert("redirect".to_string(), "2>&1".to_string());
        let config = ToolConfig::from_values("/t", values);
        assert_eq!(config.get("redirect"), Some("2>&1"));
    }

    #[test]
    fn test_expand_env_forms() {
        let env: BTreeMap<String, String> = [("HOME", "/home/u"), ("TOOLS_1", "/t")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(expand_env("$HOME/tools", &env), "/home/u/tools");
        assert_eq!(expand_env("${TOOLS_1}x:$TOOLS_1", &env), "/tx:/t");
        assert_eq!(expand_env("$MISSING/${ALSO} $", &env), "$MISSING/${ALSO} $");
        assert_eq!(expand_env("${HOME", &env), "${HOME");
        assert_eq!(expand_env("cost $$5", &env), "cost $$5");
    }

    #[test]
    fn test_env_references_in_values_are_resolved() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            TOOL_CONF,
            "tool-dir=$HOME/tools\ntool-cmd=<tool-dir>/bin/lint\nredirect=2>&1 ${LOG}\n",
        );
        let mut env = BTreeMap::new();
        env.insert("HOME".to_string(), "/home/u".to_string());
        env.insert("LOG".to_string(), "/var/log/x".to_string());

        let config = ToolConfig::load_with_env(dir.path(), &env).unwrap();
        assert_eq!(config.get("tool-dir"), Some("/home/u/tools"));
        assert_eq!(config.get("tool-cmd"), Some("/home/u/tools/bin/lint"));
        assert_eq!(config.get("redirect"), Some("2>&1 /var/log/x"));

        let template = Template::parse("<tool-dir>/bin/lint <srcfile% >").unwrap();
        let symbols = config.symbols().with("srcfile", vec!["/a.js".to_string()]);
        assert_eq!(
            template.evaluate(&symbols).argv(),
            ["/home/u/tools/bin/lint", "/a.js"]
        );
    }

    #[test]
    fn test_missing_tool_conf() {
        let dir = TempDir::new().unwrap();
        let err = ToolConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invoke_template_relative_to_tool_dir() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), TOOL_CONF, "tool-invoke=invoke.txt\n");
        write(dir.path(), "invoke.txt", "lint <srcfile% >\n");
        let config = ToolConfig::load(dir.path()).unwrap();
        let template = config.invoke_template().unwrap();
        assert_eq!(template.source(), "lint <srcfile% >");

        let bare = ToolConfig::from_values(dir.path(), BTreeMap::new());
        assert!(matches!(
            bare.invoke_template().unwrap_err(),
            ConfigError::MissingKey(key) if key == "tool-invoke"
        ));
    }

    #[test]
    fn test_profile_overrides() {
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        values.insert("tool-type".to_string(), "lizard".to_string());
        values.insert("exclude-extensions".to_string(), "min.js, .map".to_string());
        values.insert("split-artifacts".to_string(), "false".to_string());
        let profile = ToolConfig::from_values("/t", values).profile();
        assert_eq!(profile.excluded_extensions(), [".css", ".xml", ".min.js", ".map"]);
        assert!(!profile.is_splittable("javascript-src"));
    }

    #[test]
    fn test_resolve_tool_config_file() {
        let pkg = TempDir::new().unwrap();
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        values.insert("tool-config-required".to_string(), "true".to_string());
        values.insert("tool-config-file".to_string(), ".eslintrc".to_string());
        values.insert("tool-default-config-file".to_string(), "/opt/eslintrc".to_string());

        let mut fallback = ToolConfig::from_values("/t", values.clone());
        fallback.resolve_tool_config_file(pkg.path()).unwrap();
        assert_eq!(fallback.get("tool-config-file"), Some("/opt/eslintrc"));

        write(pkg.path(), ".eslintrc", "{}");
        let mut own = ToolConfig::from_values("/t", values);
        own.resolve_tool_config_file(pkg.path()).unwrap();
        let expected = pkg.path().join(".eslintrc").to_string_lossy().into_owned();
        assert_eq!(own.get("tool-config-file"), Some(expected.as_str()));
    }

    #[test]
    fn test_settings_from_toml() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            SETTINGS_FILE,
            "max-arg-size = 65536\nresults-dir = \"/tmp/out\"\n",
        );
        let settings = EngineSettings::load(dir.path()).unwrap();
        assert_eq!(settings.max_arg_size, Some(65536));
        assert_eq!(settings.safety_margin, DEFAULT_SAFETY_MARGIN);
        assert_eq!(settings.results_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.budget().arg_max, 65536);
    }

    #[test]
    fn test_settings_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let settings: EngineSettings = EngineSettings::figment(dir.path())
            .merge(Serialized::default("safety-margin", 100))
            .extract()
            .unwrap();
        assert_eq!(settings.max_arg_size, None);
        assert_eq!(settings.safety_margin, 100);
        assert!(settings.budget().arg_max <= crate::budget::DEFAULT_ARG_MAX);
    }
}
