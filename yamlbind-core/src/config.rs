use std::path::PathBuf;

use log::LevelFilter;
use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Behavior switches applied to a whole load or save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigFlags {
    /// Skip mapping keys the schema does not know instead of failing.
    pub ignore_unknown_keys: bool,
    /// Emit collections in block style unless the schema says otherwise.
    pub style_block: bool,
    /// Emit collections in flow style unless the schema says otherwise.
    pub style_flow: bool,
    /// Emit `---` and `...` around the document.
    pub document_delimiters: bool,
    /// Compare keys and names case-insensitively unless the schema says otherwise.
    pub case_insensitive: bool,
    /// Reject every alias with [`Error::Alias`](crate::Error::Alias).
    pub no_alias: bool,
}

/// Runtime configuration for one load, save or free call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Records above this level are dropped before they reach the `log` facade.
    pub log_level: LevelFilter,
    pub flags: ConfigFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Warn,
            flags: ConfigFlags::default(),
        }
    }
}

impl Config {
    pub fn new(flags: ConfigFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }
}

#[derive(Deserialize, Default)]
struct SettingsFile {
    #[serde(default)]
    log: LogSection,
    #[serde(default)]
    load: LoadSection,
    #[serde(default)]
    save: SaveSection,
}

#[derive(Deserialize, Default)]
struct LogSection {
    level: Option<String>,
}

#[derive(Deserialize, Default)]
struct LoadSection {
    ignore_unknown_keys: Option<bool>,
    case_insensitive: Option<bool>,
    aliases: Option<bool>,
}

#[derive(Deserialize, Default)]
struct SaveSection {
    style: Option<String>,
    document_delimiters: Option<bool>,
}

/// Defaults embedded in the binary, overridden by the user's config file.
pub struct Settings {
    log: LogSection,
    load: LoadSection,
    save: SaveSection,
}

impl Settings {
    pub fn load() -> Self {
        let mut settings = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<SettingsFile>(&contents) {
                        Ok(user) => settings.merge(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        settings
    }

    /// Embedded defaults merged with `text`.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let user: SettingsFile = toml::from_str(text)?;
        let mut settings = Self::embedded();
        settings.merge(user);
        Ok(settings)
    }

    fn embedded() -> Self {
        let base: SettingsFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        Self {
            log: base.log,
            load: base.load,
            save: base.save,
        }
    }

    fn merge(&mut self, user: SettingsFile) {
        if user.log.level.is_some() {
            self.log.level = user.log.level;
        }
        if user.load.ignore_unknown_keys.is_some() {
            self.load.ignore_unknown_keys = user.load.ignore_unknown_keys;
        }
        if user.load.case_insensitive.is_some() {
            self.load.case_insensitive = user.load.case_insensitive;
        }
        if user.load.aliases.is_some() {
            self.load.aliases = user.load.aliases;
        }
        if user.save.style.is_some() {
            self.save.style = user.save.style;
        }
        if user.save.document_delimiters.is_some() {
            self.save.document_delimiters = user.save.document_delimiters;
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log
            .level
            .as_deref()
            .and_then(parse_level)
            .unwrap_or(LevelFilter::Warn)
    }

    pub fn config(&self) -> Config {
        let style = self.save.style.as_deref().and_then(parse_style);
        Config {
            log_level: self.log_level(),
            flags: ConfigFlags {
                ignore_unknown_keys: self.load.ignore_unknown_keys.unwrap_or(false),
                case_insensitive: self.load.case_insensitive.unwrap_or(false),
                no_alias: !self.load.aliases.unwrap_or(true),
                style_block: style == Some(Style::Block),
                style_flow: style == Some(Style::Flow),
                document_delimiters: self.save.document_delimiters.unwrap_or(false),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Default,
    Block,
    Flow,
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("yamlbind").join("config.toml"))
}

fn parse_level(s: &str) -> Option<LevelFilter> {
    match s.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn parse_style(s: &str) -> Option<Style> {
    match s.to_lowercase().as_str() {
        "default" | "any" => Some(Style::Default),
        "block" => Some(Style::Block),
        "flow" => Some(Style::Flow),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        let config = settings.config();
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert_eq!(config.flags, ConfigFlags::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn user_overrides_merge() {
        let settings = Settings::from_toml_str(
            r#"
            [log]
            level = "DEBUG"

            [load]
            aliases = false

            [save]
            style = "flow"
            "#,
        )
        .unwrap();
        let config = settings.config();
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.flags.no_alias);
        assert!(config.flags.style_flow);
        assert!(!config.flags.style_block);
        // untouched keys keep the embedded value
        assert!(!config.flags.ignore_unknown_keys);
        assert!(!config.flags.document_delimiters);
    }

    #[test]
    fn malformed_override_is_an_error() {
        assert!(Settings::from_toml_str("[load]\naliases = \"sometimes\"").is_err());
    }

    #[test]
    fn parse_level_and_style() {
        assert_eq!(parse_level("warning"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("Trace"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("loud"), None);
        assert_eq!(parse_style("BLOCK"), Some(Style::Block));
        assert_eq!(parse_style("any"), Some(Style::Default));
        assert_eq!(parse_style("sideways"), None);
    }

    #[test]
    fn unknown_style_falls_back_to_default() {
        let config = Settings::from_toml_str("[save]\nstyle = \"sideways\"")
            .unwrap()
            .config();
        assert!(!config.flags.style_block);
        assert!(!config.flags.style_flow);
    }
}
