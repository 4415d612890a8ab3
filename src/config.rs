//! Configuration surface
//!
//! Process-wide settings loaded from a TOML file. Unknown keys are
//! collected as non-fatal warnings with a spelling suggestion instead of
//! being rejected. Environment variables with the `PAGEPLAN_` prefix
//! override individual values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PageplanError, PageplanResult};

/// Non-fatal configuration warning surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub file: PathBuf,
    pub line: Option<usize>,
    pub suggestion: Option<String>,
}

impl ConfigWarning {
    /// Build a warning for an unknown key path reported during
    /// deserialization, locating the key in the file text and attaching
    /// the closest known key as a spelling suggestion.
    fn unknown_key(key_path: &str, file: &Path, content: &str) -> Self {
        let key = key_path.rsplit('.').next().unwrap_or(key_path).to_string();
        let line = content
            .lines()
            .position(|l| l.contains(key.as_str()))
            .map(|i| i + 1);

        Self {
            suggestion: closest_known_key(&key),
            line,
            file: file.to_path_buf(),
            key,
        }
    }
}

/// Plan selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlansConfig {
    /// Named plan registry: configured name -> strategy id
    /// (`separate` or `fewest`)
    #[serde(default)]
    pub named: BTreeMap<String, String>,

    /// Which named plan full-page renders use. Unset falls back to the
    /// separate-everything strategy unless `strict` is enabled.
    #[serde(default)]
    pub default: Option<String>,
}

/// Runtime-tunable plan behavior
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanOptions {
    #[serde(default = "default_true")]
    pub minify_javascript: bool,

    #[serde(default)]
    pub unroll_recently_modified: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            minify_javascript: true,
            unroll_recently_modified: false,
        }
    }
}

impl PlanOptions {
    /// Set an option by name, rejecting unknown names
    pub fn set(&mut self, name: &str, value: bool) -> PageplanResult<()> {
        match name {
            "minify_javascript" => self.minify_javascript = value,
            "unroll_recently_modified" => self.unroll_recently_modified = value,
            _ => {
                return Err(PageplanError::UnknownPlanOption {
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("media/ppcache")
}

fn default_cache_url() -> String {
    "/media/ppcache/".to_string()
}

fn default_media_token_prefix() -> String {
    "ppmedia".to_string()
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Filesystem root the asset cache is written under
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// URL prefix cached assets are served from (must end with `/`)
    #[serde(default = "default_cache_url")]
    pub cache_url: String,

    /// First URL path segment for token-addressed rendered assets
    #[serde(default = "default_media_token_prefix")]
    pub media_token_prefix: String,

    /// Ordered template/asset root directories searched by the resolver
    #[serde(default)]
    pub template_dirs: Vec<PathBuf>,

    /// Missing plan configuration is fatal when strict; permissive mode
    /// falls back to the separate-everything strategy
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub plans: PlansConfig,

    #[serde(default)]
    pub options: PlanOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            cache_url: default_cache_url(),
            media_token_prefix: default_media_token_prefix(),
            template_dirs: Vec::new(),
            strict: false,
            plans: PlansConfig::default(),
            options: PlanOptions::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> PageplanResult<Self> {
        let (settings, _warnings) = Self::load_with_warnings(path)?;
        Ok(settings)
    }

    /// Load settings and collect non-fatal warnings (e.g. unknown keys)
    pub fn load_with_warnings(path: &Path) -> PageplanResult<(Self, Vec<ConfigWarning>)> {
        let content = fs::read_to_string(path)?;

        let mut unknown_paths: Vec<String> = Vec::new();
        let deserializer = toml::de::Deserializer::new(&content);

        let settings: Settings = serde_ignored::deserialize(deserializer, |p| {
            unknown_paths.push(p.to_string());
        })
        .map_err(|e| PageplanError::InvalidConfig {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let warnings = unknown_paths
            .iter()
            .map(|p| ConfigWarning::unknown_key(p, path, &content))
            .collect();

        Ok((settings, warnings))
    }

    /// Apply environment variable overrides (PAGEPLAN_* prefix)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("PAGEPLAN_CACHE_ROOT") {
            self.cache_root = PathBuf::from(root);
        }

        if let Ok(url) = std::env::var("PAGEPLAN_CACHE_URL") {
            self.cache_url = url;
        }

        if let Ok(plan) = std::env::var("PAGEPLAN_PLAN") {
            self.plans.default = Some(plan);
        }

        if let Ok(val) = std::env::var("PAGEPLAN_STRICT") {
            self.strict = val.to_lowercase() != "false" && val != "0";
        }

        self
    }

    /// Resolve the strategy id behind the configured default plan name,
    /// if any plan is configured at all
    pub fn default_strategy(&self) -> Option<&str> {
        let name = self.plans.default.as_deref()?;
        Some(self.plans.named.get(name).map(String::as_str).unwrap_or(name))
    }
}

/// Every key a well-formed configuration file may contain
const KNOWN_KEYS: &[&str] = &[
    "cache_root",
    "cache_url",
    "media_token_prefix",
    "template_dirs",
    "strict",
    "plans",
    "named",
    "default",
    "options",
    "minify_javascript",
    "unroll_recently_modified",
];

/// The known key nearest to `unknown`, if any is close enough to look
/// like a typo
fn closest_known_key(unknown: &str) -> Option<String> {
    KNOWN_KEYS
        .iter()
        .map(|candidate| (edit_distance(unknown, candidate), *candidate))
        .min_by_key(|(distance, _)| *distance)
        .filter(|(distance, _)| *distance <= 2)
        .map(|(_, candidate)| candidate.to_string())
}

/// Levenshtein distance over bytes, single-row formulation
fn edit_distance(a: &str, b: &str) -> usize {
    let b = b.as_bytes();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.bytes().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (j, &cb) in b.iter().enumerate() {
            let substitution = if ca == cb { diagonal } else { diagonal + 1 };
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(diagonal + 1).min(row[j] + 1);
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pageplan.toml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cache_root, PathBuf::from("media/ppcache"));
        assert_eq!(settings.cache_url, "/media/ppcache/");
        assert!(!settings.strict);
        assert!(settings.options.minify_javascript);
        assert!(!settings.options.unroll_recently_modified);
        assert!(settings.default_strategy().is_none());
    }

    #[test]
    fn test_load_full_config() {
        let (_dir, path) = write_config(
            r#"
cache_root = "/var/www/cache"
cache_url = "http://localhost:8000/media/cache/"
strict = true

[plans]
default = "rollup"

[plans.named]
rollup = "fewest"

[options]
minify_javascript = false
unroll_recently_modified = true
"#,
        );

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.cache_root, PathBuf::from("/var/www/cache"));
        assert!(settings.strict);
        assert_eq!(settings.default_strategy(), Some("fewest"));
        assert!(!settings.options.minify_javascript);
        assert!(settings.options.unroll_recently_modified);
    }

    #[test]
    fn test_default_strategy_without_mapping() {
        let mut settings = Settings::default();
        settings.plans.default = Some("separate".to_string());
        assert_eq!(settings.default_strategy(), Some("separate"));
    }

    #[test]
    fn test_unknown_key_warns_with_suggestion() {
        let (_dir, path) = write_config("cache_rot = \"/tmp/x\"\n");

        let (_settings, warnings) = Settings::load_with_warnings(&path).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "cache_rot");
        assert_eq!(warnings[0].line, Some(1));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("cache_root"));
    }

    #[test]
    fn test_unknown_key_far_from_anything_has_no_suggestion() {
        let (_dir, path) = write_config("zzzzzzzz = 1\n");

        let (_settings, warnings) = Settings::load_with_warnings(&path).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "zzzzzzzz");
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("cache_rot", "cache_root"), 1);
        assert_eq!(edit_distance("strict", "strict"), 0);
        assert_eq!(edit_distance("", "plans"), 5);
        assert_eq!(edit_distance("defualt", "default"), 2);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let (_dir, path) = write_config("cache_root = [not toml");

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, PageplanError::InvalidConfig { .. }));
    }

    #[test]
    fn test_env_overrides_apply() {
        std::env::set_var("PAGEPLAN_CACHE_ROOT", "/srv/override");
        std::env::set_var("PAGEPLAN_STRICT", "1");

        let settings = Settings::default().with_env_overrides();

        std::env::remove_var("PAGEPLAN_CACHE_ROOT");
        std::env::remove_var("PAGEPLAN_STRICT");

        assert_eq!(settings.cache_root, PathBuf::from("/srv/override"));
        assert!(settings.strict);
    }

    #[test]
    fn test_plan_options_set_unknown_rejected() {
        let mut options = PlanOptions::default();
        let err = options.set("not_a_valid_option", true).unwrap_err();
        assert!(matches!(err, PageplanError::UnknownPlanOption { .. }));
    }

    #[test]
    fn test_plan_options_set_known() {
        let mut options = PlanOptions::default();
        options.set("unroll_recently_modified", true).unwrap();
        options.set("minify_javascript", false).unwrap();
        assert!(options.unroll_recently_modified);
        assert!(!options.minify_javascript);
    }
}
