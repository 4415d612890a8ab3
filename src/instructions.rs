//! Page instruction data model
//!
//! A page is described by one or more YAML manifests. Each manifest parses
//! into `RawInstructions`; an accumulating `PageInstructions` merges them in
//! order. Sequences (`js`, `css`, `meta`, `dojo`) are append-only; scalar
//! fields (`title`, `body`) keep the first value seen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PageplanError, PageplanResult};

/// One entry under `js:` or `css:` in a manifest
///
/// Exactly one of `url`, `static` or `inline` must be present; `process`
/// names a registered transform and `include: false` suppresses the entry
/// from the rendered output while keeping its side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AssetDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, rename = "static", skip_serializing_if = "Option::is_none")]
    pub static_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,

    /// Named transform applied to the asset source (e.g. `clevercss`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,

    /// `false` keeps the asset out of the rendered page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<bool>,

    /// `true` renders a static asset per-request into the media cache
    /// instead of copying it to the on-disk cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<bool>,
}

impl AssetDirective {
    /// Convenience constructor for a `static:` directive
    pub fn static_asset(name: impl Into<String>) -> Self {
        Self {
            static_: Some(name.into()),
            ..Self::default()
        }
    }

    /// Convenience constructor for a `url:` directive
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Convenience constructor for an `inline:` directive
    pub fn inline_asset(name: impl Into<String>) -> Self {
        Self {
            inline: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether this directive should appear in the rendered output
    pub fn included(&self) -> bool {
        self.include.unwrap_or(true)
    }

    /// Human-readable form for error messages
    pub fn describe(&self) -> String {
        serde_yaml_ng::to_string(self)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// One entry under `dojo:`, a module namespace with an asset tree
///
/// All three fields are required, but the requirement is enforced at
/// prepare time so one manifest error surfaces per violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModuleDirective {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub require: Option<Vec<String>>,
}

impl ModuleDirective {
    /// Check the required fields, naming the first missing one
    pub fn validate(&self) -> PageplanResult<(&str, &str, &[String])> {
        let namespace = self.namespace.as_deref().ok_or_else(|| missing("namespace"))?;
        let location = self.location.as_deref().ok_or_else(|| missing("location"))?;
        let require = self.require.as_deref().ok_or_else(|| missing("require"))?;
        Ok((namespace, location, require))
    }
}

fn missing(field: &str) -> PageplanError {
    PageplanError::MissingField {
        field: field.to_string(),
        section: "dojo".to_string(),
    }
}

/// A single `meta:` entry is an open key/value mapping
/// (e.g. `{http-equiv: refresh, content: "30"}`)
pub type MetaTag = BTreeMap<String, String>;

/// What one YAML manifest parses to
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct RawInstructions {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub js: Vec<AssetDirective>,

    #[serde(default)]
    pub css: Vec<AssetDirective>,

    #[serde(default)]
    pub meta: Vec<MetaTag>,

    #[serde(default)]
    pub dojo: Vec<ModuleDirective>,
}

impl RawInstructions {
    /// Parse a manifest source (already template-rendered by the caller)
    pub fn parse(source: &str) -> PageplanResult<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(source)?)
    }
}

/// The merged manifest driving one page render
///
/// Built from one or more manifests via [`PageInstructions::add`], consumed
/// exactly once by a plan. Body-rendering hooks may keep appending while
/// the body renders; earlier entries are never rewritten.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageInstructions {
    pub title: Option<String>,
    pub body: Option<String>,
    pub js: Vec<AssetDirective>,
    pub css: Vec<AssetDirective>,
    pub meta: Vec<MetaTag>,
    pub dojo: Vec<ModuleDirective>,

    /// Manifest names that contributed to this page, in merge order
    pub yaml: Vec<String>,
}

impl PageInstructions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one parsed manifest into the accumulator
    ///
    /// Sequences append in manifest order; `title`/`body` keep the first
    /// value seen across manifests.
    pub fn add(&mut self, raw: RawInstructions, source_name: &str) {
        if self.title.is_none() {
            self.title = raw.title;
        }
        if self.body.is_none() {
            self.body = raw.body;
        }
        self.js.extend(raw.js);
        self.css.extend(raw.css);
        self.meta.extend(raw.meta);
        self.dojo.extend(raw.dojo);
        self.yaml.push(source_name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_deserialize_url() {
        let yaml = "url: http://somesite.com/somefile.js";
        let d: AssetDirective = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(d.url.as_deref(), Some("http://somesite.com/somefile.js"));
        assert!(d.static_.is_none());
        assert!(d.included());
    }

    #[test]
    fn test_directive_deserialize_static_with_process() {
        let yaml = "static: blog/media/css/screen.css\nprocess: clevercss";
        let d: AssetDirective = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(d.static_.as_deref(), Some("blog/media/css/screen.css"));
        assert_eq!(d.process.as_deref(), Some("clevercss"));
    }

    #[test]
    fn test_directive_include_false() {
        let yaml = "static: blog/media/js/helper.js\ninclude: false";
        let d: AssetDirective = serde_yaml_ng::from_str(yaml).unwrap();

        assert!(!d.included());
    }

    #[test]
    fn test_raw_instructions_parse_full() {
        let yaml = r#"
title: My page
body: blog/index.html
js:
  - url: http://cdn.example.com/lib.js
  - static: blog/media/js/page.js
css:
  - static: blog/media/css/screen.css
meta:
  - http-equiv: test
    content: test-content
dojo:
  - namespace: Blog.Page
    location: blog/media/js
    require:
      - Blog.Page.Controller
"#;
        let raw = RawInstructions::parse(yaml).unwrap();

        assert_eq!(raw.title.as_deref(), Some("My page"));
        assert_eq!(raw.body.as_deref(), Some("blog/index.html"));
        assert_eq!(raw.js.len(), 2);
        assert_eq!(raw.css.len(), 1);
        assert_eq!(raw.meta[0]["http-equiv"], "test");
        assert_eq!(
            raw.dojo[0].require.as_deref().unwrap(),
            ["Blog.Page.Controller"]
        );
    }

    #[test]
    fn test_raw_instructions_parse_empty() {
        let raw = RawInstructions::parse("").unwrap();
        assert!(raw.title.is_none());
        assert!(raw.js.is_empty());
    }

    #[test]
    fn test_add_merges_sequences_in_order() {
        let mut pi = PageInstructions::new();
        let first = RawInstructions {
            body: Some("page.html".into()),
            js: vec![AssetDirective::static_asset("a.js")],
            ..Default::default()
        };
        let second = RawInstructions {
            title: Some("Later".into()),
            js: vec![AssetDirective::static_asset("b.js")],
            ..Default::default()
        };

        pi.add(first, "one.yaml");
        pi.add(second, "two.yaml");

        assert_eq!(pi.body.as_deref(), Some("page.html"));
        assert_eq!(pi.title.as_deref(), Some("Later"));
        assert_eq!(pi.js[0].static_.as_deref(), Some("a.js"));
        assert_eq!(pi.js[1].static_.as_deref(), Some("b.js"));
        assert_eq!(pi.yaml, vec!["one.yaml", "two.yaml"]);
    }

    #[test]
    fn test_add_keeps_first_scalar_values() {
        let mut pi = PageInstructions::new();
        pi.add(
            RawInstructions {
                title: Some("First".into()),
                ..Default::default()
            },
            "one.yaml",
        );
        pi.add(
            RawInstructions {
                title: Some("Second".into()),
                ..Default::default()
            },
            "two.yaml",
        );

        assert_eq!(pi.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_module_directive_validate_missing_namespace() {
        let module = ModuleDirective {
            location: Some("blog/media/js".into()),
            require: Some(vec![]),
            ..Default::default()
        };

        let err = module.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required field 'namespace' in dojo entry"
        );
    }

    #[test]
    fn test_module_directive_validate_ok() {
        let module = ModuleDirective {
            namespace: Some("Blog.Page".into()),
            location: Some("blog/media/js".into()),
            require: Some(vec!["Blog.Page.Controller".into()]),
        };

        let (namespace, location, require) = module.validate().unwrap();
        assert_eq!(namespace, "Blog.Page");
        assert_eq!(location, "blog/media/js");
        assert_eq!(require.len(), 1);
    }
}
