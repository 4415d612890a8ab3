//! Fewest-files strategy: content-hashed rollup artifacts
//!
//! All non-external directives of a kind are concatenated, in manifest
//! order, into one artifact named by the sha256 of its final bytes and
//! written under the plan's `out/` cache directory. An artifact that
//! already exists is never rewritten, so an unchanged page leaves the
//! cache directory untouched. External `url` directives keep their
//! manifest position; the rollup record sits where the first rolled
//! directive appeared.
//!
//! With `unroll_recently_modified` enabled, a static directive whose
//! backing file changed after process start is served individually
//! instead of rolled, which keeps edit-reload cycles from churning out a
//! new artifact per save. Inline content is structurally part of the
//! artifact and cannot be unrolled; asking for it is a bad plan
//! situation.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::error::{PageplanError, PageplanResult};
use crate::instructions::{AssetDirective, PageInstructions};
use crate::media_cache::MediaCache;
use crate::resolver::TemplateResolver;
use crate::template::{Context, TemplateEngine};

use super::separate::{CSS_TREES, JS_TREES};
use super::{AssetKind, Plan, PlanBase, PreparedAsset};

static PROCESS_START: OnceLock<DateTime<Utc>> = OnceLock::new();

/// When this process began, for recently-modified checks
pub fn process_start() -> DateTime<Utc> {
    *PROCESS_START.get_or_init(Utc::now)
}

/// An asset's place in the rollup pass
enum Piece {
    /// Served individually at its manifest position
    Record(Option<PreparedAsset>),
    /// Concatenated into the combined artifact
    Rolled(String),
}

pub struct FewestFiles<'a> {
    base: PlanBase<'a>,
    started: DateTime<Utc>,
}

impl<'a> FewestFiles<'a> {
    pub fn new(
        settings: &'a Settings,
        resolver: &'a TemplateResolver,
        engine: &'a dyn TemplateEngine,
        context: &'a Context,
        media_cache: &'a MediaCache,
        render_full_page: bool,
    ) -> Self {
        Self {
            base: PlanBase::new(
                settings,
                resolver,
                engine,
                context,
                media_cache,
                render_full_page,
                "ff",
            ),
            started: process_start(),
        }
    }

    fn prepare_section(
        &mut self,
        instructions: &PageInstructions,
        kind: AssetKind,
        trees: &[&str],
    ) -> PageplanResult<()> {
        self.base.prepare_assets(instructions, trees)?;

        let directives = match kind {
            AssetKind::Js => &instructions.js,
            AssetKind::Css => &instructions.css,
        };

        let mut seen: Vec<&str> = Vec::new();
        let mut pieces: Vec<Piece> = Vec::new();

        for directive in directives {
            let Some(key) = directive_key(directive) else {
                return Err(PageplanError::MissingSource {
                    directive: directive.describe(),
                });
            };
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            pieces.push(self.prepare_piece(directive, kind)?);
        }

        let rolled: Vec<&str> = pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Rolled(content) => Some(content.as_str()),
                Piece::Record(_) => None,
            })
            .collect();

        let mut rollup_record = if rolled.is_empty() {
            None
        } else {
            Some(self.write_artifact(&rolled.join("\n"), kind)?)
        };

        for piece in pieces {
            match piece {
                Piece::Record(Some(record)) => self.base.push_prepared(kind, record),
                Piece::Record(None) => {}
                Piece::Rolled(_) => {
                    if let Some(record) = rollup_record.take() {
                        self.base.push_prepared(kind, record);
                    }
                }
            }
        }

        Ok(())
    }

    /// Decide how one directive participates in the rollup
    fn prepare_piece(
        &mut self,
        directive: &AssetDirective,
        kind: AssetKind,
    ) -> PageplanResult<Piece> {
        if directive.url.is_some() {
            if !directive.included() {
                return Ok(Piece::Record(None));
            }
            return Ok(Piece::Record(Some(self.base.build_record(directive)?)));
        }

        if directive.render.unwrap_or(false) {
            // Per-request rendered assets can never be part of a shared
            // artifact; serve them from the media cache as usual
            let record = self.base.build_record(directive)?;
            let record = directive.included().then_some(record);
            return Ok(Piece::Record(record));
        }

        if self.base.settings.options.unroll_recently_modified {
            if let Some(name) = directive.static_.as_deref() {
                if self.recently_modified(name) {
                    tracing::debug!(asset = name, "recently modified, serving unrolled");
                    let record = self.base.build_record(directive)?;
                    let record = directive.included().then_some(record);
                    return Ok(Piece::Record(record));
                }
            } else if let Some(name) = directive.inline.as_deref() {
                if self.recently_modified(name) {
                    return Err(PageplanError::BadPlanSituation {
                        message: format!(
                            "'{}' was recently modified but inline content cannot be unrolled",
                            name
                        ),
                    });
                }
            }
        }

        let (name, content) = self.base.directive_content(directive)?;
        if !directive.included() {
            // Processing side effects already happened; the content simply
            // stays out of the artifact
            return Ok(Piece::Record(None));
        }
        let content = match kind {
            AssetKind::Css => rewrite_relative_urls(&content, &name, &self.base),
            AssetKind::Js => content,
        };
        Ok(Piece::Rolled(content))
    }

    fn recently_modified(&self, name: &str) -> bool {
        match self.base.source_mtime(name) {
            Some(mtime) => DateTime::<Utc>::from(mtime) > self.started,
            None => false,
        }
    }

    /// Write the combined artifact under `out/`, named by content hash
    ///
    /// An existing artifact is a content-addressed hit and is left alone.
    fn write_artifact(
        &self,
        combined: &str,
        kind: AssetKind,
    ) -> PageplanResult<PreparedAsset> {
        let content = match kind {
            AssetKind::Js if self.base.settings.options.minify_javascript => {
                minify_javascript(combined)
            }
            _ => combined.to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let relpath = format!("out/{:x}.{}", hasher.finalize(), kind.extension());

        let dest = self.base.cache_dir().join(&relpath);
        if !dest.is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, content.as_bytes())?;
            tracing::debug!(artifact = %dest.display(), "wrote rollup artifact");
        }

        Ok(PreparedAsset::Cached {
            location: self.base.cache_url(&relpath),
            filename: relpath,
        })
    }
}

/// Rewrite relative `url(...)` references in CSS headed for the artifact
///
/// The artifact lives under `out/`, so a reference that was valid next to
/// its source file would dangle. Relative references are resolved against
/// the source file's directory and replaced with the absolute cache URL
/// of the mirrored tree. Absolute, scheme-qualified and data URLs pass
/// through untouched.
fn rewrite_relative_urls(content: &str, asset_name: &str, base: &PlanBase<'_>) -> String {
    let dir = Path::new(asset_name).parent().unwrap_or(Path::new(""));
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(at) = rest.find("url(") {
        let Some(close) = rest[at..].find(')') else {
            break;
        };
        let close = at + close;
        let reference = rest[at + 4..close]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');

        out.push_str(&rest[..at]);
        if is_external_reference(reference) {
            out.push_str(&rest[at..=close]);
        } else {
            out.push_str("url(");
            out.push_str(&base.cache_url(&resolve_reference(dir, reference)));
            out.push(')');
        }
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    out
}

fn is_external_reference(reference: &str) -> bool {
    reference.starts_with('/') || reference.starts_with("data:") || reference.contains("://")
}

/// Join a relative reference onto a directory, collapsing `.` and `..`
fn resolve_reference(dir: &Path, reference: &str) -> String {
    let mut segments: Vec<&str> = dir.iter().filter_map(|c| c.to_str()).collect();
    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn directive_key(directive: &AssetDirective) -> Option<&str> {
    directive
        .url
        .as_deref()
        .or(directive.static_.as_deref())
        .or(directive.inline.as_deref())
}

/// Conservative line-based JavaScript minification
///
/// Drops blank lines and whole-line `//` comments and trims trailing
/// whitespace. Never touches anything mid-line, so string literals and
/// URLs survive intact.
fn minify_javascript(source: &str) -> String {
    source
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl<'a> Plan<'a> for FewestFiles<'a> {
    fn base(&mut self) -> &mut PlanBase<'a> {
        &mut self.base
    }

    fn prepare_js(&mut self, instructions: &PageInstructions) -> PageplanResult<()> {
        self.prepare_section(instructions, AssetKind::Js, JS_TREES)
    }

    fn prepare_css(&mut self, instructions: &PageInstructions) -> PageplanResult<()> {
        self.prepare_section(instructions, AssetKind::Css, CSS_TREES)
    }
}
