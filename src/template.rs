//! Template rendering seam
//!
//! The host framework owns real template rendering; pageplan only needs a
//! narrow capability: render a source string against a context. The
//! built-in [`MiniTemplate`] engine covers the CLI and tests with
//! `{{ var }}` substitution (HTML-autoescaped, `|safe` opts out) and a
//! `{% require "other.yaml" %}` body tag that merges further page
//! instructions while the body renders.

use std::collections::BTreeMap;

use crate::error::PageplanResult;
use crate::instructions::{PageInstructions, RawInstructions};
use crate::media_cache;
use crate::resolver::TemplateResolver;

/// Render context: variables plus a per-context media token
///
/// The token is issued from a process-wide counter at construction, so two
/// contexts never share one even when their variables are identical.
#[derive(Debug, Clone)]
pub struct Context {
    vars: BTreeMap<String, String>,
    media_token: u64,
}

impl Context {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            media_token: media_cache::issue_token(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn media_token(&self) -> u64 {
        self.media_token
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ctx = Self::new();
        for (k, v) in iter {
            ctx.set(k, v);
        }
        ctx
    }
}

/// Mutable state available to body-rendering hooks
///
/// Hooks may only append to the instruction sequences; earlier entries are
/// never rewritten, which keeps manifest ordering intact.
pub struct BodyScope<'a> {
    pub resolver: &'a TemplateResolver,
    pub instructions: &'a mut PageInstructions,
}

/// Template rendering capability consumed from the host framework
pub trait TemplateEngine {
    /// Render a template source against the context
    fn render(&self, source: &str, ctx: &Context) -> PageplanResult<String>;

    /// Render the page body; engines that support instruction-merging
    /// hooks receive the in-flight accumulator
    fn render_body(
        &self,
        source: &str,
        ctx: &Context,
        scope: &mut BodyScope<'_>,
    ) -> PageplanResult<String> {
        let _ = scope;
        self.render(source, ctx)
    }
}

/// Escape text for HTML element/attribute content
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Minimal built-in template engine
///
/// Supported syntax:
/// - `{{ name }}` substitutes the context variable, HTML-escaped
/// - `{{ name|safe }}` substitutes without escaping
/// - `{% require "app/extra.yaml" %}` (body rendering only) resolves the
///   manifest, renders it against the same context, and appends its
///   directives to the current page instructions
///
/// Unknown variables render as the empty string; unrecognized tags pass
/// through verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiniTemplate;

impl MiniTemplate {
    pub fn new() -> Self {
        Self
    }

    fn render_impl(
        &self,
        source: &str,
        ctx: &Context,
        mut scope: Option<&mut BodyScope<'_>>,
    ) -> PageplanResult<String> {
        let mut out = String::with_capacity(source.len());
        let mut rest = source;

        loop {
            let var_at = rest.find("{{");
            let tag_at = rest.find("{%");

            let (at, is_var) = match (var_at, tag_at) {
                (Some(v), Some(t)) if v < t => (v, true),
                (Some(v), None) => (v, true),
                (_, Some(t)) => (t, false),
                (None, None) => {
                    out.push_str(rest);
                    return Ok(out);
                }
            };

            out.push_str(&rest[..at]);
            rest = &rest[at..];

            let close = if is_var { "}}" } else { "%}" };
            let Some(end) = rest.find(close) else {
                // Unterminated marker, emit as-is
                out.push_str(rest);
                return Ok(out);
            };

            let inner = rest[2..end].trim();
            if is_var {
                out.push_str(&self.substitute(inner, ctx));
            } else if let Some(name) = parse_require_tag(inner) {
                if let Some(scope) = scope.as_deref_mut() {
                    self.merge_required(name, ctx, scope)?;
                }
            } else {
                // Not a tag we know, keep it verbatim
                out.push_str(&rest[..end + 2]);
            }

            rest = &rest[end + 2..];
        }
    }

    fn substitute(&self, expr: &str, ctx: &Context) -> String {
        let (name, safe) = match expr.split_once('|') {
            Some((name, filter)) => (name.trim(), filter.trim() == "safe"),
            None => (expr, false),
        };

        let value = ctx.get(name).unwrap_or("");
        if safe {
            value.to_string()
        } else {
            html_escape(value)
        }
    }

    /// The "add extra YAML" hook: merge another manifest mid-body-render
    fn merge_required(
        &self,
        name: &str,
        ctx: &Context,
        scope: &mut BodyScope<'_>,
    ) -> PageplanResult<()> {
        let (source, _origin) = scope.resolver.find(name)?;
        let rendered = self.render(&source, ctx)?;
        let raw = RawInstructions::parse(&rendered)?;
        scope.instructions.add(raw, name);
        Ok(())
    }
}

fn parse_require_tag(inner: &str) -> Option<&str> {
    let rest = inner.strip_prefix("require")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

impl TemplateEngine for MiniTemplate {
    fn render(&self, source: &str, ctx: &Context) -> PageplanResult<String> {
        self.render_impl(source, ctx, None)
    }

    fn render_body(
        &self,
        source: &str,
        ctx: &Context,
        scope: &mut BodyScope<'_>,
    ) -> PageplanResult<String> {
        self.render_impl(source, ctx, Some(scope))
    }
}
