//! Top-level render orchestration and document writing
//!
//! Selects a plan for the render, drives preparation, and writes the final
//! HTML. Full pages get doctype, head and body; snippet renders emit only
//! the asset references and the body markup, for embedding into a host
//! page.

use crate::config::Settings;
use crate::error::PageplanResult;
use crate::instructions::PageInstructions;
use crate::media_cache::MediaCache;
use crate::plans::{select_plan, PreparedAsset, PreparedInstructions, PreparedModule};
use crate::resolver::TemplateResolver;
use crate::template::{html_escape, Context, TemplateEngine};

pub struct Renderer<'a> {
    pub settings: &'a Settings,
    pub resolver: &'a TemplateResolver,
    pub engine: &'a dyn TemplateEngine,
    pub media_cache: &'a MediaCache,
}

impl<'a> Renderer<'a> {
    pub fn new(
        settings: &'a Settings,
        resolver: &'a TemplateResolver,
        engine: &'a dyn TemplateEngine,
        media_cache: &'a MediaCache,
    ) -> Self {
        Self {
            settings,
            resolver,
            engine,
            media_cache,
        }
    }

    /// Prepare the instructions under the selected plan and write HTML
    pub fn render(
        &self,
        instructions: &mut PageInstructions,
        context: &Context,
        render_full_page: bool,
    ) -> PageplanResult<String> {
        let mut plan = select_plan(
            self.settings,
            self.resolver,
            self.engine,
            context,
            self.media_cache,
            render_full_page,
        )?;
        tracing::debug!(plan = plan.base().prefix(), full_page = render_full_page, "rendering");

        let prepared = plan.prepare(instructions)?;
        Ok(write_document(&prepared))
    }
}

/// Write the final HTML for a prepared page
pub fn write_document(prepared: &PreparedInstructions) -> String {
    let mut out = String::new();
    let body = prepared.body.as_deref().unwrap_or("");

    if !prepared.render_full_page {
        // Snippet: asset references plus body, no document shell
        push_css(&mut out, &prepared.css, "");
        out.push_str(body);
        if !body.ends_with('\n') && !body.is_empty() {
            out.push('\n');
        }
        push_modules(&mut out, &prepared.dojo, "");
        push_js(&mut out, &prepared.js, "");
        return out;
    }

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    if let Some(title) = &prepared.title {
        out.push_str(&format!("  <title>{}</title>\n", title));
    }
    for meta in &prepared.meta {
        out.push_str("  <meta");
        for (key, value) in meta {
            out.push_str(&format!(" {}=\"{}\"", key, html_escape(value)));
        }
        out.push_str(" />\n");
    }
    push_css(&mut out, &prepared.css, "  ");
    push_modules(&mut out, &prepared.dojo, "  ");
    push_js(&mut out, &prepared.js, "  ");
    out.push_str("</head>\n<body>\n");
    out.push_str(body);
    if !body.ends_with('\n') && !body.is_empty() {
        out.push('\n');
    }
    out.push_str("</body>\n</html>\n");
    out
}

fn push_css(out: &mut String, assets: &[PreparedAsset], indent: &str) {
    for asset in assets {
        match asset {
            PreparedAsset::Inline { source } => {
                out.push_str(&format!(
                    "{}<style type=\"text/css\">\n{}\n{}</style>\n",
                    indent, source, indent
                ));
            }
            _ => {
                if let Some(location) = asset.location() {
                    out.push_str(&format!(
                        "{}<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\" />\n",
                        indent, location
                    ));
                }
            }
        }
    }
}

fn push_js(out: &mut String, assets: &[PreparedAsset], indent: &str) {
    for asset in assets {
        match asset {
            PreparedAsset::Inline { source } => {
                out.push_str(&format!(
                    "{}<script type=\"text/javascript\">\n{}\n{}</script>\n",
                    indent, source, indent
                ));
            }
            _ => {
                if let Some(location) = asset.location() {
                    out.push_str(&format!(
                        "{}<script type=\"text/javascript\" src=\"{}\"></script>\n",
                        indent, location
                    ));
                }
            }
        }
    }
}

fn push_modules(out: &mut String, modules: &[PreparedModule], indent: &str) {
    for module in modules {
        out.push_str(&format!(
            "{}<script type=\"text/javascript\">\n",
            indent
        ));
        out.push_str(&format!(
            "{}  dojo.registerModulePath(\"{}\", \"{}\");\n",
            indent, module.namespace, module.location
        ));
        for require in &module.require {
            out.push_str(&format!("{}  dojo.require(\"{}\");\n", indent, require));
        }
        out.push_str(&format!("{}</script>\n", indent));
    }
}
