//! Separate-everything strategy
//!
//! Every asset is served as its own file. Referenced asset trees are
//! mirrored wholesale, then each directive is prepared individually in
//! manifest order. No merging, no minification; deduplication collapses
//! repeated directives resolving to the same asset.

use crate::config::Settings;
use crate::error::PageplanResult;
use crate::instructions::PageInstructions;
use crate::media_cache::MediaCache;
use crate::resolver::TemplateResolver;
use crate::template::{Context, TemplateEngine};

use super::{AssetKind, Plan, PlanBase};

/// Asset trees mirrored for the js section
pub(super) const JS_TREES: &[&str] = &["media/js/templates"];
/// Asset trees mirrored for the css section
pub(super) const CSS_TREES: &[&str] = &["media/img"];

pub struct SeparateEverything<'a> {
    base: PlanBase<'a>,
}

impl<'a> SeparateEverything<'a> {
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
                "se",
            ),
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
        for directive in directives {
            self.base.prepare_directive(directive, kind)?;
        }
        Ok(())
    }
}

impl<'a> Plan<'a> for SeparateEverything<'a> {
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
