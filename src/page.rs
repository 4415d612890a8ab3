//! Page assembly: manifests in, HTML out
//!
//! Each manifest source is rendered as a template against the context
//! before parsing, so directives may interpolate context variables. Later
//! manifests fill in whatever earlier ones left unset; a page whose body
//! and title live in different files is still renderable.

use crate::config::Settings;
use crate::error::PageplanResult;
use crate::instructions::{PageInstructions, RawInstructions};
use crate::media_cache::MediaCache;
use crate::renderer::Renderer;
use crate::resolver::TemplateResolver;
use crate::template::{Context, TemplateEngine};

pub struct PageAssembly<'a> {
    settings: &'a Settings,
    resolver: &'a TemplateResolver,
    engine: &'a dyn TemplateEngine,
    media_cache: &'a MediaCache,
}

impl<'a> PageAssembly<'a> {
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

    /// Load and merge the named manifests, in order
    pub fn assemble(
        &self,
        manifests: &[String],
        context: &Context,
    ) -> PageplanResult<PageInstructions> {
        let mut instructions = PageInstructions::new();

        for name in manifests {
            let (source, _origin) = self.resolver.find(name)?;
            let rendered = self.engine.render(&source, context)?;
            let raw = RawInstructions::parse(&rendered)?;
            instructions.add(raw, name);
        }

        Ok(instructions)
    }

    /// Assemble the manifests and render the page
    pub fn render(
        &self,
        manifests: &[String],
        context: &Context,
        render_full_page: bool,
    ) -> PageplanResult<String> {
        let mut instructions = self.assemble(manifests, context)?;
        let renderer = Renderer::new(
            self.settings,
            self.resolver,
            self.engine,
            self.media_cache,
        );
        renderer.render(&mut instructions, context, render_full_page)
    }
}
