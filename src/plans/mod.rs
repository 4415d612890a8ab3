//! Deploy plans: per-page asset bundling strategies
//!
//! A plan is constructed per render with the page context and a
//! full-page-vs-snippet flag. It owns a cache subtree namespaced by a short
//! plan prefix so distinct strategies never collide on disk. The shared
//! machinery lives in [`PlanBase`]; concrete strategies implement
//! [`Plan::prepare_js`] and [`Plan::prepare_css`] on top of it.

pub mod rollup;
pub mod separate;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::Settings;
use crate::error::{PageplanError, PageplanResult};
use crate::instructions::{AssetDirective, MetaTag, PageInstructions};
use crate::media_cache::{self, MediaCache};
use crate::mirror;
use crate::processor;
use crate::resolver::TemplateResolver;
use crate::template::{html_escape, BodyScope, Context, TemplateEngine};

pub use rollup::FewestFiles;
pub use separate::SeparateEverything;

/// Which asset section a directive belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Js,
    Css,
}

impl AssetKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Css => "css",
        }
    }
}

/// One prepared js/css record, ready for the document writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedAsset {
    /// External reference passed through verbatim
    Url { location: String },
    /// Asset materialized in the on-disk cache
    Cached { location: String, filename: String },
    /// Source embedded directly into the page
    Inline { source: String },
}

impl PreparedAsset {
    /// URL the asset is served from, if it has one
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Url { location } | Self::Cached { location, .. } => Some(location),
            Self::Inline { .. } => None,
        }
    }

    /// Dedup key: two records with the same identity collapse to one
    fn identity(&self) -> &str {
        match self {
            Self::Url { location } | Self::Cached { location, .. } => location,
            Self::Inline { source } => source,
        }
    }
}

/// A dojo-style module with its mirrored asset tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedModule {
    pub namespace: String,
    pub location: String,
    pub require: Vec<String>,
}

/// Everything a plan hands to the renderer
#[derive(Debug, Clone, Default)]
pub struct PreparedInstructions {
    pub title: Option<String>,
    pub body: Option<String>,
    pub js: Vec<PreparedAsset>,
    pub css: Vec<PreparedAsset>,
    pub meta: Vec<MetaTag>,
    pub dojo: Vec<PreparedModule>,
    pub render_full_page: bool,
}

/// Shared per-render plan state and directive machinery
pub struct PlanBase<'a> {
    pub settings: &'a Settings,
    pub resolver: &'a TemplateResolver,
    pub engine: &'a dyn TemplateEngine,
    pub context: &'a Context,
    pub media_cache: &'a MediaCache,
    pub render_full_page: bool,
    prefix: &'static str,
    prepared: PreparedInstructions,
}

impl<'a> PlanBase<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: &'a Settings,
        resolver: &'a TemplateResolver,
        engine: &'a dyn TemplateEngine,
        context: &'a Context,
        media_cache: &'a MediaCache,
        render_full_page: bool,
        prefix: &'static str,
    ) -> Self {
        Self {
            settings,
            resolver,
            engine,
            context,
            media_cache,
            render_full_page,
            prefix,
            prepared: PreparedInstructions {
                render_full_page,
                ..PreparedInstructions::default()
            },
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Root of this plan's cache subtree
    pub fn cache_dir(&self) -> PathBuf {
        self.settings.cache_root.join(self.prefix)
    }

    /// URL a cached relative path is served from
    pub fn cache_url(&self, relpath: &str) -> String {
        format!("{}{}/{}", self.settings.cache_url, self.prefix, relpath)
    }

    /// Render the title against the context and HTML-escape it
    ///
    /// The literal title text is escaped before rendering; substituted
    /// variables are escaped by the engine itself.
    pub fn prepare_title(&mut self, instructions: &PageInstructions) -> PageplanResult<()> {
        match &instructions.title {
            Some(title) => {
                let rendered = self.engine.render(&html_escape(title), self.context)?;
                self.prepared.title = Some(rendered);
            }
            None if self.render_full_page => return Err(PageplanError::MissingTitle),
            None => {}
        }
        Ok(())
    }

    /// Resolve and render the body template
    ///
    /// The in-flight instructions are handed to the engine so body tags may
    /// append further directives before the js/css steps run.
    pub fn prepare_body(&mut self, instructions: &mut PageInstructions) -> PageplanResult<()> {
        let body_name = instructions.body.clone().ok_or(PageplanError::MissingBody)?;
        let (source, _origin) = self.resolver.find(&body_name)?;

        let mut scope = BodyScope {
            resolver: self.resolver,
            instructions,
        };
        let rendered = self.engine.render_body(&source, self.context, &mut scope)?;
        self.prepared.body = Some(rendered);
        Ok(())
    }

    /// Meta pairs pass through unchanged
    pub fn prepare_meta(&mut self, instructions: &PageInstructions) {
        self.prepared.meta = instructions.meta.clone();
    }

    /// Validate each declared module and mirror its asset tree
    ///
    /// The location resolves like any other asset tree: relative to a
    /// contributing manifest's directory first, then anywhere on the
    /// search path. The emitted module URL points at whichever cache
    /// subtree the mirror landed in.
    pub fn prepare_dojo(&mut self, instructions: &PageInstructions) -> PageplanResult<()> {
        for module in &instructions.dojo {
            let (namespace, location, require) = module.validate()?;

            let mirrored = self.mirror_asset_tree(instructions, location)?;
            let url_path = match &mirrored {
                Some(rel) => rel.to_string_lossy().into_owned(),
                None => location.to_string(),
            };

            self.prepared.dojo.push(PreparedModule {
                namespace: namespace.to_string(),
                location: self.cache_url(&url_path),
                require: require.to_vec(),
            });
        }
        Ok(())
    }

    /// Mirror one asset tree into this plan's cache subtree
    ///
    /// Manifest-relative locations win over search-path ones; the first
    /// match is mirrored and its cache-relative path returned. An absent
    /// tree mirrors nothing and returns None.
    fn mirror_asset_tree(
        &self,
        instructions: &PageInstructions,
        tree: &str,
    ) -> PageplanResult<Option<PathBuf>> {
        for manifest in &instructions.yaml {
            let base = Path::new(manifest).parent().unwrap_or(Path::new(""));
            let local = base.join(tree);

            if let Ok(dir) = self.resolver.find_directory(&local.to_string_lossy()) {
                mirror::mirror_tree(&dir, &self.cache_dir().join(&local))?;
                return Ok(Some(local));
            }
        }

        if let Ok(dir) = self.resolver.find_directory(tree) {
            mirror::mirror_tree(&dir, &self.cache_dir().join(tree))?;
            return Ok(Some(PathBuf::from(tree)));
        }
        Ok(None)
    }

    /// Mirror the asset trees each contributing manifest may carry
    ///
    /// Per manifest, each requested tree is looked up relative to the
    /// manifest's own directory first, then anywhere on the search path.
    /// Absent trees are skipped silently.
    pub fn prepare_assets(
        &self,
        instructions: &PageInstructions,
        trees: &[&str],
    ) -> PageplanResult<()> {
        for manifest in &instructions.yaml {
            let base = Path::new(manifest).parent().unwrap_or(Path::new(""));

            for tree in trees {
                let local = base.join(tree);
                let local_name = local.to_string_lossy();

                let (source, rel) = if let Ok(dir) = self.resolver.find_directory(&local_name) {
                    (dir, local.clone())
                } else if let Ok(dir) = self.resolver.find_directory(tree) {
                    (dir, PathBuf::from(tree))
                } else {
                    continue;
                };

                mirror::mirror_tree(&source, &self.cache_dir().join(rel))?;
            }
        }
        Ok(())
    }

    /// Prepare one directive and append it to the named section
    ///
    /// `include: false` performs every side effect but suppresses the
    /// record. Duplicate records (same resolved location or identical
    /// inline source) collapse to one occurrence.
    pub fn prepare_directive(
        &mut self,
        directive: &AssetDirective,
        kind: AssetKind,
    ) -> PageplanResult<()> {
        let record = self.build_record(directive)?;
        if directive.included() {
            self.push_prepared(kind, record);
        }
        Ok(())
    }

    fn build_record(&self, directive: &AssetDirective) -> PageplanResult<PreparedAsset> {
        if let Some(url) = &directive.url {
            return Ok(PreparedAsset::Url {
                location: url.clone(),
            });
        }

        // Resolve the transform up front so an unknown name fails before
        // any filesystem work happens
        let transform = directive
            .process
            .as_deref()
            .map(processor::lookup)
            .transpose()?;

        if let Some(name) = &directive.inline {
            if !directive.included() {
                return Err(PageplanError::ContradictoryDirective);
            }

            let (source, _origin) = self.resolver.find(name)?;
            let mut rendered = self.engine.render(&source, self.context)?;
            if let Some(transform) = transform {
                rendered = transform(&rendered, self.context)?;
            }
            return Ok(PreparedAsset::Inline { source: rendered });
        }

        let Some(name) = &directive.static_ else {
            return Err(PageplanError::MissingSource {
                directive: directive.describe(),
            });
        };

        let (source, _origin) = self.resolver.find(name)?;

        if directive.render.unwrap_or(false) {
            // Rendered per-request: served from the media cache under a
            // token URL, never written to the on-disk cache
            let mut rendered = self.engine.render(&source, self.context)?;
            if let Some(transform) = transform {
                rendered = transform(&rendered, self.context)?;
            }

            let token = self.context.media_token();
            self.media_cache.put(token, name, rendered.into_bytes());
            return Ok(PreparedAsset::Url {
                location: media_cache::token_url(
                    &self.settings.media_token_prefix,
                    token,
                    name,
                ),
            });
        }

        let content = match transform {
            Some(transform) => transform(&source, self.context)?,
            None => source,
        };

        let dest = self.cache_dir().join(name);
        write_if_changed(&dest, content.as_bytes())?;

        Ok(PreparedAsset::Cached {
            location: self.cache_url(name),
            filename: name.clone(),
        })
    }

    /// Resolve and fully process a non-url directive without touching the
    /// on-disk cache. Used by rollup strategies that combine sources.
    pub fn directive_content(
        &self,
        directive: &AssetDirective,
    ) -> PageplanResult<(String, String)> {
        let transform = directive
            .process
            .as_deref()
            .map(processor::lookup)
            .transpose()?;

        if let Some(name) = &directive.inline {
            if !directive.included() {
                return Err(PageplanError::ContradictoryDirective);
            }
            let (source, _origin) = self.resolver.find(name)?;
            let mut rendered = self.engine.render(&source, self.context)?;
            if let Some(transform) = transform {
                rendered = transform(&rendered, self.context)?;
            }
            return Ok((name.clone(), rendered));
        }

        let Some(name) = &directive.static_ else {
            return Err(PageplanError::MissingSource {
                directive: directive.describe(),
            });
        };

        let (source, _origin) = self.resolver.find(name)?;
        let content = match transform {
            Some(transform) => transform(&source, self.context)?,
            None => source,
        };
        Ok((name.clone(), content))
    }

    /// When the backing file of a named asset was last modified
    pub fn source_mtime(&self, name: &str) -> Option<SystemTime> {
        let (_source, origin) = self.resolver.find(name).ok()?;
        fs::metadata(origin.display).ok()?.modified().ok()
    }

    /// Append a record to the named section, collapsing duplicates
    pub fn push_prepared(&mut self, kind: AssetKind, record: PreparedAsset) {
        let section = match kind {
            AssetKind::Js => &mut self.prepared.js,
            AssetKind::Css => &mut self.prepared.css,
        };
        if section.iter().any(|r| r.identity() == record.identity()) {
            return;
        }
        section.push(record);
    }

    pub fn take_prepared(&mut self) -> PreparedInstructions {
        std::mem::take(&mut self.prepared)
    }
}

/// Write `content` to `dest` only when the cached copy differs
fn write_if_changed(dest: &Path, content: &[u8]) -> PageplanResult<bool> {
    if dest.is_file() && fs::read(dest)? == content {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, content)?;
    Ok(true)
}

/// A bundling strategy for one page render
///
/// `prepare` drives the fixed sequence title, body, js, css, meta, dojo.
/// The order matters: body rendering may append directives that the js/css
/// steps then consume.
pub trait Plan<'a> {
    fn base(&mut self) -> &mut PlanBase<'a>;

    fn prepare_js(&mut self, instructions: &PageInstructions) -> PageplanResult<()>;

    fn prepare_css(&mut self, instructions: &PageInstructions) -> PageplanResult<()>;

    fn prepare(
        &mut self,
        instructions: &mut PageInstructions,
    ) -> PageplanResult<PreparedInstructions> {
        self.base().prepare_title(instructions)?;
        self.base().prepare_body(instructions)?;
        self.prepare_js(instructions)?;
        self.prepare_css(instructions)?;
        self.base().prepare_meta(instructions);
        self.base().prepare_dojo(instructions)?;
        Ok(self.base().take_prepared())
    }
}

const AVAILABLE_PLANS: &str = "separate, fewest";

/// Pick the strategy for this render
///
/// Snippets always use separate-everything. For full pages the configured
/// default decides; a missing configuration falls back to
/// separate-everything unless strict mode makes it fatal. An unknown plan
/// name is fatal in either mode.
#[allow(clippy::too_many_arguments)]
pub fn select_plan<'a>(
    settings: &'a Settings,
    resolver: &'a TemplateResolver,
    engine: &'a dyn TemplateEngine,
    context: &'a Context,
    media_cache: &'a MediaCache,
    render_full_page: bool,
) -> PageplanResult<Box<dyn Plan<'a> + 'a>> {
    let separate = |full_page| -> Box<dyn Plan<'a> + 'a> {
        Box::new(SeparateEverything::new(
            settings,
            resolver,
            engine,
            context,
            media_cache,
            full_page,
        ))
    };

    if !render_full_page {
        return Ok(separate(false));
    }

    match settings.default_strategy() {
        None if settings.strict => Err(PageplanError::MissingMediaPlan),
        None => {
            tracing::debug!("no media plan configured, using separate-everything");
            Ok(separate(true))
        }
        Some("separate") => Ok(separate(true)),
        Some("fewest") => Ok(Box::new(FewestFiles::new(
            settings,
            resolver,
            engine,
            context,
            media_cache,
            true,
        ))),
        Some(other) => Err(PageplanError::UnknownPlan {
            name: other.to_string(),
            available: AVAILABLE_PLANS.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::MiniTemplate;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
        resolver: TemplateResolver,
        engine: MiniTemplate,
        media_cache: MediaCache,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("templates");
            fs::create_dir_all(root.join("app/media/css")).unwrap();
            fs::write(
                root.join("app/media/css/screen.css"),
                "body { margin: 0 }\n",
            )
            .unwrap();
            fs::write(root.join("app/page.html"), "<div>{{ who }}</div>").unwrap();

            let mut settings = Settings::default();
            settings.cache_root = dir.path().join("cache");

            Self {
                resolver: TemplateResolver::new(vec![root]),
                settings,
                engine: MiniTemplate::new(),
                media_cache: MediaCache::new(),
                _dir: dir,
            }
        }

        fn base<'a>(&'a self, ctx: &'a Context, full_page: bool) -> PlanBase<'a> {
            PlanBase::new(
                &self.settings,
                &self.resolver,
                &self.engine,
                ctx,
                &self.media_cache,
                full_page,
                "se",
            )
        }
    }

    #[test]
    fn test_prepare_title_escapes_literals() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let mut instructions = PageInstructions::new();
        instructions.title = Some("Jack & Jill <up> the 'hill'".to_string());

        base.prepare_title(&instructions).unwrap();
        assert_eq!(
            base.prepared.title.as_deref(),
            Some("Jack &amp; Jill &lt;up&gt; the &#39;hill&#39;")
        );
    }

    #[test]
    fn test_prepare_title_missing_full_page_fatal() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let err = base.prepare_title(&PageInstructions::new()).unwrap_err();
        assert!(matches!(err, PageplanError::MissingTitle));
    }

    #[test]
    fn test_prepare_title_missing_snippet_ok() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, false);

        base.prepare_title(&PageInstructions::new()).unwrap();
        assert!(base.prepared.title.is_none());
    }

    #[test]
    fn test_prepare_body_missing_fatal() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let err = base.prepare_body(&mut PageInstructions::new()).unwrap_err();
        assert!(matches!(err, PageplanError::MissingBody));
    }

    #[test]
    fn test_prepare_body_renders_against_context() {
        let fixture = Fixture::new();
        let ctx: Context = [("who", "world")].into_iter().collect();
        let mut base = fixture.base(&ctx, true);

        let mut instructions = PageInstructions::new();
        instructions.body = Some("app/page.html".to_string());

        base.prepare_body(&mut instructions).unwrap();
        assert_eq!(base.prepared.body.as_deref(), Some("<div>world</div>"));
    }

    #[test]
    fn test_url_directive_passes_through() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let directive = AssetDirective::external("http://cdn.example.com/lib.js");
        base.prepare_directive(&directive, AssetKind::Js).unwrap();

        assert_eq!(
            base.prepared.js,
            vec![PreparedAsset::Url {
                location: "http://cdn.example.com/lib.js".to_string()
            }]
        );
    }

    #[test]
    fn test_static_directive_copies_and_records_url() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let directive = AssetDirective::static_asset("app/media/css/screen.css");
        base.prepare_directive(&directive, AssetKind::Css).unwrap();

        let cached = fixture
            .settings
            .cache_root
            .join("se/app/media/css/screen.css");
        assert_eq!(fs::read_to_string(cached).unwrap(), "body { margin: 0 }\n");
        assert_eq!(
            base.prepared.css[0].location(),
            Some("/media/ppcache/se/app/media/css/screen.css")
        );
    }

    #[test]
    fn test_include_false_static_copies_but_suppresses_record() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let mut directive = AssetDirective::static_asset("app/media/css/screen.css");
        directive.include = Some(false);

        base.prepare_directive(&directive, AssetKind::Css).unwrap();

        assert!(base.prepared.css.is_empty());
        assert!(fixture
            .settings
            .cache_root
            .join("se/app/media/css/screen.css")
            .is_file());
    }

    #[test]
    fn test_inline_include_false_is_contradictory() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let mut directive = AssetDirective::inline_asset("app/media/css/screen.css");
        directive.include = Some(false);

        let err = base
            .prepare_directive(&directive, AssetKind::Css)
            .unwrap_err();
        assert!(matches!(err, PageplanError::ContradictoryDirective));
    }

    #[test]
    fn test_directive_without_source_fatal() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let err = base
            .prepare_directive(&AssetDirective::default(), AssetKind::Js)
            .unwrap_err();
        assert!(matches!(err, PageplanError::MissingSource { .. }));
    }

    #[test]
    fn test_duplicate_records_collapse() {
        let fixture = Fixture::new();
        let ctx = Context::new();
        let mut base = fixture.base(&ctx, true);

        let directive = AssetDirective::static_asset("app/media/css/screen.css");
        base.prepare_directive(&directive, AssetKind::Css).unwrap();
        base.prepare_directive(&directive, AssetKind::Css).unwrap();

        assert_eq!(base.prepared.css.len(), 1);
    }

    #[test]
    fn test_rendered_static_goes_to_media_cache() {
        let fixture = Fixture::new();
        let ctx: Context = [("who", "x")].into_iter().collect();
        let mut base = fixture.base(&ctx, true);

        let mut directive = AssetDirective::static_asset("app/page.html");
        directive.render = Some(true);

        base.prepare_directive(&directive, AssetKind::Js).unwrap();

        let token = ctx.media_token();
        assert_eq!(
            fixture.media_cache.get(token, "app/page.html"),
            Some(b"<div>x</div>".to_vec())
        );
        let expected = format!("/ppmedia/{}/app/page.html", token);
        assert_eq!(base.prepared.js[0].location(), Some(expected.as_str()));
        // Nothing written to the on-disk cache
        assert!(!fixture.settings.cache_root.join("se/app/page.html").exists());
    }

    #[test]
    fn test_select_plan_snippet_always_separate() {
        let mut fixture = Fixture::new();
        fixture.settings.plans.default = Some("fewest".to_string());
        let ctx = Context::new();

        let mut plan = select_plan(
            &fixture.settings,
            &fixture.resolver,
            &fixture.engine,
            &ctx,
            &fixture.media_cache,
            false,
        )
        .unwrap();
        assert_eq!(plan.base().prefix(), "se");
    }

    #[test]
    fn test_select_plan_permissive_fallback() {
        let fixture = Fixture::new();
        let ctx = Context::new();

        let mut plan = select_plan(
            &fixture.settings,
            &fixture.resolver,
            &fixture.engine,
            &ctx,
            &fixture.media_cache,
            true,
        )
        .unwrap();
        assert_eq!(plan.base().prefix(), "se");
    }

    #[test]
    fn test_select_plan_strict_missing_fatal() {
        let mut fixture = Fixture::new();
        fixture.settings.strict = true;
        let ctx = Context::new();

        let err = select_plan(
            &fixture.settings,
            &fixture.resolver,
            &fixture.engine,
            &ctx,
            &fixture.media_cache,
            true,
        )
        .err()
        .unwrap();
        assert!(matches!(err, PageplanError::MissingMediaPlan));
    }

    #[test]
    fn test_select_plan_unknown_name_fatal() {
        let mut fixture = Fixture::new();
        fixture.settings.plans.default = Some("everything-at-once".to_string());
        let ctx = Context::new();

        let err = select_plan(
            &fixture.settings,
            &fixture.resolver,
            &fixture.engine,
            &ctx,
            &fixture.media_cache,
            true,
        )
        .err()
        .unwrap();
        assert_eq!(
            err.to_string(),
            "unknown media plan 'everything-at-once', available plans are: separate, fewest"
        );
    }

    #[test]
    fn test_select_plan_named_mapping() {
        let mut fixture = Fixture::new();
        fixture
            .settings
            .plans
            .named
            .insert("rollup".to_string(), "fewest".to_string());
        fixture.settings.plans.default = Some("rollup".to_string());
        let ctx = Context::new();

        let mut plan = select_plan(
            &fixture.settings,
            &fixture.resolver,
            &fixture.engine,
            &ctx,
            &fixture.media_cache,
            true,
        )
        .unwrap();
        assert_eq!(plan.base().prefix(), "ff");
    }

    #[test]
    fn test_write_if_changed_skips_identical() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b.css");

        assert!(write_if_changed(&dest, b"one").unwrap());
        assert!(!write_if_changed(&dest, b"one").unwrap());
        assert!(write_if_changed(&dest, b"two").unwrap());
    }
}
