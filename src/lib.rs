//! Pageplan - YAML page-instruction manifests to cached asset bundles
//!
//! Pageplan reads manifests describing a page's title, body template,
//! CSS/JS assets and meta tags, materializes a deployable asset cache on
//! disk, and renders the final HTML referencing it. Asset bundling is
//! pluggable through deploy plans: serve every file separately, or roll
//! sources into content-hashed combined artifacts.

pub mod config;
pub mod error;
pub mod instructions;
pub mod media_cache;
pub mod mirror;
pub mod page;
pub mod plans;
pub mod processor;
pub mod renderer;
pub mod resolver;
pub mod template;

// Re-exports for convenience
pub use config::{ConfigWarning, PlanOptions, Settings};
pub use error::{PageplanError, PageplanResult};
pub use instructions::{AssetDirective, ModuleDirective, PageInstructions, RawInstructions};
pub use media_cache::{MediaCache, MediaResponse};
pub use page::PageAssembly;
pub use plans::{select_plan, FewestFiles, Plan, PreparedAsset, PreparedInstructions, SeparateEverything};
pub use renderer::{write_document, Renderer};
pub use resolver::{Origin, TemplateResolver};
pub use template::{html_escape, Context, MiniTemplate, TemplateEngine};
