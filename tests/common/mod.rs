//! Common test utilities for pageplan integration tests.
//!
//! Provides `PageEnv`: an isolated environment with a temp template root
//! and cache directory, plus helpers to write fixture files and drive the
//! assembly pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pageplan::{Context, MediaCache, MiniTemplate, PageAssembly, Settings, TemplateResolver};

/// Isolated environment: one template root, one cache root
pub struct PageEnv {
    dir: TempDir,
    pub settings: Settings,
    pub resolver: TemplateResolver,
    pub engine: MiniTemplate,
    pub media_cache: MediaCache,
}

impl PageEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        fs::create_dir_all(&root).unwrap();

        let mut settings = Settings::default();
        settings.cache_root = dir.path().join("cache");

        Self {
            resolver: TemplateResolver::new(vec![root]),
            settings,
            engine: MiniTemplate::new(),
            media_cache: MediaCache::new(),
            dir,
        }
    }

    /// Write a file under the template root, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.template_root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn template_root(&self) -> PathBuf {
        self.dir.path().join("templates")
    }

    pub fn cache_path(&self, relative: &str) -> PathBuf {
        self.settings.cache_root.join(relative)
    }

    pub fn assembly(&self) -> PageAssembly<'_> {
        PageAssembly::new(&self.settings, &self.resolver, &self.engine, &self.media_cache)
    }

    /// Assemble and render the named manifests as a full page
    pub fn render(&self, manifests: &[&str], context: &Context) -> pageplan::PageplanResult<String> {
        let manifests: Vec<String> = manifests.iter().map(|s| s.to_string()).collect();
        self.assembly().render(&manifests, context, true)
    }

    /// Assemble and render as a snippet
    pub fn render_snippet(
        &self,
        manifests: &[&str],
        context: &Context,
    ) -> pageplan::PageplanResult<String> {
        let manifests: Vec<String> = manifests.iter().map(|s| s.to_string()).collect();
        self.assembly().render(&manifests, context, false)
    }
}

/// Recursively collect (relative path, mtime) pairs for a tree
pub fn tree_mtimes(root: &Path) -> Vec<(PathBuf, std::time::SystemTime)> {
    let mut out = Vec::new();
    collect(root, Path::new(""), &mut out);
    out.sort();
    out
}

fn collect(root: &Path, prefix: &Path, out: &mut Vec<(PathBuf, std::time::SystemTime)>) {
    if !root.is_dir() {
        return;
    }
    for entry in fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        let relative = prefix.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            collect(&entry.path(), &relative, out);
        } else {
            out.push((relative, entry.metadata().unwrap().modified().unwrap()));
        }
    }
}
