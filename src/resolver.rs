//! Template/asset search-path resolver
//!
//! Locates a named template or asset in an ordered list of root
//! directories and always reports true provenance: downstream code mirrors
//! whole directory trees into the cache and needs the real originating
//! root, not just the file contents.

use std::path::{Component, Path, PathBuf};

use crate::error::{PageplanError, PageplanResult};

/// Where a resolved template came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Full path of the file that was read
    pub display: PathBuf,
    /// The search root the file was found under
    pub root: PathBuf,
    /// The name that was requested
    pub name: String,
}

/// Ordered search-path resolver for templates and assets
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    roots: Vec<PathBuf>,
}

impl TemplateResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find `name` in the configured search path
    pub fn find(&self, name: &str) -> PageplanResult<(String, Origin)> {
        self.find_in(name, None)
    }

    /// Find `name`, preferring an explicit list of directories when given
    pub fn find_in(
        &self,
        name: &str,
        dirs: Option<&[PathBuf]>,
    ) -> PageplanResult<(String, Origin)> {
        if !is_safe_relative(name) {
            return Err(self.not_found(name));
        }

        for root in dirs.unwrap_or(&self.roots) {
            let candidate = root.join(name);
            if candidate.is_file() {
                let source = std::fs::read_to_string(&candidate)?;
                let origin = Origin {
                    display: candidate,
                    root: root.clone(),
                    name: name.to_string(),
                };
                return Ok((source, origin));
            }
        }

        Err(self.not_found(name))
    }

    /// Find an existing directory matching `relpath` under any search root
    pub fn find_directory(&self, relpath: &str) -> PageplanResult<PathBuf> {
        if is_safe_relative(relpath) {
            for root in &self.roots {
                let candidate = root.join(relpath);
                if candidate.is_dir() {
                    return Ok(candidate);
                }
            }
        }

        Err(PageplanError::DirectoryNotFound {
            path: PathBuf::from(relpath),
        })
    }

    fn not_found(&self, name: &str) -> PageplanError {
        PageplanError::TemplateNotFound {
            name: name.to_string(),
            searched: self.searched(),
        }
    }

    /// The search path rendered for error messages
    fn searched(&self) -> String {
        if self.roots.is_empty() {
            return "(empty search path)".to_string();
        }
        self.roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Relative path with no traversal components
fn is_safe_relative(name: &str) -> bool {
    let path = Path::new(name);
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
