//! Error types for pageplan
//!
//! One `thiserror` enum covers the whole pipeline. Configuration and
//! manifest problems are fatal and propagate; media-cache misses are not
//! errors (see `media_cache::MediaResponse`).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pageplan operations
pub type PageplanResult<T> = Result<T, PageplanError>;

/// Main error type for pageplan operations
#[derive(Error, Debug)]
pub enum PageplanError {
    /// Template or asset not found on the search path
    #[error("template '{name}' not found, searched: {searched}")]
    TemplateNotFound { name: String, searched: String },

    /// Asset-tree directory not found anywhere on the search path
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// `process:` names a transform that is not registered
    #[error("unknown process function '{name}', available ones are: {available}")]
    UnknownProcessor { name: String, available: String },

    /// Configured plan name has no registered strategy
    #[error("unknown media plan '{name}', available plans are: {available}")]
    UnknownPlan { name: String, available: String },

    /// Strict mode requires a configured media plan
    #[error("no media plan configured and strict mode is enabled")]
    MissingMediaPlan,

    /// Plan option name is not recognized
    #[error("unknown plan option '{name}'")]
    UnknownPlanOption { name: String },

    /// The active plan cannot satisfy a structurally impossible request
    #[error("bad plan situation: {message}")]
    BadPlanSituation { message: String },

    /// Missing required field in a manifest section
    #[error("missing required field '{field}' in {section} entry")]
    MissingField { field: String, section: String },

    /// Manifest has no body
    #[error("the body has not been specified in the page instructions (body: in your manifest)")]
    MissingBody,

    /// Manifest has no title and a full page was requested
    #[error("the title has not been specified in the page instructions (title: in your manifest)")]
    MissingTitle,

    /// Directive combines flags that contradict each other
    #[error("'inline' and 'include: false' do not make sense together")]
    ContradictoryDirective,

    /// Directive has neither url, static nor inline
    #[error("a js/css entry must provide 'url', 'static' or 'inline', got: {directive}")]
    MissingSource { directive: String },

    /// Configuration file could not be parsed
    #[error("invalid configuration in {file}: {message}")]
    InvalidConfig { file: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}
