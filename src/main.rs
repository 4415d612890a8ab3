//! Pageplan CLI - render manifest-driven pages at build time
//!
//! Usage: pageplan <COMMAND>
//!
//! Commands:
//!   render  Assemble manifests, populate the asset cache, emit HTML
//!   clean   Remove the on-disk asset cache

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use pageplan::{Context, MediaCache, MiniTemplate, PageAssembly, Settings, TemplateResolver};

/// Pageplan - page-instruction manifests to cached asset bundles
#[derive(Parser, Debug)]
#[command(name = "pageplan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output format for CI
    #[arg(long, default_value = "false")]
    json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble manifests, populate the asset cache, emit HTML
    Render {
        /// Manifest names, resolved against the template search path
        #[arg(required = true)]
        manifests: Vec<String>,

        /// Path to the configuration file
        #[arg(short, long, default_value = "pageplan.toml")]
        config: PathBuf,

        /// Extra template/asset root directories (searched first)
        #[arg(short, long)]
        template_dir: Vec<PathBuf>,

        /// Context variable, key=value (repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Render a snippet instead of a full page
        #[arg(long)]
        snippet: bool,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove the on-disk asset cache
    Clean {
        /// Path to the configuration file
        #[arg(short, long, default_value = "pageplan.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render {
            manifests,
            config,
            template_dir,
            vars,
            snippet,
            output,
        } => cmd_render(&manifests, &config, template_dir, &vars, snippet, output, cli.json),
        Commands::Clean { config } => cmd_clean(&config, cli.json),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(config: &Path, json: bool) -> Result<Settings> {
    if !config.is_file() {
        tracing::debug!(config = %config.display(), "no configuration file, using defaults");
        return Ok(Settings::default().with_env_overrides());
    }

    let (settings, warnings) = Settings::load_with_warnings(config)
        .with_context(|| format!("failed to load {}", config.display()))?;

    for warning in &warnings {
        if json {
            tracing::warn!(key = %warning.key, "unknown configuration key");
        } else {
            let line = warning
                .line
                .map(|l| format!(":{}", l))
                .unwrap_or_default();
            match &warning.suggestion {
                Some(suggestion) => eprintln!(
                    "⚠ {}{}: unknown key '{}' (did you mean '{}'?)",
                    warning.file.display(),
                    line,
                    warning.key,
                    suggestion
                ),
                None => eprintln!(
                    "⚠ {}{}: unknown key '{}'",
                    warning.file.display(),
                    line,
                    warning.key
                ),
            }
        }
    }

    Ok(settings.with_env_overrides())
}

fn parse_vars(vars: &[String]) -> Result<Context> {
    let mut ctx = Context::new();
    for var in vars {
        let (key, value) = var
            .split_once('=')
            .with_context(|| format!("invalid --var '{}', expected key=value", var))?;
        ctx.set(key, value);
    }
    Ok(ctx)
}

fn cmd_render(
    manifests: &[String],
    config: &Path,
    template_dirs: Vec<PathBuf>,
    vars: &[String],
    snippet: bool,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let settings = load_settings(config, json)?;

    let mut roots = template_dirs;
    roots.extend(settings.template_dirs.iter().cloned());
    let resolver = TemplateResolver::new(roots);

    let engine = MiniTemplate::new();
    let media_cache = MediaCache::new();
    let context = parse_vars(vars)?;

    let assembly = PageAssembly::new(&settings, &resolver, &engine, &media_cache);
    let html = assembly.render(manifests, &context, !snippet)?;

    match &output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &html)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => print!("{}", html),
    }

    if json {
        let summary = serde_json::json!({
            "event": "render",
            "manifests": manifests,
            "snippet": snippet,
            "bytes": html.len(),
            "cache_root": &settings.cache_root,
            "output": &output,
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else if let Some(path) = &output {
        eprintln!("✓ Rendered {} manifest(s) to {}", manifests.len(), path.display());
    }

    Ok(())
}

fn cmd_clean(config: &Path, json: bool) -> Result<()> {
    let settings = load_settings(config, json)?;

    let existed = settings.cache_root.is_dir();
    if existed {
        fs::remove_dir_all(&settings.cache_root)
            .with_context(|| format!("failed to remove {}", settings.cache_root.display()))?;
    }

    if json {
        let summary = serde_json::json!({
            "event": "clean",
            "cache_root": &settings.cache_root,
            "removed": existed,
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else if existed {
        println!("✓ Removed {}", settings.cache_root.display());
    } else {
        println!("Nothing to clean at {}", settings.cache_root.display());
    }

    Ok(())
}
