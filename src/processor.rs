//! Named source transforms
//!
//! Manifests opt into a transform with `process: <name>`. The registry is
//! a closed set; an unknown name is a configuration error listing the
//! valid alternatives.

use crate::error::{PageplanError, PageplanResult};
use crate::template::Context;

/// A registered transform applied to asset source before caching/embedding
pub type ProcessorFn = fn(&str, &Context) -> PageplanResult<String>;

const REGISTRY: &[(&str, ProcessorFn)] = &[("clevercss", clevercss_convert)];

/// Look up a transform by its manifest name
pub fn lookup(name: &str) -> PageplanResult<ProcessorFn> {
    REGISTRY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| PageplanError::UnknownProcessor {
            name: name.to_string(),
            available: available(),
        })
}

/// Comma-separated list of registered transform names
pub fn available() -> String {
    REGISTRY
        .iter()
        .map(|(n, _)| *n)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert indentation-nested meta-CSS into plain CSS
///
/// `$name` references resolve against the render context; unknown
/// variables pass through untouched. Nesting combines selectors with a
/// descendant space:
///
/// ```text
/// div.comment
///   p
///     color: $accent
/// ```
///
/// becomes `div.comment p { color: ...; }`.
fn clevercss_convert(source: &str, ctx: &Context) -> PageplanResult<String> {
    let source = substitute_variables(source, ctx);

    // (selector path, properties) in first-appearance order
    let mut blocks: Vec<(String, Vec<String>)> = Vec::new();
    // (indent, selector) stack of open scopes
    let mut stack: Vec<(usize, String)> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        while let Some((open_indent, _)) = stack.last() {
            if indent <= *open_indent {
                stack.pop();
            } else {
                break;
            }
        }

        match split_property(trimmed) {
            Some((name, value)) => {
                let path = stack
                    .iter()
                    .map(|(_, s)| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let idx = match blocks.iter().position(|(p, _)| *p == path) {
                    Some(idx) => idx,
                    None => {
                        blocks.push((path, Vec::new()));
                        blocks.len() - 1
                    }
                };
                blocks[idx].1.push(format!("{}: {};", name, value));
            }
            None => {
                let selector = trimmed.trim_end_matches(':').trim().to_string();
                stack.push((indent, selector));
            }
        }
    }

    let rendered: Vec<String> = blocks
        .into_iter()
        .filter(|(_, props)| !props.is_empty())
        .map(|(path, props)| {
            let body = props
                .iter()
                .map(|p| format!("  {}", p))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{} {{\n{}\n}}", path, body)
        })
        .collect();

    Ok(rendered.join("\n"))
}

/// Split `name: value` property lines; selector lines return None
fn split_property(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((name.trim(), value))
}

/// Replace `$name` references with context variable values
fn substitute_variables(source: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());

        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        let name = &after[..len];
        match ctx.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        assert!(lookup("clevercss").is_ok());
    }

    #[test]
    fn test_lookup_unknown_names_alternatives() {
        let err = lookup("lesscss").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown process function 'lesscss', available ones are: clevercss"
        );
    }

    #[test]
    fn test_clevercss_resolves_context_variable() {
        let ctx: Context = [("color", "gray")].into_iter().collect();
        let out = clevercss_convert("body\n  background-color: $color", &ctx).unwrap();

        assert_eq!(out, "body {\n  background-color: gray;\n}");
    }

    #[test]
    fn test_clevercss_trailing_colon_selector() {
        let ctx: Context = [("color", "gray")].into_iter().collect();
        let out = clevercss_convert("body:\n  background-color: $color\n", &ctx).unwrap();

        assert_eq!(out, "body {\n  background-color: gray;\n}");
    }

    #[test]
    fn test_clevercss_nested_selectors() {
        let ctx: Context = [("accent", "#336699")].into_iter().collect();
        let source = "div.comment\n  p\n    color: $accent\n  margin: 0";
        let out = clevercss_convert(source, &ctx).unwrap();

        assert_eq!(
            out,
            "div.comment p {\n  color: #336699;\n}\ndiv.comment {\n  margin: 0;\n}"
        );
    }

    #[test]
    fn test_clevercss_unknown_variable_passes_through() {
        let ctx = Context::new();
        let out = clevercss_convert("body\n  color: $missing", &ctx).unwrap();
        assert_eq!(out, "body {\n  color: $missing;\n}");
    }

    #[test]
    fn test_clevercss_skips_comments_and_blanks() {
        let ctx = Context::new();
        let out = clevercss_convert("// header styles\n\nbody\n  margin: 0\n", &ctx).unwrap();
        assert_eq!(out, "body {\n  margin: 0;\n}");
    }

    #[test]
    fn test_substitute_lone_dollar() {
        let ctx = Context::new();
        assert_eq!(substitute_variables("cost: $ 5", &ctx), "cost: $ 5");
    }
}
