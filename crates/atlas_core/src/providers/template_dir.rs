//! `template_dir`: render a directory of migration templates in memory.
//!
//! ```toml
//! [data.template_dir.migrations]
//! path = "migrations"
//! vars = { Schema = "tenant_1" }
//! ```
//!
//! Templates use Jinja syntax. References may also be written rooted at a
//! dot, `{{ .Schema }}`, which reads the same variable as `{{ Schema }}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atlas_db::migrate::write_sum_file;
use atlas_db::{Dir, MemDir};
use minijinja::{Environment, UndefinedBehavior};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::EvalContext;
use crate::error::ProviderError;
use crate::registry::DataSource;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDirAttrs {
    pub path: PathBuf,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateDir;

#[async_trait]
impl DataSource for TemplateDir {
    type Attrs = TemplateDirAttrs;

    fn name(&self) -> &'static str {
        "template_dir"
    }

    async fn resolve(
        &self,
        attrs: TemplateDirAttrs,
        ctx: &mut EvalContext,
    ) -> Result<Value, ProviderError> {
        let sources = read_sources(&attrs.path).await?;
        let dir = render(&sources, &attrs.vars)?;
        let url = ctx.dirs_mut().publish(dir);
        Ok(json!({ "url": url }))
    }
}

/// Regular files directly under `path`, sorted by name.
async fn read_sources(path: &Path) -> Result<Vec<(String, String)>, ProviderError> {
    let mut sources = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let content = tokio::fs::read_to_string(entry.path()).await?;
        sources.push((name, content));
    }
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sources)
}

/// Render every template into a new directory. Nothing is returned unless
/// all files rendered.
fn render(sources: &[(String, String)], vars: &BTreeMap<String, Value>) -> Result<MemDir, ProviderError> {
    let normalized: Vec<String> = sources.iter().map(|(_, s)| strip_dot_root(s)).collect();
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    let mut dir = MemDir::new();
    for ((name, _), source) in sources.iter().zip(&normalized) {
        let template_error = |e: minijinja::Error| ProviderError::Template {
            file: name.clone(),
            message: e.to_string(),
        };
        let template = env.template_from_str(source).map_err(template_error)?;

        let mut undeclared: Vec<String> = template
            .undeclared_variables(false)
            .into_iter()
            .filter(|v| !vars.contains_key(v))
            .collect();
        undeclared.sort();
        if let Some(variable) = undeclared.into_iter().next() {
            return Err(ProviderError::UndefinedVariable {
                file: name.clone(),
                variable,
            });
        }

        let rendered = template.render(vars).map_err(template_error)?;
        dir.write_file(name, rendered.as_bytes())?;
    }
    write_sum_file(&mut dir)?;
    debug!(files = sources.len(), "rendered template directory");
    Ok(dir)
}

/// Drop the leading dot of dot-rooted references inside `{{ }}` and `{% %}`
/// tags. Dots directly after a value (`a.b`, `f().x`, `1.5`) and dots
/// inside string literals are kept.
fn strip_dot_root(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut close: Option<&str> = None;
    let mut quote: Option<char> = None;
    let mut prev = ' ';
    let mut chars = source.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let rest = &source[i..];
        let Some(end) = close else {
            out.push(c);
            if rest.starts_with("{{") || rest.starts_with("{%") {
                close = Some(if rest.starts_with("{{") { "}}" } else { "%}" });
                prev = ' ';
                if let Some((_, open)) = chars.next() {
                    out.push(open);
                }
            }
            continue;
        };
        if let Some(q) = quote {
            if c == '\\' {
                out.push(c);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            if c == q {
                quote = None;
            }
        } else if rest.starts_with(end) {
            close = None;
            out.push(c);
            if let Some((_, closing)) = chars.next() {
                out.push(closing);
            }
            continue;
        } else if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == '.'
            && !ends_value(prev)
            && chars
                .peek()
                .is_some_and(|&(_, next)| next.is_alphabetic() || next == '_')
        {
            prev = c;
            continue;
        }
        prev = c;
        out.push(c);
    }
    out
}

fn ends_value(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ')' | ']' | '"' | '\'')
}
