//! Tera rendering engine for playlist documents.
//!
//! | Format              | Template                 |
//! |---------------------|--------------------------|
//! | `RemoteItemsOnly`   | `remote_items.xml.tera`  |
//! | `FullItems`         | `full_items.xml.tera`    |
//!
//! Both include `_channel.xml.tera`. Any of the three can be overridden by a
//! file of the same name in the user template directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::{Tera, Value};

use musicl_core::markup::escape;
use musicl_core::types::{ChannelMeta, Episode, PlaylistFormat};
use musicl_reconcile::ReconciliationResult;

use crate::context::TemplateContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("_channel.xml.tera", include_str!("templates/_channel.xml.tera")),
    ("remote_items.xml.tera", include_str!("templates/remote_items.xml.tera")),
    ("full_items.xml.tera", include_str!("templates/full_items.xml.tera")),
];

fn template_name(format: PlaylistFormat) -> &'static str {
    match format {
        PlaylistFormat::RemoteItemsOnly => "remote_items.xml.tera",
        PlaylistFormat::FullItems => "full_items.xml.tera",
    }
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        // Templates are written with LF; keep output free of CR regardless.
        templates.push((normalize_template_name(rel), contents.replace("\r\n", "\n")));
    }
    Ok(templates)
}

fn xml_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(escape(&value_text(value)).into_owned()))
}

/// Make text safe inside `<![CDATA[ ... ]]>`.
fn cdata_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(
        value_text(value).replace("]]>", "]]]]><![CDATA[>"),
    ))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = TPLS
        .iter()
        .map(|(name, content)| (normalize_template_name(Path::new(name)), (*content).to_string()))
        .collect();
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    // Escaping is explicit through the `xml` and `cdata` filters; raw pointer
    // forms must pass through untouched.
    tera.autoescape_on(vec![]);
    tera.register_filter("xml", xml_filter);
    tera.register_filter("cdata", cdata_filter);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Serializes reconciliation output into a playlist document.
///
/// Output is a pure function of the inputs: the only field that moves between
/// runs is `lastBuildDate`, taken from [`ChannelMeta::last_build_date`].
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_template_dir(None)
    }

    /// Embedded templates plus any `.tera` overrides found in `dir`.
    pub fn with_template_dir(dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            tera: build_tera(dir)?,
        })
    }

    /// Render a document of `format`.
    ///
    /// `RemoteItemsOnly` emits `result.items` in order. `FullItems` emits one
    /// `<item>` per upstream episode and ignores the pointer merge.
    pub fn render(
        &self,
        format: PlaylistFormat,
        meta: &ChannelMeta,
        result: &ReconciliationResult,
        episodes: &[Episode],
    ) -> Result<String, RenderError> {
        if format == PlaylistFormat::FullItems && episodes.is_empty() {
            return Err(RenderError::NoEntries);
        }
        let ctx = TemplateContext::new(meta, result, episodes).to_tera_context()?;
        Ok(self.tera.render(template_name(format), &ctx)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_parse() {
        Renderer::new().expect("embedded templates should parse");
    }

    #[test]
    fn xml_filter_escapes_markup() {
        let out = xml_filter(&Value::String("a < b & \"c\"".into()), &HashMap::new()).unwrap();
        assert_eq!(out, Value::String("a &lt; b &amp; &quot;c&quot;".into()));
    }

    #[test]
    fn cdata_filter_splits_terminator() {
        let out = cdata_filter(&Value::String("x]]>y".into()), &HashMap::new()).unwrap();
        assert_eq!(out, Value::String("x]]]]><![CDATA[>y".into()));
    }

    #[test]
    fn null_renders_empty() {
        let out = xml_filter(&Value::Null, &HashMap::new()).unwrap();
        assert_eq!(out, Value::String(String::new()));
    }

    #[test]
    fn template_names_are_normalised() {
        assert_eq!(
            normalize_template_name(Path::new("Remote_Items.xml.tera")),
            "remote_items.xml.tera"
        );
    }
}
