use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use tera::Tera;

use crate::models::StyleDocument;
use crate::utils::slugify;
use crate::{style, tokens};

/// Renderer release pinned into exported HTML pages.
pub const MAPLIBRE_GL_VERSION: &str = "4.7.1";

const VIEWER_TEMPLATE: &str = "viewer.html";

const DEFAULT_VIEWER_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8" />
  <title>{{ title }}</title>
  <meta name="viewport" content="initial-scale=1,maximum-scale=1,user-scalable=no" />
  <script src="https://unpkg.com/maplibre-gl@{{ maplibre_version }}/dist/maplibre-gl.js"></script>
  <link href="https://unpkg.com/maplibre-gl@{{ maplibre_version }}/dist/maplibre-gl.css" rel="stylesheet" />
  <style>
    body { margin: 0; padding: 0; }
    #map { position: absolute; top: 0; bottom: 0; width: 100%; }
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
      const map = new maplibregl.Map({
         container: 'map',
         style: {{ style_json }},
      });
      map.addControl(new maplibregl.NavigationControl());
  </script>
</body>
</html>
"#;

/// Tera engine over an overridable templates dir. When the dir has no
/// viewer template, the built-in one is registered instead.
pub struct TemplateEngine {
    tera: Mutex<Tera>,
}

impl TemplateEngine {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        let pattern = format!("{}/**/*.html", base_path.to_string_lossy());
        let mut tera = match Tera::new(&pattern) {
            Ok(t) => t,
            Err(e) => {
                if e.to_string().contains("no templates found")
                    || e.to_string().contains("match any files")
                {
                    Tera::default()
                } else {
                    return Err(e.into());
                }
            }
        };

        // The exported page embeds raw JSON inside a script tag.
        tera.autoescape_on(vec![]);

        if !tera.get_template_names().any(|name| name == VIEWER_TEMPLATE) {
            tera.add_raw_template(VIEWER_TEMPLATE, DEFAULT_VIEWER_TEMPLATE)?;
        }

        Ok(Self {
            tera: Mutex::new(tera),
        })
    }

    fn render_viewer(&self, title: &str, style_json: &str) -> Result<String> {
        let mut context = tera::Context::new();
        context.insert("title", title);
        context.insert("style_json", style_json);
        context.insert("maplibre_version", MAPLIBRE_GL_VERSION);

        let tera = self.tera.lock().unwrap();
        tera.render(VIEWER_TEMPLATE, &context).map_err(|e| {
            let loaded = tera.get_template_names().collect::<Vec<_>>();
            anyhow::anyhow!(
                "viewer template render error: {}. Loaded: {:?}",
                e,
                loaded
            )
        })
    }
}

/// Canonical export document: metadata tokens substituted into URLs (no
/// fallback table, only what the document itself carries), token keys
/// stripped, filters optionally lowered to expressions.
fn prepare(style: &StyleDocument, migrate_filters: bool) -> StyleDocument {
    let substituted = tokens::substitute_tokens(style.clone(), &HashMap::new(), false);
    let stripped = tokens::strip_tokens(substituted);
    if migrate_filters {
        style::replace_expression_filters(stripped)
    } else {
        stripped
    }
}

/// Pretty-printed downloadable style JSON.
pub fn export_json(style: &StyleDocument, migrate_filters: bool) -> Result<String> {
    Ok(serde_json::to_string_pretty(&prepare(style, migrate_filters))?)
}

/// Self-contained HTML page embedding the canonical style JSON.
pub fn export_html(
    engine: &TemplateEngine,
    style: &StyleDocument,
    migrate_filters: bool,
) -> Result<String> {
    let style_json = export_json(style, migrate_filters)?;
    let title = style.name.clone().unwrap_or_else(|| "Map".to_string());
    engine.render_viewer(&title, &style_json)
}

/// Download file stem: slugified style name, id as fallback.
pub fn export_name(style: &StyleDocument) -> String {
    match style.name.as_deref() {
        Some(name) if !name.is_empty() => slugify(name),
        _ => style.id.clone().unwrap_or_else(|| "style".to_string()),
    }
}
