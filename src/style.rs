use std::fmt;

use rand::Rng;
use serde_json::{json, Value};

use crate::models::{StyleDocument, STYLE_VERSION};

/// The closed set of combining operators shared by the legacy filter
/// grammar and the expression grammar.
pub const COMBINING_FILTER_OPS: [&str; 3] = ["all", "any", "none"];

const ID_LENGTH: usize = 7;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Structural problems found while normalizing. Normalization never fails;
/// it reports what it had to leave alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnresolvedRef { layer_id: String, ref_id: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnresolvedRef { layer_id, ref_id } => {
                write!(f, "layer {layer_id:?} references unknown layer {ref_id:?}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub style: StyleDocument,
    pub warnings: Vec<Warning>,
}

pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// The style used whenever nothing could be restored or fetched.
pub fn empty_style() -> StyleDocument {
    normalize(StyleDocument {
        version: STYLE_VERSION,
        ..StyleDocument::default()
    })
    .style
}

/// Produce a canonical, renderer-safe document: stable id, no `ref`-based
/// layer inheritance, no deprecated `interactive` flags. Pure; the input is
/// consumed and a new value returned.
pub fn normalize(style: StyleDocument) -> Normalized {
    let mut warnings = Vec::new();
    let style = ensure_has_id(style);
    let style = deref_layers(style, &mut warnings);
    let style = strip_interactive(style);
    Normalized { style, warnings }
}

fn ensure_has_id(mut style: StyleDocument) -> StyleDocument {
    if style.id.as_deref().map_or(true, str::is_empty) {
        style.id = Some(generate_id());
    }
    style
}

/// Inline every `ref`-based layer: `type`, `source`, `source-layer`,
/// `minzoom`, `maxzoom` and `filter` come from the referenced layer, while
/// the referencing layer keeps its own `id`, `paint` and `layout`. A ref to
/// a missing layer (or to another ref layer) is left untouched and reported.
fn deref_layers(mut style: StyleDocument, warnings: &mut Vec<Warning>) -> StyleDocument {
    let originals = style.layers.clone();
    style.layers = style
        .layers
        .into_iter()
        .map(|layer| {
            let Some(ref_id) = layer.layer_ref.clone() else {
                return layer;
            };
            let parent = originals
                .iter()
                .find(|l| l.id == ref_id && l.layer_ref.is_none());
            let Some(parent) = parent else {
                warnings.push(Warning::UnresolvedRef {
                    layer_id: layer.id.clone(),
                    ref_id,
                });
                return layer;
            };
            let mut layer = layer;
            layer.layer_ref = None;
            layer.kind = parent.kind.clone();
            layer.source = parent.source.clone();
            layer.source_layer = parent.source_layer.clone();
            layer.minzoom = parent.minzoom;
            layer.maxzoom = parent.maxzoom;
            layer.filter = parent.filter.clone();
            layer
        })
        .collect();
    style
}

fn strip_interactive(mut style: StyleDocument) -> StyleDocument {
    for layer in &mut style.layers {
        layer.interactive = None;
    }
    style
}

/// Force a filter into combining form. A recognized combining head is kept;
/// anything else becomes an implicit `all` wrapping the whole original
/// array as a single condition. Non-array filters pass through.
pub fn combining_filter(filter: Option<&Value>) -> Value {
    let filter = match filter {
        Some(f) => f.clone(),
        None => json!(["all"]),
    };
    match filter {
        Value::Array(arr) => {
            let recognized = arr
                .first()
                .and_then(Value::as_str)
                .map_or(false, |op| COMBINING_FILTER_OPS.contains(&op));
            if recognized {
                Value::Array(arr)
            } else {
                json!(["all", Value::Array(arr)])
            }
        }
        other => other,
    }
}

/// Lower a legacy array filter into the expression tree the renderer
/// understands. Subtrees already in expression form pass through unchanged.
pub fn migrate_filter(filter: &Value) -> Value {
    let Some(arr) = filter.as_array() else {
        return filter.clone();
    };
    let Some(op) = arr.first().and_then(Value::as_str) else {
        return filter.clone();
    };
    match op {
        "all" | "any" => {
            let mut out = vec![json!(op)];
            out.extend(arr[1..].iter().map(migrate_filter));
            Value::Array(out)
        }
        "none" => {
            let mut out = vec![json!("all")];
            out.extend(arr[1..].iter().map(|f| json!(["!", migrate_filter(f)])));
            Value::Array(out)
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            let (Some(key), Some(value)) = (arr.get(1).and_then(Value::as_str), arr.get(2))
            else {
                // Expression comparisons have a non-string operand here.
                return filter.clone();
            };
            json!([op, key_getter(key), value])
        }
        "has" => match arr.get(1).and_then(Value::as_str) {
            Some(key) => json!(["has", key]),
            None => filter.clone(),
        },
        "!has" => match arr.get(1).and_then(Value::as_str) {
            Some(key) => json!(["!", ["has", key]]),
            None => filter.clone(),
        },
        "in" | "!in" => {
            let Some(key) = arr.get(1).and_then(Value::as_str) else {
                return filter.clone();
            };
            let values = &arr[2..];
            let negated = op == "!in";
            match values {
                [single] => json!([if negated { "!=" } else { "==" }, key_getter(key), single]),
                _ => json!(["match", key_getter(key), values, !negated, negated]),
            }
        }
        _ => filter.clone(),
    }
}

fn key_getter(key: &str) -> Value {
    match key {
        "$type" => json!(["geometry-type"]),
        "$id" => json!(["id"]),
        _ => json!(["get", key]),
    }
}

/// Rewrite every layer filter into expression form.
pub fn replace_expression_filters(mut style: StyleDocument) -> StyleDocument {
    for layer in &mut style.layers {
        if let Some(filter) = &layer.filter {
            layer.filter = Some(migrate_filter(&combining_filter(Some(filter))));
        }
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_value;

    fn style_with_ref() -> StyleDocument {
        from_value(json!({
            "version": 8,
            "sources": {"openmaptiles": {"type": "vector", "url": "http://example.com"}},
            "layers": [
                {
                    "id": "water",
                    "type": "fill",
                    "source": "openmaptiles",
                    "source-layer": "water",
                    "minzoom": 4.0,
                    "filter": ["==", "class", "river"],
                    "paint": {"fill-color": "#00f"},
                    "interactive": true
                },
                {
                    "id": "water-copy",
                    "ref": "water",
                    "paint": {"fill-color": "#0ff"},
                    "layout": {"visibility": "visible"}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn generated_ids_are_short_alphanumeric() {
        for _ in 0..50 {
            let id = generate_id();
            assert_eq!(id.len(), 7);
            assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn normalize_assigns_missing_id() {
        let normalized = normalize(style_with_ref());
        assert!(!normalized.style.id.as_deref().unwrap().is_empty());
    }

    #[test]
    fn normalize_keeps_existing_id() {
        let mut style = style_with_ref();
        style.id = Some("abc1234".to_string());
        assert_eq!(normalize(style).style.id.as_deref(), Some("abc1234"));
    }

    #[test]
    fn normalize_replaces_empty_id() {
        let mut style = style_with_ref();
        style.id = Some(String::new());
        assert_ne!(normalize(style).style.id.as_deref(), Some(""));
    }

    #[test]
    fn deref_copies_parent_fields_and_keeps_own() {
        let normalized = normalize(style_with_ref());
        let layer = &normalized.style.layers[1];
        assert_eq!(layer.layer_ref, None);
        assert_eq!(layer.kind.as_deref(), Some("fill"));
        assert_eq!(layer.source.as_deref(), Some("openmaptiles"));
        assert_eq!(layer.source_layer.as_deref(), Some("water"));
        assert_eq!(layer.minzoom, Some(4.0));
        assert_eq!(layer.filter, Some(json!(["==", "class", "river"])));
        // Own fields survive.
        assert_eq!(layer.id, "water-copy");
        assert_eq!(
            layer.paint.as_ref().unwrap().get("fill-color"),
            Some(&json!("#0ff"))
        );
        assert_eq!(
            layer.layout.as_ref().unwrap().get("visibility"),
            Some(&json!("visible"))
        );
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn unresolved_ref_is_reported_and_left_alone() {
        let style: StyleDocument = from_value(json!({
            "version": 8,
            "sources": {},
            "layers": [{"id": "orphan", "ref": "missing"}]
        }))
        .unwrap();
        let normalized = normalize(style);
        assert_eq!(normalized.style.layers[0].layer_ref.as_deref(), Some("missing"));
        assert_eq!(
            normalized.warnings,
            vec![Warning::UnresolvedRef {
                layer_id: "orphan".to_string(),
                ref_id: "missing".to_string(),
            }]
        );
    }

    #[test]
    fn no_layer_keeps_interactive() {
        let normalized = normalize(style_with_ref());
        assert!(normalized.style.layers.iter().all(|l| l.interactive.is_none()));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(style_with_ref()).style;
        let twice = normalize(once.clone()).style;
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_style_is_canonical() {
        let style = empty_style();
        assert_eq!(style.version, STYLE_VERSION);
        assert!(style.id.is_some());
        assert!(style.sources.is_empty());
        assert!(style.layers.is_empty());
    }

    #[test]
    fn combining_filter_keeps_known_heads() {
        let filter = json!(["any", ["==", "class", "river"]]);
        assert_eq!(combining_filter(Some(&filter)), filter);
    }

    #[test]
    fn combining_filter_wraps_unknown_heads() {
        let filter = json!(["==", "class", "river"]);
        assert_eq!(
            combining_filter(Some(&filter)),
            json!(["all", ["==", "class", "river"]])
        );
    }

    #[test]
    fn combining_filter_defaults_to_all() {
        assert_eq!(combining_filter(None), json!(["all"]));
    }

    #[test]
    fn migrate_lowers_comparisons() {
        assert_eq!(
            migrate_filter(&json!(["==", "class", "river"])),
            json!(["==", ["get", "class"], "river"])
        );
        assert_eq!(
            migrate_filter(&json!([">=", "admin_level", 2])),
            json!([">=", ["get", "admin_level"], 2])
        );
    }

    #[test]
    fn migrate_maps_special_keys() {
        assert_eq!(
            migrate_filter(&json!(["==", "$type", "Polygon"])),
            json!(["==", ["geometry-type"], "Polygon"])
        );
        assert_eq!(
            migrate_filter(&json!(["==", "$id", 7])),
            json!(["==", ["id"], 7])
        );
    }

    #[test]
    fn migrate_lowers_membership() {
        assert_eq!(
            migrate_filter(&json!(["in", "class", "river", "canal"])),
            json!(["match", ["get", "class"], ["river", "canal"], true, false])
        );
        assert_eq!(
            migrate_filter(&json!(["!in", "class", "river", "canal"])),
            json!(["match", ["get", "class"], ["river", "canal"], false, true])
        );
        // Single candidate lowers to plain equality.
        assert_eq!(
            migrate_filter(&json!(["in", "class", "river"])),
            json!(["==", ["get", "class"], "river"])
        );
    }

    #[test]
    fn migrate_lowers_none_and_has() {
        assert_eq!(
            migrate_filter(&json!(["none", ["has", "brunnel"]])),
            json!(["all", ["!", ["has", "brunnel"]]])
        );
        assert_eq!(
            migrate_filter(&json!(["!has", "brunnel"])),
            json!(["!", ["has", "brunnel"]])
        );
    }

    #[test]
    fn migrate_passes_expressions_through() {
        let expr = json!(["==", ["get", "class"], "river"]);
        assert_eq!(migrate_filter(&expr), expr);
        let matcher = json!(["match", ["get", "class"], ["river"], true, false]);
        assert_eq!(migrate_filter(&matcher), matcher);
    }

    #[test]
    fn replace_expression_filters_rewrites_layers() {
        let style: StyleDocument = from_value(json!({
            "version": 8,
            "sources": {},
            "layers": [
                {"id": "rivers", "type": "line", "filter": ["==", "class", "river"]},
                {"id": "plain", "type": "line"}
            ]
        }))
        .unwrap();
        let style = replace_expression_filters(style);
        assert_eq!(
            style.layers[0].filter,
            Some(json!(["all", ["==", ["get", "class"], "river"]]))
        );
        assert_eq!(style.layers[1].filter, None);
    }
}
