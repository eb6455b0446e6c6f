use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::models::{InspectFeature, Layer, StyleDocument};

/// Paint properties probed for a popup swatch, in priority order.
const COLOR_PAINT_PROPS: [&str; 4] = [
    "text-color",
    "fill-color",
    "line-color",
    "fill-extrusion-color",
];

const DEFAULT_COLOR: &str = "black";
const INSPECT_BACKGROUND_COLOR: &str = "#1c1f24";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupedFeature {
    #[serde(flatten)]
    pub feature: InspectFeature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceLayerGroup {
    pub source_layer: String,
    pub features: Vec<GroupedFeature>,
}

/// One popup row, ready for rendering.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PopupRow {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PopupGroup {
    pub source_layer: String,
    pub layers: Vec<PopupRow>,
}

/// Group hit-test features by their layer's `source-layer`, in input order.
/// A repeated layer id bumps a counter on its first occurrence instead of
/// adding another row, so overlapping hits render as one "×N" badge.
pub fn group_by_source_layer(features: &[InspectFeature]) -> Vec<SourceLayerGroup> {
    let mut groups: Vec<SourceLayerGroup> = Vec::new();
    let mut occurrences: HashMap<String, u32> = HashMap::new();

    for feature in features {
        let layer_id = feature.layer.id.clone();
        let source_layer = feature.layer.source_layer.clone().unwrap_or_default();

        if let Some(count) = occurrences.get_mut(&layer_id) {
            *count += 1;
            let count = *count;
            let entry = groups
                .iter_mut()
                .find(|group| group.source_layer == source_layer)
                .and_then(|group| {
                    group
                        .features
                        .iter_mut()
                        .find(|grouped| grouped.feature.layer.id == layer_id)
                });
            if let Some(entry) = entry {
                entry.counter = Some(count);
            }
            continue;
        }

        occurrences.insert(layer_id, 1);
        let grouped = GroupedFeature {
            feature: feature.clone(),
            counter: None,
        };
        match groups
            .iter_mut()
            .find(|group| group.source_layer == source_layer)
        {
            Some(group) => group.features.push(grouped),
            None => groups.push(SourceLayerGroup {
                source_layer,
                features: vec![grouped],
            }),
        }
    }

    groups
}

/// Swatch color for a feature: first present color paint property in
/// priority order; anything absent or unusable falls back to black.
pub fn feature_color(feature: &InspectFeature) -> String {
    let Some(paint) = &feature.layer.paint else {
        return DEFAULT_COLOR.to_string();
    };
    for prop in COLOR_PAINT_PROPS {
        match paint.get(prop) {
            None | Some(Value::Null) => continue,
            Some(Value::String(color)) if color.is_empty() => continue,
            Some(Value::String(color)) => return color.clone(),
            // Data-driven color: render its source text rather than guessing.
            Some(other) => return other.to_string(),
        }
    }
    DEFAULT_COLOR.to_string()
}

/// Grouping and color resolution combined into render-ready popup rows.
pub fn popup_rows(features: &[InspectFeature]) -> Vec<PopupGroup> {
    group_by_source_layer(features)
        .into_iter()
        .map(|group| PopupGroup {
            source_layer: group.source_layer,
            layers: group
                .features
                .into_iter()
                .map(|grouped| PopupRow {
                    id: grouped.feature.layer.id.clone(),
                    kind: grouped.feature.layer.kind.clone(),
                    color: feature_color(&grouped.feature),
                    counter: grouped.counter,
                })
                .collect(),
        })
        .collect()
}

/// Deterministic bright color for a layer id, stable across processes.
pub fn bright_color(layer_id: &str) -> String {
    // FNV-1a over the id picks the hue.
    let mut hash: u32 = 0x811c9dc5;
    for byte in layer_id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("hsl({}, 90%, 60%)", hash % 360)
}

/// Debugging variant of a style: dark background, raster sources dropped,
/// every remaining layer repainted with a color derived from its id.
pub fn build_inspect_style(style: &StyleDocument) -> StyleDocument {
    let mut inspected = style.clone();

    inspected.sources = style
        .sources
        .iter()
        .filter(|(_, source)| {
            let kind = source.get("type").and_then(Value::as_str);
            !matches!(kind, Some("raster") | Some("raster-dem"))
        })
        .map(|(name, source)| (name.clone(), source.clone()))
        .collect();

    let mut layers = vec![Layer {
        id: "background".to_string(),
        kind: Some("background".to_string()),
        paint: Some(
            [("background-color".to_string(), json!(INSPECT_BACKGROUND_COLOR))]
                .into_iter()
                .collect(),
        ),
        ..Layer::default()
    }];

    for layer in &style.layers {
        if layer.kind.as_deref() == Some("background") {
            continue;
        }
        if let Some(source) = &layer.source {
            if !inspected.sources.contains_key(source) {
                continue;
            }
        }
        layers.push(colorize_layer(layer));
    }

    inspected.layers = layers;
    inspected
}

fn colorize_layer(layer: &Layer) -> Layer {
    let color = bright_color(&layer.id);
    let paint_prop = match layer.kind.as_deref() {
        Some("symbol") => "text-color",
        Some("fill") => "fill-color",
        Some("fill-extrusion") => "fill-extrusion-color",
        Some("circle") => "circle-color",
        Some("heatmap") => "heatmap-color",
        _ => "line-color",
    };
    let mut paint = Map::new();
    paint.insert(paint_prop.to_string(), json!(color));

    Layer {
        id: layer.id.clone(),
        kind: layer.kind.clone(),
        source: layer.source.clone(),
        source_layer: layer.source_layer.clone(),
        minzoom: layer.minzoom,
        maxzoom: layer.maxzoom,
        filter: layer.filter.clone(),
        paint: Some(paint),
        ..Layer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_value;

    fn feature(layer_id: &str, source_layer: &str, paint: Value) -> InspectFeature {
        from_value(json!({
            "layer": {
                "id": layer_id,
                "type": "line",
                "source-layer": source_layer,
                "paint": paint
            },
            "properties": {}
        }))
        .unwrap()
    }

    #[test]
    fn duplicate_layer_hits_collapse_into_counter() {
        let features = vec![
            feature("roads", "transportation", json!({"line-color": "#f00"})),
            feature("roads", "transportation", json!({"line-color": "#f00"})),
        ];
        let groups = group_by_source_layer(&features);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source_layer, "transportation");
        assert_eq!(groups[0].features.len(), 1);
        assert_eq!(groups[0].features[0].counter, Some(2));
    }

    #[test]
    fn groups_preserve_input_order() {
        let features = vec![
            feature("water", "water", json!({"fill-color": "#00f"})),
            feature("roads", "transportation", json!({"line-color": "#f00"})),
            feature("bridges", "transportation", json!({"line-color": "#999"})),
        ];
        let groups = group_by_source_layer(&features);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source_layer, "water");
        assert_eq!(groups[1].source_layer, "transportation");
        assert_eq!(groups[1].features[0].feature.layer.id, "roads");
        assert_eq!(groups[1].features[1].feature.layer.id, "bridges");
    }

    #[test]
    fn color_follows_paint_priority() {
        let both = feature(
            "labels",
            "place",
            json!({"fill-color": "#0f0", "text-color": "#fff"}),
        );
        assert_eq!(feature_color(&both), "#fff");

        let line = feature("roads", "transportation", json!({"line-color": "#f00"}));
        assert_eq!(feature_color(&line), "#f00");
    }

    #[test]
    fn color_skips_empty_and_null_values() {
        let sparse = feature(
            "roads",
            "transportation",
            json!({"text-color": null, "fill-color": "", "line-color": "#123456"}),
        );
        assert_eq!(feature_color(&sparse), "#123456");
    }

    #[test]
    fn color_defaults_to_black() {
        let bare = feature("roads", "transportation", json!({}));
        assert_eq!(feature_color(&bare), "black");

        let no_paint: InspectFeature = from_value(json!({
            "layer": {"id": "roads", "source-layer": "transportation"}
        }))
        .unwrap();
        assert_eq!(feature_color(&no_paint), "black");
    }

    #[test]
    fn popup_rows_carry_color_and_counter() {
        let features = vec![
            feature("roads", "transportation", json!({"line-color": "#f00"})),
            feature("roads", "transportation", json!({"line-color": "#f00"})),
        ];
        let groups = popup_rows(&features);
        assert_eq!(groups[0].layers[0].color, "#f00");
        assert_eq!(groups[0].layers[0].counter, Some(2));
    }

    #[test]
    fn bright_color_is_stable_per_id() {
        assert_eq!(bright_color("water"), bright_color("water"));
        assert_ne!(bright_color("water"), bright_color("roads"));
        assert!(bright_color("water").starts_with("hsl("));
    }

    #[test]
    fn inspect_style_drops_raster_sources_and_their_layers() {
        let style: StyleDocument = from_value(json!({
            "version": 8,
            "sources": {
                "satellite": {"type": "raster", "tiles": []},
                "hills": {"type": "raster-dem", "tiles": []},
                "openmaptiles": {"type": "vector", "url": "http://x"}
            },
            "layers": [
                {"id": "photo", "type": "raster", "source": "satellite"},
                {"id": "water", "type": "fill", "source": "openmaptiles", "source-layer": "water"}
            ]
        }))
        .unwrap();
        let inspected = build_inspect_style(&style);
        assert_eq!(inspected.sources.len(), 1);
        assert!(inspected.sources.contains_key("openmaptiles"));
        let ids: Vec<&str> = inspected.layers.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["background", "water"]);
    }

    #[test]
    fn inspect_style_recolors_layers() {
        let style: StyleDocument = from_value(json!({
            "version": 8,
            "sources": {"openmaptiles": {"type": "vector", "url": "http://x"}},
            "layers": [
                {"id": "water", "type": "fill", "source": "openmaptiles",
                 "paint": {"fill-color": "#00f", "fill-opacity": 0.5}}
            ]
        }))
        .unwrap();
        let inspected = build_inspect_style(&style);
        let water = &inspected.layers[1];
        let paint = water.paint.as_ref().unwrap();
        assert_eq!(paint.len(), 1);
        assert_eq!(paint.get("fill-color"), Some(&json!(bright_color("water"))));
    }
}
