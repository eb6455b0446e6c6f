use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version of the style documents this service handles.
pub const STYLE_VERSION: u32 = 8;

/// A map style document. Only the fields the service transforms are typed;
/// everything else rides along in `extra` and survives a round-trip verbatim.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct StyleDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub sources: Map<String, Value>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glyphs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprite: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A style layer. `filter` stays raw JSON: it is either a legacy array
/// filter or an expression tree, and most code only moves it around.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub layer_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paint: Option<Map<String, Value>>,
    // Deprecated flag, dropped by normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A feature returned from a renderer hit-test, consumed read-only.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InspectFeature {
    pub layer: FeatureLayer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The slice of the originating layer a hit-test feature carries.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FeatureLayer {
    pub id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paint: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

/// Two georeferencing clicks plus the image's pixel dimensions.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CornersRequest {
    pub top_left: LngLat,
    pub bottom_right: LngLat,
    pub width: f64,
    pub height: f64,
}

/// The four geocoordinates of a georeferenced image overlay.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Corners {
    pub top_left: LngLat,
    pub bottom_left: LngLat,
    pub bottom_right: LngLat,
    pub top_right: LngLat,
}

/// Editor settings persisted across sessions.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EditorSettings {
    #[serde(default)]
    pub auto_export_expression_filter: bool,
}
