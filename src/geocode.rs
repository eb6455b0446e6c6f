use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;
use url::Url;

/// Result set for a forward-geocode query. Failures collapse to an empty
/// set; the caller never sees an error.
#[derive(Debug, Clone, Serialize)]
pub struct GeocodeResponse {
    pub features: Vec<Value>,
}

pub async fn search(client: &reqwest::Client, base_url: &str, query: &str) -> GeocodeResponse {
    match fetch(client, base_url, query).await {
        Ok(features) => GeocodeResponse { features },
        Err(e) => {
            error!("forward geocode failed for {:?}: {}", query, e);
            GeocodeResponse { features: Vec::new() }
        }
    }
}

async fn fetch(client: &reqwest::Client, base_url: &str, query: &str) -> Result<Vec<Value>> {
    let url = Url::parse_with_params(
        base_url,
        &[
            ("q", query),
            ("format", "geojson"),
            ("polygon_geojson", "1"),
            ("addressdetails", "1"),
        ],
    )?;

    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("place search returned {}", resp.status());
    }

    let geojson: Value = resp.json().await?;
    Ok(point_features(&geojson))
}

/// Map upstream results into point features centered on their bounding box
/// midpoint, carrying the display name. Results without a usable bbox are
/// skipped.
pub fn point_features(geojson: &Value) -> Vec<Value> {
    let Some(features) = geojson.get("features").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut points = Vec::new();
    for feature in features {
        let Some(bbox) = feature.get("bbox").and_then(Value::as_array) else {
            continue;
        };
        let coords: Vec<f64> = bbox.iter().filter_map(Value::as_f64).collect();
        if coords.len() < 4 {
            continue;
        }
        let (west, south, east, north) = (coords[0], coords[1], coords[2], coords[3]);
        let center = [west + (east - west) / 2.0, south + (north - south) / 2.0];

        let display_name = feature
            .pointer("/properties/display_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        points.push(json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": center
            },
            "place_name": display_name,
            "properties": feature.get("properties").cloned().unwrap_or_else(|| json!({})),
            "text": display_name,
            "place_type": ["place"],
            "center": center
        }));
    }
    points
}
