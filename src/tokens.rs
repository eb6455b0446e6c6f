use std::collections::HashMap;

use serde_json::Value;

use crate::models::StyleDocument;

/// Namespace used for tool-specific keys in style metadata.
pub const TOKEN_NAMESPACE: &str = "rstyle";

const TOKEN_KEY_SUFFIX: &str = "_access_token";
const TOKEN_PLACEHOLDER: &str = "{key}";

/// Glyph hosts that take the token resolved for this reserved source.
const GLYPHS_TOKEN_SOURCE: &str = "openmaptiles";
const GLYPHS_TOKEN_HOSTS: [&str; 2] = [".tilehosting.com", ".maptiler.com"];

/// Provider aliases share one token namespace.
fn canonical_source(source_name: &str) -> &str {
    match source_name {
        "thunderforest_transport" | "thunderforest_outdoors" => "thunderforest",
        other => other,
    }
}

/// Metadata key carrying the access token for a source.
pub fn token_metadata_key(source_name: &str) -> String {
    format!("{TOKEN_NAMESPACE}:{}{TOKEN_KEY_SUFFIX}", canonical_source(source_name))
}

/// Resolve the access token for a source: document metadata first, then the
/// configured fallback table when `allow_fallback` is set.
pub fn resolve_token(
    source_name: &str,
    style: &StyleDocument,
    fallback: &HashMap<String, String>,
    allow_fallback: bool,
) -> Option<String> {
    let from_metadata = style
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get(&token_metadata_key(source_name)))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    from_metadata.or_else(|| {
        if !allow_fallback {
            return None;
        }
        fallback
            .get(canonical_source(source_name))
            .filter(|token| !token.is_empty())
            .cloned()
    })
}

/// Substitute resolved tokens into every templated source `url`, and into
/// the glyphs template when it points at a known provider host. Sources
/// without a resolvable token are left untouched.
pub fn substitute_tokens(
    style: StyleDocument,
    fallback: &HashMap<String, String>,
    allow_fallback: bool,
) -> StyleDocument {
    let mut style = style;
    let source_names: Vec<String> = style.sources.keys().cloned().collect();
    for source_name in source_names {
        let Some(token) = resolve_token(&source_name, &style, fallback, allow_fallback) else {
            continue;
        };
        let Some(source) = style.sources.get_mut(&source_name) else {
            continue;
        };
        let Some(url) = source.get("url").and_then(Value::as_str) else {
            continue;
        };
        if url.contains(TOKEN_PLACEHOLDER) {
            let replaced = url.replace(TOKEN_PLACEHOLDER, &token);
            source["url"] = Value::String(replaced);
        }
    }

    if let Some(glyphs) = style.glyphs.clone() {
        if GLYPHS_TOKEN_HOSTS.iter().any(|host| glyphs.contains(host)) {
            if let Some(token) = resolve_token(GLYPHS_TOKEN_SOURCE, &style, fallback, allow_fallback)
            {
                style.glyphs = Some(glyphs.replace(TOKEN_PLACEHOLDER, &token));
            }
        }
    }

    style
}

/// Drop every token-carrying metadata key. Applied before export so shared
/// files never leak credentials.
pub fn strip_tokens(mut style: StyleDocument) -> StyleDocument {
    if let Some(metadata) = &mut style.metadata {
        metadata.retain(|key, _| !is_token_metadata_key(key));
    }
    style
}

pub fn is_token_metadata_key(key: &str) -> bool {
    key.starts_with(TOKEN_NAMESPACE)
        && key[TOKEN_NAMESPACE.len()..].starts_with(':')
        && key.ends_with(TOKEN_KEY_SUFFIX)
}
