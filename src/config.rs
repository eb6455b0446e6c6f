use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub thread_count: Option<usize>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,
    /// Style fetched when the store is empty. Optional; an empty style is
    /// used when unset or unreachable.
    pub default_style_url: Option<String>,
    /// Fallback access tokens keyed by canonical source name.
    #[serde(default)]
    pub access_tokens: HashMap<String, String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("data/templates")
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = if std::path::Path::new("rstyle.toml").exists() {
            "rstyle.toml"
        } else if std::path::Path::new("rstyle.example.toml").exists() {
            "rstyle.example.toml"
        } else {
            return Err(anyhow::anyhow!(
                "Configuration file not found. Please create rstyle.toml or provide rstyle.example.toml."
            ));
        };

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3001");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.geocoder_url, "https://nominatim.openstreetmap.org/search");
        assert!(config.access_tokens.is_empty());
        assert!(config.default_style_url.is_none());
    }

    #[test]
    fn access_tokens_table_parses() {
        let config: Config = toml::from_str(
            r#"
listen_addr = "127.0.0.1:8080"

[access_tokens]
openmaptiles = "omt-token"
thunderforest = "tf-token"
"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.access_tokens["openmaptiles"], "omt-token");
    }
}
