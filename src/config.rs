use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    data::transit::RouteColorTable,
    errors::Result,
    etl::draw_map::{parse_color, Theme},
    net::tiles::TileLayerConfig,
    projection::Viewport,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/scmc.json";

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UserConfig {
    pub overpass_url: String,
    pub network: String,
    pub route_colors: RouteColorTable,
    pub viewport: Viewport,
    pub tiles: TileLayerConfig,
    pub theme: Theme,
    pub label_font_path: Option<String>,
    pub center_marker_label: Option<String>,
    pub dest_path: String,
    pub user_agent: String,
    pub http_timeout_secs: Option<u64>,
}

impl Default for UserConfig {
    fn default() -> Self {
        UserConfig {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            network: "SCMC".to_string(),
            route_colors: RouteColorTable::default(),
            viewport: Viewport::default(),
            tiles: TileLayerConfig::default(),
            theme: Theme::default(),
            label_font_path: None,
            center_marker_label: Some("พิกัดที่คุณต้องการ".to_string()),
            dest_path: "output".to_string(),
            user_agent: concat!("bus-map/", env!("CARGO_PKG_VERSION")).to_string(),
            http_timeout_secs: None,
        }
    }
}

impl UserConfig {
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.route_colors.is_empty() {
            return Err("Config lists no routes".into());
        }
        for entry in self.route_colors.entries() {
            parse_color(&entry.color)
                .map_err(|err| format!("Route {}: {}", entry.route_ref, err.message))?;
        }
        if self.network.is_empty()
            || self.network.contains(|c| c == '/' || c == '\\')
            || self.network.starts_with('.') {
            return Err(format!("Network {:?} cannot name an output directory", self.network).into());
        }
        if self.viewport.zoom > 22 {
            return Err(format!("Zoom {} out of range", self.viewport.zoom).into());
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<UserConfig> {
        let config: UserConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let json = fs::read_to_string(path)
        .map_err(|err| format!("Could not open config file {}: {}", path.display(), err))?;
    UserConfig::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transit::GeoPoint;

    #[test]
    fn empty_config_uses_map_constants() {
        let config = UserConfig::from_json("{}").unwrap();
        assert_eq!(config.network, "SCMC");
        assert_eq!(config.viewport.center, GeoPoint::new(18.79885, 98.95064));
        assert_eq!(config.viewport.zoom, 16);
        assert_eq!((config.viewport.width_px, config.viewport.height_px), (800, 500));
        assert_eq!(config.route_colors.len(), 9);
        assert_eq!(config.tiles.attribution, "© OpenStreetMap contributors");
        assert_eq!(config.http_timeout(), None);
    }

    #[test]
    fn client_timeout_is_opt_in() {
        let config = UserConfig::from_json(r#"{"http_timeout_secs": 90}"#).unwrap();
        assert_eq!(config.http_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn network_must_be_a_plain_directory_name() {
        for network in ["../x", "a/b", "a\\b", "", ".hidden"] {
            let json = serde_json::json!({ "network": network }).to_string();
            assert!(UserConfig::from_json(&json).is_err(), "{:?} accepted", network);
        }
        assert!(UserConfig::from_json(r#"{"network": "RTC Chiang Mai"}"#).is_ok());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("bus_map_config_{}.json", std::process::id()));
        fs::write(&path, r#"{"network": "RTC"}"#).unwrap();
        let config = load_user_config(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.network, "RTC");

        assert!(load_user_config(Path::new("does/not/exist.json")).unwrap_err().message.starts_with("Could not open"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = UserConfig::from_json(r##"{
            "network": "RTC",
            "viewport": {"center": [13.75, 100.5], "zoom": 12},
            "route_colors": [{"ref": "R1", "color": "#123456"}],
            "tiles": {"enabled": false}
        }"##).unwrap();
        assert_eq!(config.network, "RTC");
        assert_eq!(config.viewport.center, GeoPoint::new(13.75, 100.5));
        assert_eq!(config.viewport.width_px, 800);
        assert_eq!(config.route_colors.color_for("R1"), Some("#123456"));
        assert!(!config.tiles.enabled);
        assert!(config.tiles.url_template.contains("{z}"));
    }

    #[test]
    fn bad_route_color_is_rejected() {
        let err = UserConfig::from_json(r#"{"route_colors": [{"ref": "1", "color": "purple"}]}"#).unwrap_err();
        assert!(err.message.starts_with("Route 1"));
    }

    #[test]
    fn empty_route_table_is_rejected() {
        assert!(UserConfig::from_json(r#"{"route_colors": []}"#).is_err());
    }
}
