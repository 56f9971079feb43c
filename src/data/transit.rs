use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::osm::{Node, OsmId, OverpassResponse, Way};

/// WGS84 coordinates, serialized as `[lat, lon]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(value: [f64; 2]) -> Self {
        GeoPoint {
            lat: value[0],
            lon: value[1],
        }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(value: GeoPoint) -> Self {
        [value.lat, value.lon]
    }
}

impl From<&Node> for GeoPoint {
    fn from(value: &Node) -> Self {
        GeoPoint {
            lat: value.lat,
            lon: value.lon,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteColor {
    #[serde(rename = "ref")]
    pub route_ref: String,
    pub color: String,
}

/// Route reference to display color. Entry order is the order routes are fetched
/// and drawn in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct RouteColorTable {
    entries: Vec<RouteColor>,
}

const SCMC_ROUTE_COLORS: [(&str, &str); 9] = [
    ("1", "#76218a"),
    ("2", "#e4007f"),
    ("3", "#00a0e9"),
    ("4", "#f39800"),
    ("5", "#009944"),
    ("6", "#e60012"),
    ("7", "#1d2088"),
    ("8", "#8fc31f"),
    ("9", "#a0522d"),
];

impl Default for RouteColorTable {
    fn default() -> Self {
        RouteColorTable::new(
            SCMC_ROUTE_COLORS
                .iter()
                .map(|(route_ref, color)| RouteColor {
                    route_ref: route_ref.to_string(),
                    color: color.to_string(),
                })
                .collect(),
        )
    }
}

impl RouteColorTable {
    pub fn new(entries: Vec<RouteColor>) -> Self {
        RouteColorTable { entries }
    }

    pub fn entries(&self) -> &[RouteColor] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
impl RouteColorTable {
    pub fn color_for(&self, route_ref: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.route_ref == route_ref)
            .map(|entry| entry.color.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Node id to coordinates, scoped to a single response.
pub struct NodeIndex {
    points: HashMap<OsmId, GeoPoint>,
}

impl NodeIndex {
    pub fn build(response: &OverpassResponse) -> Self {
        NodeIndex {
            points: response.nodes().map(|node| (node.id, node.into())).collect(),
        }
    }

    pub fn get(&self, id: OsmId) -> Option<GeoPoint> {
        self.points.get(&id).copied()
    }

    /// Resolves the way's node references in order. References missing from the
    /// index are skipped.
    pub fn resolve(&self, way: &Way) -> Vec<GeoPoint> {
        way.nodes.iter().filter_map(|id| self.get(*id)).collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RouteSegment {
    pub id: String,
    pub way_id: OsmId,
    pub color: String,
    pub points: Vec<GeoPoint>,
}

impl RouteSegment {
    /// One segment per way in the response, even when none of its nodes resolve.
    pub fn from_response(route_ref: &str, color: &str, response: &OverpassResponse) -> Vec<RouteSegment> {
        let index = NodeIndex::build(response);
        response.ways()
            .map(|way| RouteSegment {
                id: route_ref.to_string(),
                way_id: way.id,
                color: color.to_string(),
                points: index.resolve(way),
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: OsmId,
    pub point: GeoPoint,
    pub name: Option<String>,
}

impl From<&Node> for Stop {
    fn from(value: &Node) -> Self {
        Stop {
            id: value.id,
            point: value.into(),
            name: value.tag("name").map(str::to_string),
        }
    }
}

impl Stop {
    pub fn from_response(response: &OverpassResponse) -> Vec<Stop> {
        response.nodes().map(|node| node.into()).collect()
    }
}

/// Everything the map draws on top of the base tiles.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct MapLayers {
    pub routes: Vec<RouteSegment>,
    pub stops: Vec<Stop>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> OverpassResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn unresolved_node_is_dropped() {
        let response = response(r#"{"elements": [
            {"type": "node", "id": 1, "lat": 10, "lon": 20},
            {"type": "node", "id": 2, "lat": 11, "lon": 21},
            {"type": "way", "id": 99, "nodes": [1, 2, 3]}
        ]}"#);

        let segments = RouteSegment::from_response("1", "#76218a", &response);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, "1");
        assert_eq!(segments[0].color, "#76218a");
        assert_eq!(segments[0].way_id, 99);
        assert_eq!(
            serde_json::to_value(&segments[0].points).unwrap(),
            serde_json::json!([[10.0, 20.0], [11.0, 21.0]])
        );
    }

    #[test]
    fn resolved_way_keeps_length_and_order() {
        let response = response(r#"{"elements": [
            {"type": "way", "id": 7, "nodes": [3, 1, 2, 1]},
            {"type": "node", "id": 1, "lat": 1, "lon": 1},
            {"type": "node", "id": 2, "lat": 2, "lon": 2},
            {"type": "node", "id": 3, "lat": 3, "lon": 3}
        ]}"#);

        let segments = RouteSegment::from_response("4", "#f39800", &response);

        let lats: Vec<f64> = segments[0].points.iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![3.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn gaps_keep_remaining_order() {
        let response = response(r#"{"elements": [
            {"type": "node", "id": 1, "lat": 1, "lon": 1},
            {"type": "node", "id": 3, "lat": 3, "lon": 3},
            {"type": "node", "id": 5, "lat": 5, "lon": 5},
            {"type": "way", "id": 7, "nodes": [5, 4, 3, 2, 1]}
        ]}"#);

        let segments = RouteSegment::from_response("2", "#e4007f", &response);

        let lats: Vec<f64> = segments[0].points.iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn way_without_resolvable_nodes_still_yields_segment() {
        let response = response(r#"{"elements": [
            {"type": "way", "id": 7, "nodes": [1, 2]},
            {"type": "way", "id": 8, "nodes": []}
        ]}"#);

        let segments = RouteSegment::from_response("3", "#00a0e9", &response);

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|segment| segment.points.is_empty()));
    }

    #[test]
    fn stops_take_name_tag_when_present() {
        let response = response(r#"{"elements": [
            {"type": "node", "id": 1, "lat": 18.79, "lon": 98.95, "tags": {"highway": "bus_stop", "name": "Wat Phra Singh"}},
            {"type": "node", "id": 2, "lat": 18.80, "lon": 98.96, "tags": {"highway": "bus_stop"}},
            {"type": "way", "id": 3, "nodes": [1, 2]}
        ]}"#);

        let stops = Stop::from_response(&response);

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].name.as_deref(), Some("Wat Phra Singh"));
        assert_eq!(stops[0].point, GeoPoint::new(18.79, 98.95));
        assert_eq!(stops[1].name, None);
    }

    #[test]
    fn default_color_table_has_nine_routes() {
        let table = RouteColorTable::default();
        assert_eq!(table.len(), 9);
        assert_eq!(table.color_for("1"), Some("#76218a"));
        assert_eq!(table.color_for("10"), None);
    }

    #[test]
    fn color_table_reads_from_json_list() {
        let table: RouteColorTable = serde_json::from_str(
            r##"[{"ref": "R1", "color": "#ff0000"}, {"ref": "R2", "color": "#00ff00"}]"##
        ).unwrap();
        assert_eq!(table.entries()[1].route_ref, "R2");
        assert_eq!(table.color_for("R1"), Some("#ff0000"));
    }
}
