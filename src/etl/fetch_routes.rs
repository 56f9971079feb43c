use futures_util::future::try_join_all;
use log::info;

use crate::data::osm::OverpassResponse;
use crate::data::transit::{RouteColor, RouteColorTable, RouteSegment};
use crate::errors::Result;
use crate::net::overpass::{route_query, OverpassSource};

use super::Etl;

pub const ETL_NAME: &str = "fetch_routes";

pub struct FetchRoutesEtl<'a, S> {
    source: &'a S,
    network: &'a str,
    route_colors: &'a RouteColorTable,
}

impl<'a, S: OverpassSource> FetchRoutesEtl<'a, S> {
    pub fn new(source: &'a S, network: &'a str, route_colors: &'a RouteColorTable) -> Self {
        FetchRoutesEtl {
            source,
            network,
            route_colors,
        }
    }

    async fn fetch_route(&self, route: &'a RouteColor) -> Result<(&'a RouteColor, OverpassResponse)> {
        let response = self.source.query(&route_query(self.network, &route.route_ref)).await?;
        info!(
            etl_name = ETL_NAME, route_ref = route.route_ref.as_str(), elements = response.elements.len();
            "Route response received"
        );
        Ok((route, response))
    }
}

impl<'a, S: OverpassSource> Etl for FetchRoutesEtl<'a, S> {
    type Input = Vec<(&'a RouteColor, OverpassResponse)>;
    type Output = Vec<RouteSegment>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    /// All refs at once; the first failure fails the batch.
    async fn extract(&mut self) -> Result<Self::Input> {
        let this = &*self;
        try_join_all(
            this.route_colors
                .entries()
                .iter()
                .map(|route| this.fetch_route(route))
        ).await
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let segments: Vec<RouteSegment> = input
            .iter()
            .flat_map(|(route, response)| {
                RouteSegment::from_response(&route.route_ref, &route.color, response)
            })
            .collect();
        info!(etl_name = ETL_NAME, segments = segments.len(); "Route segments built");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::etl::testing::CannedOverpass;

    /// Holds every query open for a few scheduler turns and notes how many queries
    /// had started by the time the first one finished.
    #[derive(Default)]
    struct SlowOverpass {
        started: AtomicUsize,
        started_at_first_finish: Mutex<Option<usize>>,
    }

    impl OverpassSource for SlowOverpass {
        async fn query(&self, _query: &str) -> Result<OverpassResponse> {
            self.started.fetch_add(1, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.started_at_first_finish
                .lock()
                .unwrap()
                .get_or_insert(self.started.load(Ordering::SeqCst));
            Ok(OverpassResponse::default())
        }
    }

    const ROUTE_ONE: &str = r#"{"elements": [
        {"type": "node", "id": 1, "lat": 10, "lon": 20},
        {"type": "node", "id": 2, "lat": 11, "lon": 21},
        {"type": "way", "id": 99, "nodes": [1, 2, 3]}
    ]}"#;

    const TWO_WAYS: &str = r#"{"elements": [
        {"type": "relation", "id": 500, "members": [], "tags": {"ref": "x"}},
        {"type": "node", "id": 1, "lat": 1, "lon": 1},
        {"type": "way", "id": 40, "nodes": [1]},
        {"type": "way", "id": 41, "nodes": [1, 1]}
    ]}"#;

    #[tokio::test]
    async fn single_route_end_to_end() {
        let table = RouteColorTable::new(vec![RouteColor {
            route_ref: "1".to_string(),
            color: "#76218a".to_string(),
        }]);
        let source = CannedOverpass::new(vec![("[\"ref\"=\"1\"]", Ok(ROUTE_ONE))]);

        let segments = FetchRoutesEtl::new(&source, "SCMC", &table).process().await.unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, "1");
        assert_eq!(segments[0].color, "#76218a");
        assert_eq!(
            serde_json::to_value(&segments[0].points).unwrap(),
            serde_json::json!([[10.0, 20.0], [11.0, 21.0]])
        );
    }

    #[tokio::test]
    async fn every_route_gets_its_table_color() {
        let table = RouteColorTable::default();
        let source = CannedOverpass::new(vec![("relation", Ok(TWO_WAYS))]);

        let segments = FetchRoutesEtl::new(&source, "SCMC", &table).process().await.unwrap();

        assert_eq!(segments.len(), 18);
        for entry in table.entries() {
            let colors: Vec<&str> = segments
                .iter()
                .filter(|segment| segment.id == entry.route_ref)
                .map(|segment| segment.color.as_str())
                .collect();
            assert_eq!(colors, vec![entry.color.as_str(); 2]);
        }
    }

    #[tokio::test]
    async fn segments_follow_table_order() {
        let table = RouteColorTable::default();
        let source = CannedOverpass::new(vec![("relation", Ok(TWO_WAYS))]);

        let segments = FetchRoutesEtl::new(&source, "SCMC", &table).process().await.unwrap();

        let ids: Vec<&str> = segments.iter().map(|segment| segment.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "1", "2", "2", "3", "3", "4", "4", "5", "5", "6", "6", "7", "7", "8", "8", "9", "9"]);
    }

    #[tokio::test]
    async fn route_queries_are_all_in_flight_together() {
        let table = RouteColorTable::default();
        let source = SlowOverpass::default();

        FetchRoutesEtl::new(&source, "SCMC", &table).process().await.unwrap();

        assert_eq!(source.started.load(Ordering::SeqCst), 9);
        assert_eq!(*source.started_at_first_finish.lock().unwrap(), Some(9));
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let table = RouteColorTable::default();
        let source = CannedOverpass::new(vec![
            ("[\"ref\"=\"9\"]", Err("overpass returned HTTP 429 Too Many Requests")),
            ("relation", Ok(TWO_WAYS)),
        ]);

        let result = FetchRoutesEtl::new(&source, "SCMC", &table).process().await;

        assert!(result.unwrap_err().message.contains("429"));
    }
}
