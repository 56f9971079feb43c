use log::info;

use crate::data::osm::OverpassResponse;
use crate::data::transit::Stop;
use crate::errors::Result;
use crate::net::overpass::{stop_query, OverpassSource};

use super::Etl;

pub const ETL_NAME: &str = "fetch_stops";

pub struct FetchStopsEtl<'a, S> {
    source: &'a S,
    network: &'a str,
}

impl<'a, S: OverpassSource> FetchStopsEtl<'a, S> {
    pub fn new(source: &'a S, network: &'a str) -> Self {
        FetchStopsEtl { source, network }
    }
}

impl<S: OverpassSource> Etl for FetchStopsEtl<'_, S> {
    type Input = OverpassResponse;
    type Output = Vec<Stop>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    async fn extract(&mut self) -> Result<Self::Input> {
        self.source.query(&stop_query(self.network)).await
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let stops = Stop::from_response(&input);
        info!(etl_name = ETL_NAME, elements = input.elements.len(), stops = stops.len(); "Stops built");
        Ok(stops)
    }
}
