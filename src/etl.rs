pub mod draw_map;
pub mod fetch_routes;
pub mod fetch_stops;

use log::{info, error};

use crate::data::transit::{MapLayers, RouteColorTable};
use crate::errors::Result;
use crate::net::overpass::OverpassSource;

use self::fetch_routes::FetchRoutesEtl;
use self::fetch_stops::FetchStopsEtl;


pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    async fn extract(&mut self) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;

    async fn process(&mut self) -> Result<Self::Output> {
        info!(etl_name = self.etl_name(); "Starting ETL process");

        info!(etl_name = self.etl_name(); "Extracting");
        let input = match self.extract().await {
            Ok(input) => Ok(input),
            Err(err) => {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
                Err(err)
            },
        }?;

        info!(etl_name = self.etl_name(); "Transforming");
        let output = match self.transform(input) {
            Ok(output) => Ok(output),
            Err(err) => {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
                Err(err)
            },
        }?;

        info!(etl_name = self.etl_name(); "Process finished");
        Ok(output)
    }
}

/// Routes first, then stops. A failed route batch means the stop query is never sent.
pub async fn fetch_layers<S: OverpassSource>(
    source: &S,
    network: &str,
    route_colors: &RouteColorTable,
) -> Result<MapLayers> {
    let routes = FetchRoutesEtl::new(source, network, route_colors).process().await?;
    let stops = FetchStopsEtl::new(source, network).process().await?;
    Ok(MapLayers { routes, stops })
}
