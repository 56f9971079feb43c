use std::time::Duration;

use log::{debug, warn};

use crate::data::osm::OverpassResponse;
use crate::errors::Result;

/// Anything that can answer an Overpass QL query.
pub trait OverpassSource {
    async fn query(&self, query: &str) -> Result<OverpassResponse>;
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn tag_filter(key: &str, value: &str) -> String {
    format!("[\"{}\"=\"{}\"]", escape(key), escape(value))
}

/// Ways of every bus route relation with the given ref in the network, plus the
/// nodes of those ways.
pub fn route_query(network: &str, route_ref: &str) -> String {
    format!(
        "[out:json];relation{}{}{};(way(r);>;);out body;",
        tag_filter("route", "bus"),
        tag_filter("network", network),
        tag_filter("ref", route_ref),
    )
}

/// Every bus stop node of the network.
pub fn stop_query(network: &str) -> String {
    format!(
        "[out:json];node{}{};out body;",
        tag_filter("highway", "bus_stop"),
        tag_filter("network", network),
    )
}

pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
}

impl OverpassClient {
    /// Without `timeout` only the transport's own defaults apply.
    pub fn new(url: &str, user_agent: &str, timeout: Option<Duration>) -> Result<OverpassClient> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(OverpassClient {
            client,
            url: url.to_string(),
        })
    }
}

impl OverpassSource for OverpassClient {
    async fn query(&self, query: &str) -> Result<OverpassResponse> {
        debug!(url = self.url.as_str(), query = query; "Sending Overpass query");
        let response = self.client
            .post(&self.url)
            .form(&[("data", query)])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(256)]).to_string();
            warn!(status = status.as_u16(), body = snippet.as_str(); "Overpass query rejected");
            return Err(format!("overpass returned HTTP {}: {}", status, snippet).into());
        }

        let parsed: OverpassResponse = serde_json::from_slice(&body)?;
        if let Some(remark) = parsed.runtime_error() {
            return Err(format!("overpass {}", remark).into());
        }
        Ok(parsed)
    }
}
