use std::time::Duration;

use log::debug;
use png::{BitDepth, ColorType, Transformations};
use serde::Deserialize;

use crate::errors::Result;
use crate::projection::TileKey;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TileLayerConfig {
    pub enabled: bool,
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub attribution: String,
}

impl Default for TileLayerConfig {
    fn default() -> Self {
        TileLayerConfig {
            enabled: true,
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            attribution: "© OpenStreetMap contributors".to_string(),
        }
    }
}

impl TileLayerConfig {
    pub fn tile_url(&self, key: &TileKey) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            let idx = (key.x as usize + key.y as usize) % self.subdomains.len();
            self.subdomains[idx].as_str()
        };
        self.url_template
            .replace("{s}", subdomain)
            .replace("{z}", &key.z.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }
}

/// Decoded tile as premultiplied ARGB, the layout raqote draws from.
pub struct OwnedImage {
    pub width: i32,
    pub height: i32,
    pub data: Vec<u32>,
}

fn premultiply(channel: u32, alpha: u32) -> u32 {
    (channel * alpha + 127) / 255
}

fn argb(r: u32, g: u32, b: u32, a: u32) -> u32 {
    (a << 24) + (premultiply(r, a) << 16) + (premultiply(g, a) << 8) + premultiply(b, a)
}

pub fn decode_tile(bytes: &[u8]) -> Result<OwnedImage> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);

    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    if info.bit_depth != BitDepth::Eight {
        return Err("Unsupported bit depth".into())
    }

    let pixels = &buf[..info.buffer_size()];
    let data: Vec<u32> = match info.color_type {
        ColorType::Rgba => pixels
            .chunks_exact(4)
            .map(|px| argb(px[0] as u32, px[1] as u32, px[2] as u32, px[3] as u32))
            .collect(),
        ColorType::Rgb => pixels
            .chunks_exact(3)
            .map(|px| argb(px[0] as u32, px[1] as u32, px[2] as u32, 0xff))
            .collect(),
        ColorType::GrayscaleAlpha => pixels
            .chunks_exact(2)
            .map(|px| argb(px[0] as u32, px[0] as u32, px[0] as u32, px[1] as u32))
            .collect(),
        ColorType::Grayscale => pixels
            .iter()
            .map(|g| argb(*g as u32, *g as u32, *g as u32, 0xff))
            .collect(),
        ColorType::Indexed => return Err("Palette was not expanded".into()),
    };

    Ok(OwnedImage {
        width: info.width.try_into()?,
        height: info.height.try_into()?,
        data,
    })
}

pub struct TileClient {
    client: reqwest::Client,
    layer: TileLayerConfig,
}

impl TileClient {
    pub fn new(layer: &TileLayerConfig, user_agent: &str, timeout: Option<Duration>) -> Result<TileClient> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(TileClient {
            client,
            layer: layer.clone(),
        })
    }

    pub async fn fetch(&self, key: TileKey) -> Result<(TileKey, OwnedImage)> {
        let url = self.layer.tile_url(&key);
        debug!(url = url.as_str(); "Fetching tile");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok((key, decode_tile(&bytes)?))
    }
}
