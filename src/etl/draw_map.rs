use std::{collections::{HashMap, HashSet}, f32::consts::PI, fs::File, path::{Path, PathBuf}};

use futures_util::future::try_join_all;
use log::{info, warn};
use raqote::{DrawOptions, DrawTarget, Image, LineCap, LineJoin, PathBuilder, Point, SolidSource, Source, StrokeStyle};
use regex::Regex;
use serde::Deserialize;

use crate::{
    config::UserConfig,
    data::transit::{GeoPoint, MapLayers, RouteSegment, Stop},
    errors::Result,
    net::tiles::{OwnedImage, TileClient},
    projection::{TileKey, TilePlacement, ViewportProjection},
};

use super::Etl;

mod fk {
    pub use font_kit::font::Font;
    pub use pathfinder_geometry::vector::vec2f;
}

pub const ETL_NAME: &str = "draw_map";
pub const OUTPUT_FILE_NAME: &str = "map.png";
pub const DEFAULT_STOP_LABEL: &str = "Bus stop";

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(string: &str) -> Result<SolidSource> {
    let re = Regex::new(r"^#([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})?$")?;
    let captures = re.captures(string)
        .ok_or_else(|| format!("Invalid color {:?}, expected #rrggbb or #rrggbbaa", string))?;
    let channel = |idx: usize| -> Result<u8> {
        match captures.get(idx) {
            Some(hex) => u8::from_str_radix(hex.as_str(), 16)
                .map_err(|err| format!("Invalid color {:?}: {}", string, err).into()),
            None => Ok(0xff),
        }
    };
    Ok(SolidSource::from_unpremultiplied_argb(channel(4)?, channel(1)?, channel(2)?, channel(3)?))
}

mod serialize_color {
    use raqote::SolidSource;
    use serde::{de, Deserializer};
    use serde::de::Visitor;

    struct ColorVisitor;

    impl<'de> Visitor<'de> for ColorVisitor {
        type Value = SolidSource;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a color string like '#76218a' or '#76218aff'")
        }

        fn visit_str<E>(self, string: &str) -> Result<Self::Value, E> where E: de::Error {
            super::parse_color(string).map_err(|err| de::Error::custom(err.message))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SolidSource, D::Error>
        where D: Deserializer<'de> {
        deserializer.deserialize_str(ColorVisitor)
    }
}

/// One filled and/or stroked circle. Transparent colors or a zero stroke width
/// switch that part off.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MarkerStyle {
    pub radius: f32,

    #[serde(deserialize_with = "serialize_color::deserialize")]
    pub fill: SolidSource,

    #[serde(deserialize_with = "serialize_color::deserialize")]
    pub stroke: SolidSource,

    pub stroke_width: f32,
}

const TRANSPARENT: SolidSource = SolidSource { r: 0, g: 0, b: 0, a: 0 };

impl Default for MarkerStyle {
    fn default() -> Self {
        MarkerStyle {
            radius: 4.0,
            fill: SolidSource::from_unpremultiplied_argb(0xff, 0x1d, 0x4e, 0xd8),
            stroke: TRANSPARENT,
            stroke_width: 0.0,
        }
    }
}

/// Stops are drawn as an outer ring with an inner dot on top.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StopMarkerStyle {
    pub outer: MarkerStyle,
    pub inner: MarkerStyle,
}

impl Default for StopMarkerStyle {
    fn default() -> Self {
        StopMarkerStyle {
            outer: MarkerStyle {
                radius: 7.0,
                fill: SolidSource::from_unpremultiplied_argb(0xcc, 0xff, 0xff, 0xff),
                stroke: SolidSource::from_unpremultiplied_argb(0xff, 0x1d, 0x4e, 0xd8),
                stroke_width: 2.5,
            },
            inner: MarkerStyle {
                radius: 3.5,
                fill: SolidSource::from_unpremultiplied_argb(0xff, 0x1d, 0x4e, 0xd8),
                stroke: TRANSPARENT,
                stroke_width: 0.0,
            },
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "serialize_color::deserialize")]
    pub background_color: SolidSource,

    #[serde(deserialize_with = "serialize_color::deserialize")]
    pub text_color: SolidSource,

    pub route_width: f32,
    pub label_size: f32,
    pub attribution_size: f32,
    pub show_stop_labels: bool,
    pub stop_marker: StopMarkerStyle,
    pub center_marker: MarkerStyle,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            background_color: SolidSource::from_unpremultiplied_argb(0xff, 0xf2, 0xef, 0xe9),
            text_color: SolidSource::from_unpremultiplied_argb(0xff, 0x22, 0x22, 0x22),
            route_width: 5.0,
            label_size: 12.0,
            attribution_size: 10.0,
            show_stop_labels: true,
            stop_marker: StopMarkerStyle::default(),
            center_marker: MarkerStyle {
                radius: 9.0,
                fill: SolidSource::from_unpremultiplied_argb(0x99, 0xe6, 0x00, 0x12),
                stroke: SolidSource::from_unpremultiplied_argb(0xff, 0xe6, 0x00, 0x12),
                stroke_width: 2.0,
            },
        }
    }
}

pub(crate) fn stop_label(stop: &Stop) -> &str {
    stop.name.as_deref().unwrap_or(DEFAULT_STOP_LABEL)
}

pub struct DrawMapEtl<'a> {
    user_config: &'a UserConfig,
    layers: &'a MapLayers,
    projection: ViewportProjection,
    route_colors: HashMap<String, SolidSource>,
    tile_client: Option<TileClient>,
    font: Option<fk::Font>,
    theme: &'a Theme,
}

impl<'a> DrawMapEtl<'a> {
    pub fn new(user_config: &'a UserConfig, layers: &'a MapLayers) -> Result<DrawMapEtl<'a>> {
        let font = match &user_config.label_font_path {
            Some(path) => {
                let font: fk::Font = font_kit::loader::Loader::from_file(&mut File::open(path)?, 0)?;
                Some(font)
            },
            None => None,
        };

        let tile_client = if user_config.tiles.enabled {
            Some(TileClient::new(&user_config.tiles, &user_config.user_agent, user_config.http_timeout())?)
        } else {
            None
        };

        let mut route_colors = HashMap::new();
        for segment in &layers.routes {
            if !route_colors.contains_key(&segment.color) {
                route_colors.insert(segment.color.clone(), parse_color(&segment.color)?);
            }
        }

        Ok(DrawMapEtl {
            user_config,
            layers,
            projection: ViewportProjection::new(&user_config.viewport),
            route_colors,
            tile_client,
            font,
            theme: &user_config.theme,
        })
    }

    pub fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    pub fn save(dt: &DrawTarget, dir: &Path) -> Result<()> {
        dt.write_png(Self::output_path(dir))?;
        Ok(())
    }

    fn stroke(width: f32) -> StrokeStyle {
        StrokeStyle {
            cap: LineCap::Round,
            join: LineJoin::Round,
            width,
            miter_limit: 2.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }

    fn draw_tile(dt: &mut DrawTarget, placement: &TilePlacement, tile: &OwnedImage) {
        let (x, y) = placement.offset;
        let img = Image {
            width: tile.width,
            height: tile.height,
            data: &tile.data,
        };
        dt.draw_image_at(x, y, &img, &DrawOptions::new());
    }

    fn draw_route(&self, dt: &mut DrawTarget, segment: &RouteSegment) {
        if segment.points.len() < 2 {
            return;
        }
        let Some(color) = self.route_colors.get(&segment.color) else {
            return;
        };

        let mut pb = PathBuilder::new();
        let (x0, y0) = self.projection.project(&segment.points[0]);
        pb.move_to(x0, y0);

        for coords in &segment.points[1..] {
            let (x, y) = self.projection.project(coords);
            pb.line_to(x, y);
        }
        let raquote_path = pb.finish();

        dt.stroke(
            &raquote_path,
            &Source::Solid(*color),
            &Self::stroke(self.theme.route_width),
            &DrawOptions::new(),
        );
    }

    fn draw_marker(dt: &mut DrawTarget, x: f32, y: f32, style: &MarkerStyle) {
        let mut pb = PathBuilder::new();
        pb.arc(x, y, style.radius, 0.0, 2.0 * PI);
        pb.close();
        let circle = pb.finish();

        let draw_options = DrawOptions::new();
        if style.fill.a > 0 {
            dt.fill(&circle, &Source::Solid(style.fill), &draw_options);
        }
        if style.stroke.a > 0 && style.stroke_width > 0.0 {
            dt.stroke(&circle, &Source::Solid(style.stroke), &Self::stroke(style.stroke_width), &draw_options);
        }
    }

    /// Draws `text` with its baseline at `y`. `anchor` is the fraction of the text
    /// width placed left of `x` (0.5 centers, 1.0 right-aligns).
    fn draw_text(&self, dt: &mut DrawTarget, x: f32, y: f32, point_size: f32, anchor: f32, text: &str) -> Result<()> {
        let Some(font) = &self.font else {
            return Ok(());
        };
        let scale = point_size / font.metrics().units_per_em as f32;
        let mut start = fk::vec2f(x, y);
        let mut ids = Vec::new();
        let mut positions = Vec::new();
        for c in text.chars() {
            let Some(id) = font.glyph_for_char(c) else {
                continue;
            };
            ids.push(id);
            positions.push(Point::new(start.x(), start.y()));
            start += font.advance(id)? * scale;
        }
        let total_width = start.x() - x;
        for position in &mut positions {
            position.x -= total_width * anchor;
        }
        let source = Source::Solid(self.theme.text_color);
        dt.draw_glyphs(font, point_size, &ids, &positions, &source, &DrawOptions::new());
        Ok(())
    }

    fn draw_stop(&self, dt: &mut DrawTarget, stop: &Stop) -> Result<()> {
        let (x, y) = self.projection.project(&stop.point);
        let style = &self.theme.stop_marker;
        Self::draw_marker(dt, x, y, &style.outer);
        Self::draw_marker(dt, x, y, &style.inner);

        if self.theme.show_stop_labels {
            let label = stop_label(stop);
            let below = style.outer.radius + self.theme.label_size + 2.0;
            self.draw_text(dt, x, y + below, self.theme.label_size, 0.5, label)?;
        }
        Ok(())
    }

    fn draw_center_marker(&self, dt: &mut DrawTarget) -> Result<()> {
        let center: &GeoPoint = &self.user_config.viewport.center;
        let (x, y) = self.projection.project(center);
        let style = &self.theme.center_marker;
        Self::draw_marker(dt, x, y, style);
        if let Some(label) = &self.user_config.center_marker_label {
            self.draw_text(dt, x, y - style.radius - 4.0, self.theme.label_size, 0.5, label)?;
        }
        Ok(())
    }

    fn draw_attribution(&self, dt: &mut DrawTarget) -> Result<()> {
        if !self.user_config.tiles.enabled || self.user_config.tiles.attribution.is_empty() {
            return Ok(());
        }
        let x = dt.width() as f32 - 4.0;
        let y = dt.height() as f32 - 4.0;
        self.draw_text(dt, x, y, self.theme.attribution_size, 1.0, &self.user_config.tiles.attribution)
    }
}

impl Etl for DrawMapEtl<'_> {
    type Input = HashMap<TileKey, OwnedImage>;

    type Output = DrawTarget;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    async fn extract(&mut self) -> Result<Self::Input> {
        let Some(client) = &self.tile_client else {
            warn!(etl_name = ETL_NAME; "Tile layer disabled, drawing on plain background");
            return Ok(HashMap::new());
        };
        // A key repeats when the world wraps inside the viewport; download it once.
        let keys: HashSet<TileKey> = self.projection.visible_tiles()
            .into_iter()
            .map(|placement| placement.key)
            .collect();
        info!(etl_name = ETL_NAME, tiles = keys.len(); "Fetching base tiles");
        let tiles = try_join_all(keys.into_iter().map(|key| client.fetch(key))).await?;
        Ok(tiles.into_iter().collect())
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let mut dt = DrawTarget::new(
            self.user_config.viewport.width_px.try_into()?,
            self.user_config.viewport.height_px.try_into()?
        );

        dt.clear(self.theme.background_color);

        for placement in self.projection.visible_tiles() {
            if let Some(tile) = input.get(&placement.key) {
                Self::draw_tile(&mut dt, &placement, tile);
            }
        }
        for segment in &self.layers.routes {
            self.draw_route(&mut dt, segment);
        }
        for stop in &self.layers.stops {
            self.draw_stop(&mut dt, stop)?;
        }
        self.draw_center_marker(&mut dt)?;
        self.draw_attribution(&mut dt)?;

        info!(
            etl_name = ETL_NAME, routes = self.layers.routes.len(), stops = self.layers.stops.len();
            "Map drawn"
        );
        Ok(dt)
    }
}
