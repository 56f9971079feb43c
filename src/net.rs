pub mod overpass;
pub mod tiles;
