/// Elements as returned by the Overpass interpreter, kept without processing.
pub mod osm;

/// Route segments and stops, the things we draw.
pub mod transit;
