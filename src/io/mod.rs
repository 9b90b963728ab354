//! I/O modules for reading and writing rasters and WorldCover tiles

pub mod raster;
pub mod worldcover;

pub use raster::{read_channel, read_profile, write_channel, write_mask, GdalTileLoader, RasterProfile};
pub use worldcover::{
    parse_tile_name, preprocess_tiles, reclassify_worldcover, select_tiles, worldcover_tile_name, WorldCoverTiles,
};
