//! Bulk construction of compressed tile cache layers from input geometry
//!
//! Every tile of the requested area is rasterized on its own rayon task.
//! The input mesh is only read, so tasks share it by reference and hand
//! back owned buffers that are gathered in row-major (ty, tx) order.

use glam::Vec3;
use rayon::prelude::*;
use recast::{rasterize_layer, LayerConfig};
use recast_common::{Error, Result, TriMesh};
use web_time::Instant;

use super::compressor::TileCacheCompressor;
use super::config::TileCacheParams;
use super::tile_cache_data::{LayerWireFormat, TileCacheLayer};

/// Configuration for building tile cache layers
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct LayerBuildConfig {
    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope_angle: f32,
    /// Tile cache the layers are built for
    pub params: TileCacheParams,
}

impl Default for LayerBuildConfig {
    fn default() -> Self {
        Self {
            walkable_slope_angle: 45.0,
            params: TileCacheParams::default(),
        }
    }
}

impl LayerBuildConfig {
    pub fn new(params: TileCacheParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn with_walkable_slope_angle(mut self, angle: f32) -> Self {
        self.walkable_slope_angle = angle;
        self
    }

    /// Inclusive tile coordinate range `(tx0, tx1, ty0, ty1)` covering the
    /// XZ footprint of `[bmin, bmax)`
    pub fn tile_range(&self, bmin: Vec3, bmax: Vec3) -> (i32, i32, i32, i32) {
        let tw = self.params.tile_world_width();
        let th = self.params.tile_world_height();
        let origin = Vec3::from_array(self.params.origin);
        let tx0 = ((bmin.x - origin.x) / tw).floor() as i32;
        let ty0 = ((bmin.z - origin.z) / th).floor() as i32;
        let tx1 = (((bmax.x - origin.x) / tw).ceil() as i32 - 1).max(tx0);
        let ty1 = (((bmax.z - origin.z) / th).ceil() as i32 - 1).max(ty0);
        (tx0, tx1, ty0, ty1)
    }

    /// Rasterization settings for tile (tx, ty). The vertical extent comes
    /// from `ymin..ymax`.
    pub fn layer_config(&self, tx: i32, ty: i32, ymin: f32, ymax: f32) -> LayerConfig {
        let p = &self.params;
        let tw = p.tile_world_width();
        let th = p.tile_world_height();
        let bmin = Vec3::new(
            p.origin[0] + tx as f32 * tw,
            ymin,
            p.origin[2] + ty as f32 * th,
        );
        LayerConfig {
            width: p.width,
            height: p.height,
            cs: p.cs,
            ch: p.ch,
            bmin,
            bmax: Vec3::new(bmin.x + tw, ymax, bmin.z + th),
            walkable_slope_angle: self.walkable_slope_angle,
            walkable_climb: p.walkable_climb_voxels(),
            walkable_radius: (p.walkable_radius / p.cs).ceil() as i32,
        }
    }
}

/// A compressed layer ready for [`TileCache::add_tile`](crate::TileCache::add_tile)
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltLayer {
    pub tx: i32,
    pub ty: i32,
    pub tlayer: i32,
    pub data: Vec<u8>,
}

/// Builds compressed layers for the tiles covering an input mesh
pub struct TileCacheLayerBuilder<'a> {
    config: LayerBuildConfig,
    format: LayerWireFormat,
    compressor: &'a dyn TileCacheCompressor,
}

impl<'a> TileCacheLayerBuilder<'a> {
    pub fn new(config: LayerBuildConfig, compressor: &'a dyn TileCacheCompressor) -> Self {
        Self {
            config,
            format: LayerWireFormat::default(),
            compressor,
        }
    }

    /// Writes layers in `format` instead of the default wire format
    pub fn with_wire_format(mut self, format: LayerWireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn config(&self) -> &LayerBuildConfig {
        &self.config
    }

    fn tiles_for(&self, bmin: Vec3, bmax: Vec3) -> Result<Vec<(i32, i32)>> {
        self.config.params.validate()?;
        if bmax.x < bmin.x || bmax.y < bmin.y || bmax.z < bmin.z {
            return Err(Error::TileCache("build bounds are inverted".to_string()));
        }
        let (tx0, tx1, ty0, ty1) = self.config.tile_range(bmin, bmax);
        Ok((ty0..=ty1)
            .flat_map(|ty| (tx0..=tx1).map(move |tx| (tx, ty)))
            .collect())
    }

    /// Builds the layer of one tile, `None` when the tile has no surface
    pub fn build_tile(
        &self,
        mesh: &TriMesh,
        tx: i32,
        ty: i32,
        bmin: Vec3,
        bmax: Vec3,
    ) -> Result<Option<BuiltLayer>> {
        let config = self.config.layer_config(tx, ty, bmin.y, bmax.y);
        let layer = rasterize_layer(mesh, &config)?;

        let Some(tile) = TileCacheLayer::from_heightfield_layer(&layer, tx, ty, 0) else {
            log::debug!("tile ({}, {}) has no surface, skipping", tx, ty);
            return Ok(None);
        };
        let data = tile.encode(self.format, self.compressor)?;
        Ok(Some(BuiltLayer {
            tx,
            ty,
            tlayer: 0,
            data,
        }))
    }

    /// Builds every tile overlapping `[bmin, bmax)` in parallel
    pub fn build_tiles(&self, mesh: &TriMesh, bmin: Vec3, bmax: Vec3) -> Result<Vec<BuiltLayer>> {
        let start = Instant::now();
        let tiles = self.tiles_for(bmin, bmax)?;

        let built = tiles
            .par_iter()
            .map(|&(tx, ty)| self.build_tile(mesh, tx, ty, bmin, bmax))
            .collect::<Result<Vec<_>>>()?;
        let layers: Vec<BuiltLayer> = built.into_iter().flatten().collect();

        log::debug!(
            "built {} layers for {} tiles in {:.2} ms",
            layers.len(),
            tiles.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(layers)
    }

    /// Builds every tile overlapping `[bmin, bmax)` on the calling thread
    pub fn build_tiles_serial(
        &self,
        mesh: &TriMesh,
        bmin: Vec3,
        bmax: Vec3,
    ) -> Result<Vec<BuiltLayer>> {
        let mut layers = Vec::new();
        for (tx, ty) in self.tiles_for(bmin, bmax)? {
            if let Some(layer) = self.build_tile(mesh, tx, ty, bmin, bmax)? {
                layers.push(layer);
            }
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{Lz4Compressor, RleCompressor};

    fn config() -> LayerBuildConfig {
        LayerBuildConfig::new(
            TileCacheParams::default()
                .with_cell_size(0.5, 0.25)
                .with_tile_size(20, 20),
        )
    }

    /// 30x20 floor with a wall standing on it
    fn level() -> TriMesh {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::ZERO, Vec3::new(30.0, 0.0, 20.0), 6, 4);
        mesh.add_box(Vec3::new(14.0, 0.0, 2.0), Vec3::new(16.0, 3.0, 18.0));
        mesh
    }

    #[test]
    fn test_tile_range() {
        let config = config();
        assert_eq!(
            config.tile_range(Vec3::ZERO, Vec3::new(30.0, 1.0, 20.0)),
            (0, 2, 0, 1)
        );
        assert_eq!(
            config.tile_range(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(10.0, 1.0, 10.0)),
            (-1, 0, 0, 0)
        );
    }

    #[test]
    fn test_layer_config_voxel_units() {
        let config = config();
        let layer = config.layer_config(2, -1, -1.0, 4.0);
        assert_eq!(layer.bmin, Vec3::new(20.0, -1.0, -10.0));
        assert_eq!(layer.bmax, Vec3::new(30.0, 4.0, 0.0));
        // climb 0.9 / 0.25, radius 0.6 / 0.5
        assert_eq!(layer.walkable_climb, 3);
        assert_eq!(layer.walkable_radius, 2);
    }

    #[test]
    fn test_build_tiles_row_major() -> Result<()> {
        let mesh = level();
        let builder = TileCacheLayerBuilder::new(config(), &RleCompressor);
        let layers = builder.build_tiles(&mesh, Vec3::new(0.0, -1.0, 0.0), Vec3::new(30.0, 5.0, 20.0))?;

        let coords: Vec<_> = layers.iter().map(|l| (l.tx, l.ty)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);

        for layer in &layers {
            let decoded = TileCacheLayer::decode(&layer.data, LayerWireFormat::default(), &RleCompressor)?;
            assert_eq!((decoded.header.tx, decoded.header.ty), (layer.tx, layer.ty));
            assert_eq!(decoded.header.width, 20);
        }
        Ok(())
    }

    #[test]
    fn test_parallel_matches_serial() -> Result<()> {
        let mesh = level();
        let builder = TileCacheLayerBuilder::new(config(), &Lz4Compressor);
        let bmin = Vec3::new(0.0, -1.0, 0.0);
        let bmax = Vec3::new(30.0, 5.0, 20.0);
        let parallel = builder.build_tiles(&mesh, bmin, bmax)?;
        let serial = builder.build_tiles_serial(&mesh, bmin, bmax)?;
        assert_eq!(parallel, serial);
        assert_eq!(parallel, builder.build_tiles(&mesh, bmin, bmax)?);
        Ok(())
    }

    #[test]
    fn test_tiles_without_geometry_are_skipped() -> Result<()> {
        let mut mesh = TriMesh::new();
        mesh.add_plane(Vec3::ZERO, Vec3::new(10.0, 0.0, 10.0), 2, 2);
        let builder = TileCacheLayerBuilder::new(config(), &RleCompressor);
        let layers = builder.build_tiles(&mesh, Vec3::new(0.0, -1.0, 0.0), Vec3::new(30.0, 5.0, 10.0))?;
        assert_eq!(layers.len(), 1);
        assert_eq!((layers[0].tx, layers[0].ty), (0, 0));
        Ok(())
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let mesh = level();
        let builder = TileCacheLayerBuilder::new(config(), &RleCompressor);
        assert!(builder
            .build_tiles(&mesh, Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 10.0))
            .is_err());
    }
}
