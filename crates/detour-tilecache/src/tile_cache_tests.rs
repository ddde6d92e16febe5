//! Scenario tests driving the tile cache through obstacle lifecycles

use glam::Vec3;
use recast::{HeightfieldLayer, RC_WALKABLE_AREA};
use recast_common::{Result, TriMesh};

use crate::compressor::{Lz4Compressor, RleCompressor, TileCacheCompressor};
use crate::config::TileCacheParams;
use crate::layer_builder::{LayerBuildConfig, TileCacheLayerBuilder};
use crate::obstacle::ObstacleState;
use crate::refs::{CompressedTileRef, ObstacleRef};
use crate::tile_cache::TileCache;
use crate::tile_cache_data::{LayerByteOrder, LayerWireFormat, TileCacheLayer};
use crate::tile_cache_integration::tests::RecordingNavMesh;
use detour::{NavMesh, NavMeshCreateParams, NavMeshParams};

const TILE_SIZE: f32 = 10.0;

fn unit_params() -> TileCacheParams {
    TileCacheParams::default()
        .with_cell_size(1.0, 1.0)
        .with_tile_size(10, 10)
        .with_walkable_climb(1.0)
        .with_max_tiles(16)
        .with_max_obstacles(8)
}

fn unit_cache() -> Result<TileCache> {
    TileCache::new(unit_params(), Box::new(RleCompressor), None)
}

fn nav_mesh() -> Result<NavMesh> {
    NavMesh::new(NavMeshParams {
        tile_width: TILE_SIZE,
        tile_height: TILE_SIZE,
        max_tiles: 16,
        ..Default::default()
    })
}

/// Flat walkable tile at 1 unit above its floor, bounds
/// `[tx*10, 0, ty*10] - [tx*10+10, 10, ty*10+10]`
fn flat_tile(
    tx: i32,
    ty: i32,
    tlayer: i32,
    format: LayerWireFormat,
    compressor: &dyn TileCacheCompressor,
) -> Result<Vec<u8>> {
    let bmin = Vec3::new(tx as f32 * TILE_SIZE, 0.0, ty as f32 * TILE_SIZE);
    let mut hf = HeightfieldLayer::new(10, 10, bmin, bmin + Vec3::splat(TILE_SIZE), 1.0, 1.0)?;
    hf.heights.fill(1);
    hf.areas.fill(RC_WALKABLE_AREA);
    hf.build_connections(1);
    let layer = TileCacheLayer::from_heightfield_layer(&hf, tx, ty, tlayer)
        .ok_or_else(|| recast_common::Error::TileCache("empty test layer".into()))?;
    layer.encode(format, compressor)
}

fn add_flat_tile(cache: &mut TileCache, tx: i32, ty: i32) -> Result<CompressedTileRef> {
    let data = flat_tile(tx, ty, 0, cache.wire_format(), cache.compressor())?;
    cache.add_tile(data, 0)
}

/// Calls `update` until it reports a settled cache, returning the number of
/// calls made
fn settle<N: crate::NavMeshTiles>(cache: &mut TileCache, nav: &mut N) -> Result<usize> {
    let mut calls = 0;
    loop {
        calls += 1;
        if cache.update(nav)? {
            return Ok(calls);
        }
        assert!(calls < 100, "tile cache never settled");
    }
}

fn walkable_area(nav: &NavMesh, tx: i32, ty: i32) -> f32 {
    nav.get_tile_at(tx, ty, 0)
        .map(|tile| tile.walkable_area())
        .unwrap_or(0.0)
}

#[test]
fn test_single_tile_cylinder_scenario() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = nav_mesh()?;
    let tile = add_flat_tile(&mut cache, 0, 0)?;
    assert!(!tile.is_null());
    assert_eq!(cache.get_tiles_at(0, 0), vec![tile]);

    let ob = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    assert_eq!(
        cache.get_obstacle_by_ref(ob).map(|o| o.state()),
        Some(ObstacleState::Processing)
    );

    // Drains the request and queues the tile
    assert!(!cache.update(&mut nav)?);
    assert_eq!(cache.pending_requests(), 0);
    assert_eq!(cache.pending_tile_updates(), 1);

    // Rebuilds it
    assert!(cache.update(&mut nav)?);
    let obstacle = cache.get_obstacle_by_ref(ob).unwrap();
    assert_eq!(obstacle.state(), ObstacleState::Processed);
    assert_eq!(obstacle.touched(), &[tile]);
    assert!(obstacle.pending().is_empty());
    assert!(nav.get_tile_at(0, 0, 0).is_some());
    Ok(())
}

#[test]
fn test_update_calls_match_touched_tiles() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    for ty in 0..2 {
        for tx in 0..2 {
            add_flat_tile(&mut cache, tx, ty)?;
        }
    }

    // Straddles the shared corner of all four tiles
    let ob = cache.add_obstacle([10.0, 1.0, 10.0], 1.0, 2.0)?;
    let calls = settle(&mut cache, &mut nav)?;
    let touched = cache.get_obstacle_by_ref(ob).unwrap().touched().len();
    assert_eq!(touched, 4);
    assert_eq!(calls, touched + 1);
    assert_eq!(nav.adds, 4);

    // A second obstacle inside one tile only rebuilds that tile
    let ob2 = cache.add_box_obstacle([2.0, 0.0, 2.0], [3.0, 2.0, 3.0])?;
    assert_eq!(settle(&mut cache, &mut nav)?, 2);
    assert_eq!(cache.get_obstacle_by_ref(ob2).unwrap().touched().len(), 1);
    assert_eq!(nav.adds, 5);
    assert_eq!(nav.removes, 1);
    Ok(())
}

#[test]
fn test_shared_tiles_are_queued_once() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;
    add_flat_tile(&mut cache, 1, 0)?;

    cache.add_obstacle([3.0, 1.0, 5.0], 1.0, 2.0)?;
    cache.add_obstacle([9.5, 1.0, 5.0], 1.0, 2.0)?;
    cache.add_oriented_box_obstacle([4.0, 1.0, 4.0], [1.0, 1.0, 0.5], 0.3)?;
    assert!(!cache.update(&mut nav)?);
    assert_eq!(cache.pending_tile_updates(), 2);
    assert_eq!(settle(&mut cache, &mut nav)?, 2);
    assert_eq!(cache.obstacle_count(), 3);
    for idx in 0..3 {
        assert_eq!(cache.get_obstacle(idx).unwrap().state(), ObstacleState::Processed);
    }
    Ok(())
}

#[test]
fn test_removal_clears_obstacle_marks() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = nav_mesh()?;
    add_flat_tile(&mut cache, 0, 0)?;
    cache.build_nav_mesh_tiles_at(0, 0, &mut nav)?;
    let open_area = walkable_area(&nav, 0, 0);
    let center = [5.0, 1.0, 5.0];
    assert!(open_area > 0.0);
    assert!(nav.find_poly_at(&center).is_some());

    let ob = cache.add_box_obstacle([2.0, 0.0, 2.0], [7.9, 3.0, 7.9])?;
    settle(&mut cache, &mut nav)?;
    let blocked_area = walkable_area(&nav, 0, 0);
    assert!(blocked_area < open_area);
    assert!(nav.find_poly_at(&center).is_none());

    cache.remove_obstacle(ob)?;
    assert_eq!(settle(&mut cache, &mut nav)?, 2);
    assert!(cache.get_obstacle_by_ref(ob).is_none());
    assert_eq!(cache.get_obstacle(ob.index()).unwrap().state(), ObstacleState::Empty);
    assert_eq!(cache.obstacle_count(), 0);
    assert!(nav.find_poly_at(&center).is_some());
    assert!((walkable_area(&nav, 0, 0) - open_area).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_obstacle_slot_reuse_changes_ref() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;

    let first = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    settle(&mut cache, &mut nav)?;
    cache.remove_obstacle(first)?;
    settle(&mut cache, &mut nav)?;

    let second = cache.add_obstacle([3.0, 1.0, 3.0], 1.0, 2.0)?;
    assert_eq!(second.index(), first.index());
    assert_ne!(second, first);
    assert_eq!(second.salt(), first.salt() + 1);
    assert!(cache.get_obstacle_by_ref(first).is_none());
    assert!(cache.get_obstacle_by_ref(second).is_some());

    // Stale refs are ignored when drained
    cache.remove_obstacle(first)?;
    settle(&mut cache, &mut nav)?;
    assert_eq!(
        cache.get_obstacle_by_ref(second).map(|o| o.state()),
        Some(ObstacleState::Processed)
    );
    Ok(())
}

#[test]
fn test_add_and_remove_before_update() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;

    let ob = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    cache.remove_obstacle(ob)?;
    assert_eq!(cache.pending_requests(), 2);
    settle(&mut cache, &mut nav)?;
    assert!(cache.get_obstacle_by_ref(ob).is_none());
    assert_eq!(cache.obstacle_count(), 0);
    assert_eq!(nav.adds, 1);
    Ok(())
}

#[test]
fn test_tile_slot_reuse_changes_ref() -> Result<()> {
    let mut cache = unit_cache()?;
    let first = add_flat_tile(&mut cache, 2, 3)?;
    let data = cache.remove_tile(first)?;
    assert!(cache.get_tile_by_ref(first).is_none());

    let second = cache.add_tile(data, 0)?;
    assert_ne!(first, second);
    assert!(cache.get_tile_by_ref(first).is_none());
    assert!(cache.get_tile_by_ref(second).is_some());
    assert!(cache.remove_tile(first).is_err());
    Ok(())
}

#[test]
fn test_duplicate_tile_returns_null_ref() -> Result<()> {
    let mut cache = unit_cache()?;
    let original = add_flat_tile(&mut cache, 1, 1)?;
    let duplicate = add_flat_tile(&mut cache, 1, 1)?;
    assert!(duplicate.is_null());
    assert_eq!(cache.tile_count(), 1);
    assert_eq!(cache.get_tiles_at(1, 1), vec![original]);

    // Another layer at the same column is fine
    let data = flat_tile(1, 1, 1, cache.wire_format(), cache.compressor())?;
    assert!(!cache.add_tile(data, 0)?.is_null());
    assert_eq!(cache.get_tiles_at(1, 1).len(), 2);
    Ok(())
}

#[test]
fn test_idempotent_settle() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;
    assert!(cache.update(&mut nav)?);

    let ob = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    settle(&mut cache, &mut nav)?;
    let (adds, removes) = (nav.adds, nav.removes);

    for _ in 0..3 {
        assert!(cache.update(&mut nav)?);
    }
    assert_eq!((nav.adds, nav.removes), (adds, removes));
    assert_eq!(
        cache.get_obstacle_by_ref(ob).map(|o| o.state()),
        Some(ObstacleState::Processed)
    );
    Ok(())
}

#[test]
fn test_obstacle_outside_tiles_settles_in_one_call() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;

    let ob = cache.add_obstacle([55.0, 1.0, 55.0], 1.0, 2.0)?;
    assert!(cache.update(&mut nav)?);
    let obstacle = cache.get_obstacle_by_ref(ob).unwrap();
    assert_eq!(obstacle.state(), ObstacleState::Processed);
    assert!(obstacle.touched().is_empty());

    cache.remove_obstacle(ob)?;
    assert!(cache.update(&mut nav)?);
    assert!(cache.get_obstacle_by_ref(ob).is_none());
    assert_eq!(nav.adds, 0);
    Ok(())
}

#[test]
fn test_stale_touched_tile_is_skipped() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    let tile = add_flat_tile(&mut cache, 0, 0)?;
    add_flat_tile(&mut cache, 1, 0)?;

    let ob = cache.add_obstacle([10.0, 1.0, 5.0], 1.0, 2.0)?;
    settle(&mut cache, &mut nav)?;
    assert_eq!(cache.get_obstacle_by_ref(ob).unwrap().touched().len(), 2);
    let adds = nav.adds;

    cache.remove_tile(tile)?;
    cache.remove_obstacle(ob)?;
    assert_eq!(settle(&mut cache, &mut nav)?, 3);
    assert!(cache.get_obstacle_by_ref(ob).is_none());
    // Only the surviving tile was rebuilt
    assert_eq!(nav.adds, adds + 1);
    Ok(())
}

#[test]
fn test_obstacle_storage_is_reused_after_removal() -> Result<()> {
    let params = unit_params().with_max_obstacles(2);
    let mut cache = TileCache::new(params, Box::new(RleCompressor), None)?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;

    let a = cache.add_obstacle([2.0, 1.0, 2.0], 1.0, 2.0)?;
    cache.add_obstacle([7.0, 1.0, 7.0], 1.0, 2.0)?;
    assert!(cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0).is_err());

    // A queued removal does not free the slot until it is processed
    cache.remove_obstacle(a)?;
    assert!(cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0).is_err());
    settle(&mut cache, &mut nav)?;
    let c = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    assert_eq!(c.index(), a.index());
    assert!(cache.remove_obstacle(ObstacleRef::NULL).is_ok());
    Ok(())
}

#[test]
fn test_mesh_process_hook_sets_flags() -> Result<()> {
    let hook = |params: &mut NavMeshCreateParams| {
        for flags in params.poly_flags.iter_mut() {
            *flags = 0x7;
        }
    };
    let mut cache = TileCache::new(unit_params(), Box::new(RleCompressor), Some(Box::new(hook)))?;
    let mut nav = nav_mesh()?;
    add_flat_tile(&mut cache, 0, 0)?;
    cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    settle(&mut cache, &mut nav)?;

    let tile = nav.get_tile_at(0, 0, 0).unwrap();
    assert!(tile.poly_count() > 0);
    assert!(tile.data.polys.iter().all(|p| p.flags == 0x7));
    Ok(())
}

#[test]
fn test_big_endian_lz4_cache() -> Result<()> {
    let format = LayerWireFormat {
        byte_order: LayerByteOrder::Big,
        c_compatibility: false,
    };
    let mut cache =
        TileCache::with_wire_format(unit_params(), format, Box::new(Lz4Compressor), None)?;
    let mut nav = nav_mesh()?;
    let tile = add_flat_tile(&mut cache, 0, 0)?;
    let stored = cache.get_tile_by_ref(tile).unwrap();
    assert_eq!(stored.data().len(), 54 + stored.compressed_size());

    let layer = cache.decompress_tile(tile)?;
    assert_eq!(layer.header.width, 10);
    assert!(layer.heights.iter().all(|&h| h == 1));

    cache.add_box_obstacle([4.0, 0.0, 4.0], [5.5, 2.0, 5.5])?;
    settle(&mut cache, &mut nav)?;
    assert!(nav.get_tile_at(0, 0, 0).is_some());
    Ok(())
}

#[test]
fn test_bulk_built_level_end_to_end() -> Result<()> {
    let params = TileCacheParams::default()
        .with_cell_size(0.5, 0.25)
        .with_tile_size(20, 20)
        .with_max_tiles(16);
    let mut mesh = TriMesh::new();
    mesh.add_plane(Vec3::ZERO, Vec3::new(20.0, 0.0, 20.0), 4, 4);
    let bmin = Vec3::new(0.0, -1.0, 0.0);
    let bmax = Vec3::new(20.0, 5.0, 20.0);

    let layers = TileCacheLayerBuilder::new(LayerBuildConfig::new(params.clone()), &Lz4Compressor)
        .build_tiles(&mesh, bmin, bmax)?;
    assert_eq!(layers.len(), 4);

    let mut cache = TileCache::new(params, Box::new(Lz4Compressor), None)?;
    let mut nav = nav_mesh()?;
    for layer in layers {
        cache.add_tile(layer.data, 0)?;
    }
    for ty in 0..2 {
        for tx in 0..2 {
            cache.build_nav_mesh_tiles_at(tx, ty, &mut nav)?;
        }
    }
    assert_eq!(nav.tile_count(), 4);
    assert!(nav.find_poly_at(&[10.0, 0.0, 10.0]).is_some());

    let ob = cache.add_obstacle([10.0, -0.5, 10.0], 1.5, 2.0)?;
    assert_eq!(settle(&mut cache, &mut nav)?, 5);
    assert_eq!(
        cache.get_obstacle_by_ref(ob).map(|o| o.state()),
        Some(ObstacleState::Processed)
    );
    assert!(nav.find_poly_at(&[10.0, 0.0, 10.0]).is_none());
    assert!(nav.find_poly_at(&[5.0, 0.0, 5.0]).is_some());
    assert_eq!(nav.tile_count(), 4);
    Ok(())
}

#[test]
fn test_undrained_obstacle_waits_for_its_own_request() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    let left = add_flat_tile(&mut cache, 0, 0)?;
    add_flat_tile(&mut cache, 1, 0)?;

    // Straddles both tiles
    cache.add_obstacle([10.0, 1.0, 5.0], 1.0, 2.0)?;
    assert!(!cache.update(&mut nav)?);
    assert_eq!(cache.pending_tile_updates(), 2);

    // Added while the queue is still busy
    let late = cache.add_obstacle([3.0, 1.0, 5.0], 1.0, 2.0)?;
    assert!(!cache.update(&mut nav)?);
    let obstacle = cache.get_obstacle_by_ref(late).unwrap();
    assert_eq!(obstacle.state(), ObstacleState::Processing);
    assert!(obstacle.touched().is_empty());
    assert_eq!(cache.pending_requests(), 1);

    settle(&mut cache, &mut nav)?;
    let obstacle = cache.get_obstacle_by_ref(late).unwrap();
    assert_eq!(obstacle.state(), ObstacleState::Processed);
    assert_eq!(obstacle.touched(), &[left]);
    Ok(())
}

#[test]
fn test_failed_rebuild_keeps_previous_nav_tile() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = RecordingNavMesh::default();
    add_flat_tile(&mut cache, 0, 0)?;
    cache.build_nav_mesh_tiles_at(0, 0, &mut nav)?;
    let (_, before) = nav.tiles.get(&(0, 0, 0)).cloned().unwrap();

    let ob = cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    assert!(!cache.update(&mut nav)?);
    nav.reject_adds = 1;
    assert!(cache.update(&mut nav).is_err());

    // The obstacle is not left in flight
    let obstacle = cache.get_obstacle_by_ref(ob).unwrap();
    assert_eq!(obstacle.state(), ObstacleState::Processed);
    assert!(obstacle.pending().is_empty());
    assert_eq!(cache.pending_tile_updates(), 0);

    // and the navmesh still has the unobstructed tile
    let (_, after) = nav.tiles.get(&(0, 0, 0)).cloned().unwrap();
    assert_eq!(after, before);

    assert!(cache.update(&mut nav)?);
    Ok(())
}

#[test]
fn test_failed_rebuild_on_nav_mesh_restores_tile() -> Result<()> {
    let mut cache = unit_cache()?;
    let mut nav = nav_mesh()?;
    add_flat_tile(&mut cache, 0, 0)?;
    cache.build_nav_mesh_tiles_at(0, 0, &mut nav)?;
    let area = walkable_area(&nav, 0, 0);
    assert!(area > 0.0);

    // A mesh that refuses any tile with more polygons than the flat one
    let poly_count = nav.get_tile_at(0, 0, 0).unwrap().data.header.poly_count;
    let mut strict = NavMesh::new(NavMeshParams {
        tile_width: TILE_SIZE,
        tile_height: TILE_SIZE,
        max_tiles: 16,
        max_polys_per_tile: poly_count,
        ..Default::default()
    })?;
    cache.build_nav_mesh_tiles_at(0, 0, &mut strict)?;

    cache.add_obstacle([5.0, 1.0, 5.0], 1.0, 2.0)?;
    assert!(!cache.update(&mut strict)?);
    assert!(cache.update(&mut strict).is_err());
    assert!((walkable_area(&strict, 0, 0) - area).abs() < 1e-3);
    assert!(cache.update(&mut strict)?);
    Ok(())
}
