//! CLI utility for building a navmesh tile cache and driving obstacle updates

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use std::path::{Path, PathBuf};

use detour::{NavMesh, NavMeshParams};
use detour_tilecache::{
    LayerBuildConfig, Lz4Compressor, ObstacleRef, RleCompressor, TileCache,
    TileCacheCompressor, TileCacheLayerBuilder, TileCacheParams,
};
use recast_common::TriMesh;

/// A CLI utility for the Detour tile cache
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write tile cache parameters as JSON
    Params {
        /// Output JSON file
        #[clap(long, value_parser)]
        output: PathBuf,

        /// Cell size (horizontal resolution)
        #[clap(long, default_value = "0.3")]
        cs: f32,

        /// Cell height (vertical resolution)
        #[clap(long, default_value = "0.2")]
        ch: f32,

        /// Tile size in cells
        #[clap(long, default_value = "48")]
        tile_size: i32,
    },

    /// Build a tile cache, place obstacles and update it until it settles
    Simulate {
        /// Input mesh file (OBJ format), a procedural level is used otherwise
        #[clap(long, value_parser)]
        input: Option<PathBuf>,

        /// Tile cache parameters (JSON)
        #[clap(long, value_parser)]
        params: Option<PathBuf>,

        /// Layer compressor
        #[clap(long, value_enum, default_value = "lz4")]
        compressor: CompressorKind,

        /// Maximum slope in degrees that is considered walkable
        #[clap(long, default_value = "45.0")]
        walkable_slope_angle: f32,

        /// Cylinder obstacle (x,y,z,radius,height), may be repeated
        #[clap(long = "cylinder", value_parser = parse_cylinder)]
        cylinders: Vec<[f32; 5]>,

        /// Box obstacle (minx,miny,minz,maxx,maxy,maxz), may be repeated
        #[clap(long = "box", value_parser = parse_box)]
        boxes: Vec<[f32; 6]>,

        /// Remove the obstacles again once they are baked in
        #[clap(long)]
        remove: bool,

        /// Print the summary as JSON
        #[clap(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CompressorKind {
    Rle,
    Lz4,
}

impl CompressorKind {
    fn build(self) -> Box<dyn TileCacheCompressor> {
        match self {
            CompressorKind::Rle => Box::new(RleCompressor),
            CompressorKind::Lz4 => Box::new(Lz4Compressor),
        }
    }
}

/// Parse a comma-separated list of exactly `N` floats
fn parse_floats<const N: usize>(s: &str) -> Result<[f32; N], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != N {
        return Err(format!("expected {} components, got {}", N, parts.len()));
    }
    let mut values = [0.0; N];
    for (value, part) in values.iter_mut().zip(parts) {
        *value = part.trim().parse::<f32>().map_err(|e| e.to_string())?;
    }
    Ok(values)
}

fn parse_cylinder(s: &str) -> Result<[f32; 5], String> {
    parse_floats::<5>(s)
}

fn parse_box(s: &str) -> Result<[f32; 6], String> {
    parse_floats::<6>(s)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Params {
            output,
            cs,
            ch,
            tile_size,
        } => write_params(&output, cs, ch, tile_size),
        Commands::Simulate {
            input,
            params,
            compressor,
            walkable_slope_angle,
            cylinders,
            boxes,
            remove,
            json,
        } => {
            let params = match params {
                Some(path) => TileCacheParams::load_from_json(&path)
                    .with_context(|| format!("failed to load params from {}", path.display()))?,
                None => TileCacheParams::default(),
            };
            let obstacles = Obstacles { cylinders, boxes };
            simulate(
                input.as_deref(),
                params,
                compressor,
                walkable_slope_angle,
                &obstacles,
                remove,
                json,
            )
        }
    }
}

fn write_params(output: &Path, cs: f32, ch: f32, tile_size: i32) -> Result<()> {
    let params = TileCacheParams::default()
        .with_cell_size(cs, ch)
        .with_tile_size(tile_size, tile_size);
    params.validate().context("invalid tile cache parameters")?;
    params
        .save_to_json(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Parameters written to {}", output.display());
    Ok(())
}

struct Obstacles {
    cylinders: Vec<[f32; 5]>,
    boxes: Vec<[f32; 6]>,
}

/// Floor with a few blocks on it, sized to a 4x4 tile grid
fn procedural_level(params: &TileCacheParams) -> TriMesh {
    let size = params.tile_world_width() * 4.0;
    let mut mesh = TriMesh::new();
    mesh.add_plane(Vec3::ZERO, Vec3::new(size, 0.0, size), 16, 16);
    for i in 1..4 {
        let c = size * i as f32 / 4.0;
        mesh.add_box(
            Vec3::new(c - 1.0, 0.0, c - 1.0),
            Vec3::new(c + 1.0, 1.5, c + 1.0),
        );
    }
    mesh
}

/// Counts `update` calls until the cache settles
fn settle(cache: &mut TileCache, nav_mesh: &mut NavMesh) -> Result<usize> {
    let mut calls = 0;
    loop {
        calls += 1;
        if cache.update(nav_mesh).context("tile cache update failed")? {
            return Ok(calls);
        }
    }
}

fn simulate(
    input: Option<&Path>,
    params: TileCacheParams,
    compressor: CompressorKind,
    walkable_slope_angle: f32,
    obstacles: &Obstacles,
    remove: bool,
    json: bool,
) -> Result<()> {
    params.validate().context("invalid tile cache parameters")?;

    let mesh = match input {
        Some(path) => TriMesh::from_obj(path)
            .with_context(|| format!("failed to load mesh {}", path.display()))?,
        None => procedural_level(&params),
    };
    let (mut bmin, mut bmax) = mesh.calculate_bounds();
    bmin.y -= 1.0;
    bmax.y += 1.0;
    log::info!(
        "mesh: {} vertices, {} triangles, bounds {:?} - {:?}",
        mesh.vert_count,
        mesh.tri_count,
        bmin,
        bmax
    );

    let layer_compressor = compressor.build();
    let config = LayerBuildConfig::new(params.clone()).with_walkable_slope_angle(walkable_slope_angle);
    let layers = TileCacheLayerBuilder::new(config, layer_compressor.as_ref())
        .build_tiles(&mesh, bmin, bmax)
        .context("failed to build tile cache layers")?;
    if layers.is_empty() {
        bail!("input mesh produced no walkable layers");
    }

    let mut nav_mesh = NavMesh::new(NavMeshParams {
        origin: params.origin,
        tile_width: params.tile_world_width(),
        tile_height: params.tile_world_height(),
        max_tiles: params.max_tiles,
        ..Default::default()
    })
    .context("failed to create navigation mesh")?;
    let mut cache = TileCache::new(params, compressor.build(), None)
        .context("failed to create tile cache")?;

    let mut compressed_bytes = 0;
    let mut columns = Vec::new();
    for layer in layers {
        compressed_bytes += layer.data.len();
        if !columns.contains(&(layer.tx, layer.ty)) {
            columns.push((layer.tx, layer.ty));
        }
        let tile_ref = cache
            .add_tile(layer.data, 0)
            .with_context(|| format!("failed to add tile ({}, {})", layer.tx, layer.ty))?;
        if tile_ref.is_null() {
            log::warn!("duplicate layer at ({}, {}, {})", layer.tx, layer.ty, layer.tlayer);
        }
    }
    for &(tx, ty) in &columns {
        cache
            .build_nav_mesh_tiles_at(tx, ty, &mut nav_mesh)
            .with_context(|| format!("failed to build tile ({}, {})", tx, ty))?;
    }

    let mut refs: Vec<ObstacleRef> = Vec::new();
    for c in &obstacles.cylinders {
        refs.push(cache.add_obstacle([c[0], c[1], c[2]], c[3], c[4])?);
    }
    for b in &obstacles.boxes {
        refs.push(cache.add_box_obstacle([b[0], b[1], b[2]], [b[3], b[4], b[5]])?);
    }
    let add_updates = settle(&mut cache, &mut nav_mesh)?;

    let mut remove_updates = 0;
    if remove {
        for &r in &refs {
            cache.remove_obstacle(r)?;
        }
        remove_updates = settle(&mut cache, &mut nav_mesh)?;
    }

    let walkable_area: f32 = columns
        .iter()
        .flat_map(|&(tx, ty)| nav_mesh.get_tiles_at(tx, ty))
        .map(|tile| tile.walkable_area())
        .sum();

    if json {
        let summary = serde_json::json!({
            "tiles": cache.tile_count(),
            "compressed_bytes": compressed_bytes,
            "nav_mesh_tiles": nav_mesh.tile_count(),
            "obstacles": cache.obstacle_count(),
            "add_updates": add_updates,
            "remove_updates": remove_updates,
            "walkable_area": walkable_area,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Tile cache: {} tiles, {} compressed bytes",
            cache.tile_count(),
            compressed_bytes
        );
        println!("Navigation mesh: {} tiles", nav_mesh.tile_count());
        println!(
            "Obstacles: {} placed, settled after {} updates",
            refs.len(),
            add_updates
        );
        if remove {
            println!("Obstacles removed, settled after {} updates", remove_updates);
        }
        println!("Walkable area: {:.2}", walkable_area);
    }
    Ok(())
}
