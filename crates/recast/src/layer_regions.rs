//! Monotone region partitioning of a heightfield layer
//!
//! Rows are swept along x. Every sweep attaches to the region below it when
//! it has exactly one continuous connection to it, and finally neighbouring
//! regions of the same area are merged.

use recast_common::{Error, Result};

use crate::heightfield_layers::HeightfieldLayer;
use crate::triangle_utils::{LAYER_NULL_REGION, RC_NULL_AREA};

/// Region ids are stored in a byte, 0xff is reserved for "no region"
const MAX_LAYER_REGIONS: usize = 255;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Number of connected samples towards `nei`
    ns: u16,
    id: u8,
    nei: u8,
}

#[derive(Debug, Clone, Default)]
struct MonotoneRegion {
    area: usize,
    neis: Vec<u8>,
    reg_id: u8,
    area_id: u8,
}

#[inline]
fn is_connected(layer: &HeightfieldLayer, ia: usize, ib: usize, walkable_climb: i32) -> bool {
    layer.areas[ia] == layer.areas[ib]
        && (layer.heights[ia] as i32 - layer.heights[ib] as i32).abs() <= walkable_climb
}

fn add_unique(neis: &mut Vec<u8>, v: u8) {
    if !neis.contains(&v) {
        neis.push(v);
    }
}

fn can_merge(old_reg_id: u8, new_reg_id: u8, regs: &[MonotoneRegion]) -> bool {
    let count: usize = regs
        .iter()
        .filter(|reg| reg.reg_id == old_reg_id)
        .map(|reg| {
            reg.neis
                .iter()
                .filter(|&&nei| regs[nei as usize].reg_id == new_reg_id)
                .count()
        })
        .sum();
    count == 1
}

/// Partitions the walkable cells of `layer` into monotone regions.
///
/// Fills `layer.regs` and `layer.reg_count`. Fails when the layer would need
/// more than 255 regions.
pub fn build_layer_regions(layer: &mut HeightfieldLayer, walkable_climb: i32) -> Result<()> {
    let w = layer.width;
    let h = layer.height;
    layer.regs.fill(LAYER_NULL_REGION);

    let mut sweeps = vec![SweepSpan::default(); w as usize];
    let mut prev_count = vec![0u16; 256];
    let mut reg_id: usize = 0;

    for y in 0..h {
        prev_count[..reg_id].fill(0);
        let mut sweep_id: usize = 0;

        for x in 0..w {
            let idx = layer.index(x, y);
            if layer.areas[idx] == RC_NULL_AREA {
                continue;
            }

            let mut sid = LAYER_NULL_REGION as usize;

            // -x
            if x > 0 {
                let xidx = layer.index(x - 1, y);
                if is_connected(layer, idx, xidx, walkable_climb)
                    && layer.regs[xidx] != LAYER_NULL_REGION
                {
                    sid = layer.regs[xidx] as usize;
                }
            }

            if sid == LAYER_NULL_REGION as usize {
                sid = sweep_id;
                sweep_id += 1;
                sweeps[sid].nei = LAYER_NULL_REGION;
                sweeps[sid].ns = 0;
            }

            // -y
            if y > 0 {
                let yidx = layer.index(x, y - 1);
                let nr = layer.regs[yidx];
                if is_connected(layer, idx, yidx, walkable_climb) && nr != LAYER_NULL_REGION {
                    if sweeps[sid].ns == 0 {
                        sweeps[sid].nei = nr;
                    }
                    if sweeps[sid].nei == nr {
                        sweeps[sid].ns += 1;
                        prev_count[nr as usize] += 1;
                    } else {
                        // More than one neighbour region.
                        sweeps[sid].nei = LAYER_NULL_REGION;
                    }
                }
            }

            layer.regs[idx] = sid as u8;
        }

        for sweep in sweeps.iter_mut().take(sweep_id) {
            if sweep.nei != LAYER_NULL_REGION && prev_count[sweep.nei as usize] == sweep.ns {
                sweep.id = sweep.nei;
            } else {
                if reg_id == MAX_LAYER_REGIONS {
                    return Err(Error::Recast("layer region ids overflow".to_string()));
                }
                sweep.id = reg_id as u8;
                reg_id += 1;
            }
        }

        for x in 0..w {
            let idx = layer.index(x, y);
            if layer.regs[idx] != LAYER_NULL_REGION {
                layer.regs[idx] = sweeps[layer.regs[idx] as usize].id;
            }
        }
    }

    let nregs = reg_id;
    let mut regs = vec![MonotoneRegion::default(); nregs];

    for y in 0..h {
        for x in 0..w {
            let idx = layer.index(x, y);
            let ri = layer.regs[idx];
            if ri == LAYER_NULL_REGION {
                continue;
            }
            regs[ri as usize].area += 1;
            regs[ri as usize].area_id = layer.areas[idx];

            if y > 0 {
                let ymi = layer.index(x, y - 1);
                let rai = layer.regs[ymi];
                if is_connected(layer, idx, ymi, walkable_climb)
                    && rai != LAYER_NULL_REGION
                    && rai != ri
                {
                    add_unique(&mut regs[ri as usize].neis, rai);
                    add_unique(&mut regs[rai as usize].neis, ri);
                }
            }
        }
    }

    for (i, reg) in regs.iter_mut().enumerate() {
        reg.reg_id = i as u8;
    }

    for i in 0..nregs {
        let mut merge: Option<usize> = None;
        let mut merge_area = 0;
        for &nei in &regs[i].neis {
            let regn = &regs[nei as usize];
            if regs[i].reg_id == regn.reg_id || regs[i].area_id != regn.area_id {
                continue;
            }
            if regn.area > merge_area && can_merge(regs[i].reg_id, regn.reg_id, &regs) {
                merge_area = regn.area;
                merge = Some(nei as usize);
            }
        }
        if let Some(m) = merge {
            let old_id = regs[i].reg_id;
            let new_id = regs[m].reg_id;
            for reg in regs.iter_mut() {
                if reg.reg_id == old_id {
                    reg.reg_id = new_id;
                }
            }
        }
    }

    // Compact ids.
    let mut remap = [0u8; 256];
    let mut used = [false; 256];
    for reg in &regs {
        used[reg.reg_id as usize] = true;
    }
    let mut count = 0usize;
    for (i, &u) in used.iter().enumerate() {
        if u {
            remap[i] = count as u8;
            count += 1;
        }
    }
    for reg in regs.iter_mut() {
        reg.reg_id = remap[reg.reg_id as usize];
    }

    layer.reg_count = count;
    for r in layer.regs.iter_mut() {
        if *r != LAYER_NULL_REGION {
            *r = regs[*r as usize].reg_id;
        }
    }

    log::trace!("layer partitioned into {} regions", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangle_utils::RC_WALKABLE_AREA;
    use glam::Vec3;

    fn walkable_layer(w: i32, h: i32) -> HeightfieldLayer {
        let mut layer = HeightfieldLayer::new(w, h, Vec3::ZERO, Vec3::ONE, 1.0, 1.0).unwrap();
        layer.heights.fill(0);
        layer.areas.fill(RC_WALKABLE_AREA);
        layer
    }

    #[test]
    fn test_open_layer_is_one_region() {
        let mut layer = walkable_layer(6, 6);
        build_layer_regions(&mut layer, 1).unwrap();
        assert_eq!(layer.reg_count, 1);
        assert!(layer.regs.iter().all(|&r| r == 0));
    }

    #[test]
    fn test_blocked_column_splits_regions() {
        let mut layer = walkable_layer(5, 4);
        for y in 0..4 {
            let idx = layer.index(2, y);
            layer.areas[idx] = RC_NULL_AREA;
        }
        build_layer_regions(&mut layer, 1).unwrap();
        assert_eq!(layer.reg_count, 2);
        let left = layer.regs[layer.index(0, 0)];
        let right = layer.regs[layer.index(4, 3)];
        assert_ne!(left, right);
        assert_eq!(layer.regs[layer.index(2, 1)], LAYER_NULL_REGION);
    }

    #[test]
    fn test_hole_keeps_surrounding_cells_assigned() {
        let mut layer = walkable_layer(5, 5);
        let hole = layer.index(2, 2);
        layer.areas[hole] = RC_NULL_AREA;
        build_layer_regions(&mut layer, 1).unwrap();
        assert!(layer.reg_count >= 1);
        for (i, &r) in layer.regs.iter().enumerate() {
            if i == hole {
                assert_eq!(r, LAYER_NULL_REGION);
            } else {
                assert!((r as usize) < layer.reg_count);
            }
        }
    }

    #[test]
    fn test_region_overflow_is_an_error() {
        // Alternating walkable and blocked columns with large height steps
        // between rows produce one region per cell.
        let mut layer = walkable_layer(255, 4);
        for y in 0..4 {
            for x in 0..255 {
                let idx = layer.index(x, y);
                if x % 2 == 1 {
                    layer.areas[idx] = RC_NULL_AREA;
                }
                layer.heights[idx] = (y * 50) as u8;
            }
        }
        assert!(build_layer_regions(&mut layer, 1).is_err());
    }
}
