//! Guillotine room packing.
//!
//! Keeps a list of free rectangles. Each room takes the south-west corner of
//! one free rectangle and the remainder splits into at most two new free
//! rectangles (right and top). When a room fits nowhere the envelope grows
//! along its shorter axis and packing restarts.

use std::cmp::Ordering;
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::config::{PlanSettings, TieBreak};
use crate::errors::{CdError, CdResult};
use crate::geometry::Rect;
use crate::requirements::{RoomFunction, RoomRequirement};
use crate::units::{self, snap, snap_up};

/// One room instance to place (requirements with count > 1 expand)
#[derive(Debug, Clone)]
pub(super) struct RoomSpec {
    pub requirement: usize,
    pub name: String,
    pub function: RoomFunction,
    pub target_m2: f64,
    pub target_mm2: i64,
    /// Position in the expanded program, used for input-order ties
    pub order: usize,
}

pub(super) struct Packed {
    pub envelope: Rect,
    /// (spec index, rect) in placement order
    pub placed: Vec<(usize, Rect)>,
    pub free: Vec<Rect>,
    pub growth_iterations: u32,
}

/// Expand counts into individual rooms ("Bedroom 1", "Bedroom 2").
/// Numbers already used by another room of the program are skipped.
pub(super) fn expand(requirements: &[RoomRequirement]) -> Vec<RoomSpec> {
    let mut taken: HashSet<String> = requirements
        .iter()
        .filter(|r| r.count <= 1)
        .map(|r| r.name.to_lowercase())
        .collect();

    let mut specs = Vec::new();
    for (idx, req) in requirements.iter().enumerate() {
        let mut n = 1;
        for _ in 0..req.count {
            let name = if req.count > 1 {
                loop {
                    let candidate = format!("{} {}", req.name, n);
                    n += 1;
                    if taken.insert(candidate.to_lowercase()) {
                        break candidate;
                    }
                }
            } else {
                req.name.clone()
            };
            specs.push(RoomSpec {
                requirement: idx,
                name,
                function: req.function,
                target_m2: req.area_m2,
                target_mm2: (req.area_m2 * 1_000_000.0).round() as i64,
                order: specs.len(),
            });
        }
    }
    specs
}

/// Pack every spec, growing the envelope as needed
pub(super) fn pack(specs: &[RoomSpec], settings: &PlanSettings, rng: &mut StdRng) -> CdResult<Packed> {
    let grid = settings.grid_mm;
    let max_w = snap(units::mm(settings.max_envelope_width_m), grid);
    let max_d = snap(units::mm(settings.max_envelope_depth_m), grid);
    let min_dim = snap_up(units::mm(settings.min_room_dimension_m), grid);

    let order = packing_order(specs, settings.tie_break);

    // RNG draw order: envelope proportion, then one proportion per room in
    // packing order. Restarts reuse the same draws.
    let (mut w, mut d) = initial_envelope(specs, settings, rng, max_w, max_d, min_dim);
    let aspects: Vec<f64> = order
        .iter()
        .map(|_| rng.gen_range(settings.room_aspect_min..=settings.room_aspect_max))
        .collect();

    for &i in &order {
        let spec = &specs[i];
        if spec.target_mm2 > max_w * max_d {
            return Err(CdError::PackingInfeasible {
                room: spec.name.clone(),
                envelope_w_m: units::m(max_w),
                envelope_d_m: units::m(max_d),
                reason: format!(
                    "{:.1} m2 exceeds the largest allowed envelope",
                    spec.target_m2
                ),
            });
        }
    }

    let mut iteration = 0;
    loop {
        match try_pack(specs, &order, &aspects, w, d, settings, min_dim) {
            Ok((placed, free)) => {
                return Ok(Packed {
                    envelope: Rect::new(0, 0, w, d),
                    placed,
                    free,
                    growth_iterations: iteration,
                });
            }
            Err(failure) => {
                let spec = &specs[failure.spec];
                if iteration >= settings.max_growth_iterations {
                    return Err(CdError::PackingInfeasible {
                        room: spec.name.clone(),
                        envelope_w_m: units::m(w),
                        envelope_d_m: units::m(d),
                        reason: format!("still no fit after {} envelope growths", iteration),
                    });
                }
                let need = (spec.target_mm2 - failure.largest_free_mm2).max(0);
                let step = snap_up(units::mm(settings.growth_step_m), grid).max(grid);
                match grow(w, d, need, step, grid, max_w, max_d) {
                    Some((nw, nd)) => {
                        debug!(room = %spec.name, from_w = w, from_d = d, to_w = nw, to_d = nd, "growing envelope");
                        w = nw;
                        d = nd;
                        iteration += 1;
                    }
                    None => {
                        return Err(CdError::PackingInfeasible {
                            room: spec.name.clone(),
                            envelope_w_m: units::m(w),
                            envelope_d_m: units::m(d),
                            reason: "envelope already at its maximum size".to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Corridor and lobby rooms first, then by descending area
fn packing_order(specs: &[RoomSpec], tie_break: TieBreak) -> Vec<usize> {
    let mut order: Vec<usize> = (0..specs.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (&specs[a], &specs[b]);
        sb.function
            .is_circulation()
            .cmp(&sa.function.is_circulation())
            .then(sb.target_mm2.cmp(&sa.target_mm2))
            .then_with(|| match tie_break {
                TieBreak::InputOrder => Ordering::Equal,
                TieBreak::Name => sa.name.cmp(&sb.name),
            })
            .then(sa.order.cmp(&sb.order))
    });
    order
}

fn initial_envelope(
    specs: &[RoomSpec],
    settings: &PlanSettings,
    rng: &mut StdRng,
    max_w: i64,
    max_d: i64,
    min_dim: i64,
) -> (i64, i64) {
    let grid = settings.grid_mm;
    let total_m2: f64 = specs.iter().map(|s| s.target_m2).sum::<f64>() * settings.circulation_factor;
    let aspect = rng.gen_range(settings.envelope_aspect_min..=settings.envelope_aspect_max);

    let w_m = (total_m2 * aspect).sqrt();
    let w = snap_up(units::mm(w_m), grid).clamp(min_dim, max_w.max(min_dim));
    let d_m = total_m2 / units::m(w);
    let d = snap_up(units::mm(d_m), grid).clamp(min_dim, max_d.max(min_dim));
    debug!(total_m2, aspect, w, d, "initial envelope");
    (w, d)
}

fn grow(w: i64, d: i64, need_mm2: i64, step: i64, grid: i64, max_w: i64, max_d: i64) -> Option<(i64, i64)> {
    let try_axis = |grow_width: bool| -> Option<(i64, i64)> {
        let (current, other, cap) = if grow_width { (w, d, max_w) } else { (d, w, max_d) };
        if current >= cap {
            return None;
        }
        let delta = step.max(snap_up(need_mm2 / other.max(1), grid));
        let next = (current + delta).min(cap);
        Some(if grow_width { (next, d) } else { (w, next) })
    };
    let width_is_shorter = w <= d;
    try_axis(width_is_shorter).or_else(|| try_axis(!width_is_shorter))
}

struct Failure {
    spec: usize,
    largest_free_mm2: i64,
}

/// Lexicographic placement score, lower wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Score {
    circulation_miss: u8,
    footprint_mm2: i64,
    slivers: u8,
    free_mm2: i64,
    free_index: usize,
    shape_index: usize,
}

fn try_pack(
    specs: &[RoomSpec],
    order: &[usize],
    aspects: &[f64],
    w: i64,
    d: i64,
    settings: &PlanSettings,
    min_dim: i64,
) -> Result<(Vec<(usize, Rect)>, Vec<Rect>), Failure> {
    let mut free = vec![Rect::new(0, 0, w, d)];
    let mut placed: Vec<(usize, Rect)> = Vec::new();

    for (k, &spec_idx) in order.iter().enumerate() {
        let spec = &specs[spec_idx];
        let circulation_rects: Vec<Rect> = placed
            .iter()
            .filter(|(i, _)| specs[*i].function.is_circulation())
            .map(|(_, r)| *r)
            .collect();

        let mut best: Option<(Score, usize, Rect)> = None;
        for (fi, f) in free.iter().enumerate() {
            for (si, (sw, sh)) in shapes(spec, aspects[k], f, settings, min_dim).into_iter().enumerate() {
                let rect = Rect::new(f.x, f.y, sw, sh);
                let circulation_miss = if spec.function.is_circulation()
                    && !circulation_rects.is_empty()
                    && !circulation_rects.iter().any(|c| c.shared_edge_len(&rect) > 0)
                {
                    1
                } else {
                    0
                };
                let footprint_mm2 = if settings.prefer_compact {
                    Rect::bounding(placed.iter().map(|(_, r)| *r).chain(std::iter::once(rect)))
                        .map(|b| b.area_mm2())
                        .unwrap_or(0)
                } else {
                    0
                };
                let slivers = split(f, sw, sh)
                    .iter()
                    .filter(|r| r.w.min(r.h) < min_dim)
                    .count() as u8;
                let score = Score {
                    circulation_miss,
                    footprint_mm2,
                    slivers,
                    free_mm2: f.area_mm2(),
                    free_index: fi,
                    shape_index: si,
                };
                if best.map_or(true, |(b, _, _)| score < b) {
                    best = Some((score, fi, rect));
                }
            }
        }

        let Some((_, fi, rect)) = best else {
            return Err(Failure {
                spec: spec_idx,
                largest_free_mm2: free.iter().map(|f| f.area_mm2()).max().unwrap_or(0),
            });
        };

        let host = free.remove(fi);
        free.extend(split(&host, rect.w, rect.h));
        placed.push((spec_idx, rect));
    }

    Ok((placed, free))
}

/// Candidate (w, h) shapes for a room inside free rectangle `f`
fn shapes(spec: &RoomSpec, aspect: f64, f: &Rect, settings: &PlanSettings, min_dim: i64) -> Vec<(i64, i64)> {
    let grid = settings.grid_mm;
    let area = spec.target_mm2;

    // Below the smallest buildable room the target cannot be met; take the
    // minimum square and leave the shortfall to the area check.
    if (area as f64) * (1.0 + settings.area_tolerance) < (min_dim * min_dim) as f64 {
        return if min_dim <= f.w && min_dim <= f.h {
            vec![(min_dim, min_dim)]
        } else {
            Vec::new()
        };
    }

    let max_aspect = if spec.function.is_circulation() {
        settings.max_circulation_aspect
    } else {
        settings.max_room_aspect
    };

    let nominal_w = snap(((area as f64) * aspect).sqrt().round() as i64, grid);
    let nominal_h = snap(area / nominal_w.max(1), grid);

    let mut raw = vec![
        (snap(area / f.h.max(1), grid), f.h),
        (f.w, snap(area / f.w.max(1), grid)),
        (nominal_w, nominal_h),
        (nominal_h, nominal_w),
    ];
    // Snug variants swallow a remainder too thin to hold a room
    for (sw, sh) in [(nominal_w, nominal_h), (nominal_h, nominal_w)] {
        if f.w - sw > 0 && f.w - sw < min_dim {
            raw.push((f.w, sh));
        }
        if f.h - sh > 0 && f.h - sh < min_dim {
            raw.push((sw, f.h));
        }
    }

    let mut out: Vec<(i64, i64)> = Vec::new();
    for (sw, sh) in raw {
        if out.contains(&(sw, sh)) {
            continue;
        }
        if sw < min_dim || sh < min_dim || sw > f.w || sh > f.h {
            continue;
        }
        let candidate = Rect::new(0, 0, sw, sh);
        if candidate.aspect() > max_aspect {
            continue;
        }
        let deviation = (candidate.area_mm2() - area).abs() as f64 / area as f64;
        if deviation > settings.area_tolerance {
            continue;
        }
        out.push((sw, sh));
    }
    out
}

/// Remainders after placing (w, h) at the south-west corner of `f`.
/// Picks the split whose larger remainder is biggest.
fn split(f: &Rect, w: i64, h: i64) -> Vec<Rect> {
    let horizontal = [
        Rect::new(f.x + w, f.y, f.w - w, h),
        Rect::new(f.x, f.y + h, f.w, f.h - h),
    ];
    let vertical = [
        Rect::new(f.x + w, f.y, f.w - w, f.h),
        Rect::new(f.x, f.y + h, w, f.h - h),
    ];
    let largest = |rects: &[Rect; 2]| rects.iter().map(|r| r.area_mm2().max(0)).max().unwrap_or(0);
    let chosen = if largest(&vertical) > largest(&horizontal) {
        vertical
    } else {
        horizontal
    };
    chosen.into_iter().filter(|r| !r.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn specs_for(areas: &[(&str, f64)]) -> Vec<RoomSpec> {
        let reqs: Vec<RoomRequirement> = areas.iter().map(|(n, a)| RoomRequirement::new(*n, *a)).collect();
        expand(&reqs)
    }

    #[test]
    fn test_expand_counts() {
        let reqs = vec![RoomRequirement::new("Bedroom", 12.0).with_count(3)];
        let specs = expand(&reqs);
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Bedroom 1", "Bedroom 2", "Bedroom 3"]);
        assert!(specs.iter().all(|s| s.requirement == 0));
    }

    #[test]
    fn test_expand_skips_names_already_in_program() {
        let reqs = vec![
            RoomRequirement::new("Bedroom", 12.0).with_count(2),
            RoomRequirement::new("Bedroom 2", 10.0),
            RoomRequirement::new("Living", 20.0),
        ];
        let names: Vec<_> = expand(&reqs).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Bedroom 1", "Bedroom 3", "Bedroom 2", "Living"]);
    }

    #[test]
    fn test_order_puts_circulation_first() {
        let specs = specs_for(&[("Living", 25.0), ("Hallway", 5.0), ("Bedroom", 25.0)]);
        let order = packing_order(&specs, TieBreak::InputOrder);
        assert_eq!(order, vec![1, 0, 2]);
        let by_name = packing_order(&specs, TieBreak::Name);
        assert_eq!(by_name, vec![1, 2, 0]);
    }

    #[test]
    fn test_split_keeps_area() {
        let f = Rect::new(0, 0, 6000, 4000);
        let parts = split(&f, 2500, 3000);
        let total: i64 = parts.iter().map(|r| r.area_mm2()).sum::<i64>() + 2500 * 3000;
        assert_eq!(total, f.area_mm2());
        for (i, a) in parts.iter().enumerate() {
            for b in parts.iter().skip(i + 1) {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_shapes_respect_limits() {
        let settings = PlanSettings::default();
        let spec = &specs_for(&[("Kitchen", 15.0)])[0];
        let f = Rect::new(0, 0, 8000, 5000);
        for (w, h) in shapes(spec, 1.2, &f, &settings, 1200) {
            let r = Rect::new(0, 0, w, h);
            assert!(r.aspect() <= settings.max_room_aspect);
            assert!((r.area_m2() - 15.0).abs() / 15.0 <= settings.area_tolerance);
            assert!(w <= f.w && h <= f.h);
        }
    }

    #[test]
    fn test_undersized_room_takes_minimum_square() {
        let settings = PlanSettings::default();
        let spec = &specs_for(&[("Closet", 1.0)])[0];
        let f = Rect::new(0, 0, 5000, 4000);
        assert_eq!(shapes(spec, 1.3, &f, &settings, 1200), vec![(1200, 1200)]);
        assert!(shapes(spec, 1.3, &Rect::new(0, 0, 5000, 1100), &settings, 1200).is_empty());

        // 1.4 m2 can still be met within tolerance at 1.2 x 1.2
        let near = &specs_for(&[("WC", 1.4)])[0];
        assert_eq!(shapes(near, 1.0, &f, &settings, 1200), vec![(1200, 1200)]);
    }

    #[test]
    fn test_pack_has_no_overlap_and_stays_inside() {
        let settings = PlanSettings::default();
        let specs = specs_for(&[("Living", 30.0), ("Kitchen", 12.0), ("Bed", 14.0), ("Bath", 5.0), ("Store", 3.0)]);
        let mut rng = StdRng::seed_from_u64(3);
        let packed = pack(&specs, &settings, &mut rng).unwrap();
        assert_eq!(packed.placed.len(), specs.len());
        for (i, (_, a)) in packed.placed.iter().enumerate() {
            assert!(packed.envelope.contains_rect(a));
            for (_, b) in packed.placed.iter().skip(i + 1) {
                assert!(!a.overlaps(b));
            }
        }
        let packed_area: i64 = packed.placed.iter().map(|(_, r)| r.area_mm2()).sum();
        assert!(packed_area <= packed.envelope.area_mm2());
    }

    #[test]
    fn test_growth_when_envelope_too_small() {
        let settings = PlanSettings {
            circulation_factor: 1.0,
            ..PlanSettings::default()
        };
        let specs = specs_for(&[("Hall", 40.0), ("Room", 17.0), ("Room B", 9.0)]);
        let mut rng = StdRng::seed_from_u64(11);
        let packed = pack(&specs, &settings, &mut rng).unwrap();
        assert_eq!(packed.placed.len(), 3);
        assert!(packed.envelope.area_mm2() >= 66_000_000);
    }

    #[test]
    fn test_grow_prefers_shorter_axis_and_respects_caps() {
        assert_eq!(grow(8000, 6000, 0, 500, 100, 30000, 20000), Some((8000, 6500)));
        assert_eq!(grow(8000, 20000, 0, 500, 100, 30000, 20000), Some((8500, 20000)));
        assert_eq!(grow(30000, 20000, 0, 500, 100, 30000, 20000), None);
    }
}
