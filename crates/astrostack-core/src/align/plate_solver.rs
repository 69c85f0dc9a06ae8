use std::collections::HashSet;
use std::f32::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{
    ASTERISM_MATCH_CANDIDATES, MAX_CANDIDATE_STARS, MIN_PAIRED_STARS, RANDOM_REFERENCE_ASTERISMS,
    REFERENCE_ASTERISM_SEED, REFERENCE_COMBINATION_STARS,
};
use crate::detection::Star;
use crate::spatial::KdTree;

use super::asterism::calculate_asterism_hash;
use super::combinations::QuadCombinations;
use super::result::AlignmentResult;
use super::transform::GeometricTransformer;

/// Tolerances and catalog sizes for plate solving.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateSolverConfig {
    /// Maximum distance (px) between a transformed candidate star and its
    /// reference counterpart in the first pass.
    pub position_tolerance: f32,
    /// Fraction of in-bounds candidate stars that must pair in the first pass.
    pub match_fraction: f32,
    /// Looser tolerance for the second pass.
    pub fallback_position_tolerance: f32,
    pub fallback_match_fraction: f32,
    pub min_paired_stars: usize,
    /// Reference stars whose 4-combinations are all hashed.
    pub combination_stars: usize,
    pub random_asterisms: usize,
    pub max_candidate_stars: usize,
    pub seed: u64,
    /// Solve for a scale factor as well, for frames taken at different focal lengths.
    pub variable_zoom: bool,
}

impl Default for PlateSolverConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 3.0,
            match_fraction: 0.5,
            fallback_position_tolerance: 10.0,
            fallback_match_fraction: 0.6,
            min_paired_stars: MIN_PAIRED_STARS,
            combination_stars: REFERENCE_COMBINATION_STARS,
            random_asterisms: RANDOM_REFERENCE_ASTERISMS,
            max_candidate_stars: MAX_CANDIDATE_STARS,
            seed: REFERENCE_ASTERISM_SEED,
            variable_zoom: false,
        }
    }
}

/// Hashed asterism catalog of a reference frame.
pub struct PlateSolver {
    config: PlateSolverConfig,
    reference_stars: Vec<Star>,
    hashes: KdTree<f32, 4, [usize; 4]>,
    star_index: KdTree<f32, 2, usize>,
    width: usize,
    height: usize,
}

impl PlateSolver {
    /// Build the catalog from reference stars ordered by descending size.
    pub fn new(
        reference_stars: Vec<Star>,
        width: usize,
        height: usize,
        config: PlateSolverConfig,
    ) -> Self {
        let mut catalog = Vec::new();
        let mut hashed = HashSet::new();
        let mut add_quad = |quad: [usize; 4], catalog: &mut Vec<([f32; 4], [usize; 4])>| {
            if !hashed.insert(quad) {
                return;
            }
            let stars = quad.map(|i| reference_stars[i]);
            if let Some(asterism) = calculate_asterism_hash(&stars) {
                catalog.push((asterism.hash, asterism.roles.map(|r| quad[r])));
            }
        };

        let n = reference_stars.len();
        for quad in QuadCombinations::new(n.min(config.combination_stars)) {
            add_quad(quad, &mut catalog);
        }
        if n >= 4 && n > config.combination_stars {
            let mut rng = StdRng::seed_from_u64(config.seed);
            for _ in 0..config.random_asterisms {
                let mut picked = [0usize; 4];
                for (slot, idx) in picked
                    .iter_mut()
                    .zip(rand::seq::index::sample(&mut rng, n, 4).iter())
                {
                    *slot = idx;
                }
                picked.sort_unstable();
                add_quad(picked, &mut catalog);
            }
        }
        let hashes: KdTree<f32, 4, [usize; 4]> = catalog.into_iter().collect();
        let star_index = reference_stars
            .iter()
            .enumerate()
            .map(|(i, star)| ([star.x, star.y], i))
            .collect();

        info!(
            reference_stars = n,
            asterisms = hashes.len(),
            "Built reference asterism catalog"
        );

        Self {
            config,
            reference_stars,
            hashes,
            star_index,
            width,
            height,
        }
    }

    pub fn reference_stars(&self) -> &[Star] {
        &self.reference_stars
    }

    pub fn n_asterisms(&self) -> usize {
        self.hashes.len()
    }

    /// Reference frame size.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn config(&self) -> &PlateSolverConfig {
        &self.config
    }

    /// Find the shift, rotation and (with `variable_zoom`) zoom mapping
    /// `candidate_stars` onto the reference.
    ///
    /// Candidates must be ordered by descending size; only the first
    /// `max_candidate_stars` are used. The first hypothesis that pairs enough
    /// stars wins. Returns an invalid result when nothing matches.
    pub fn plate_solve(&self, candidate_stars: &[Star]) -> AlignmentResult {
        let candidates = &candidate_stars[..candidate_stars.len().min(self.config.max_candidate_stars)];
        let passes = [
            (self.config.position_tolerance, self.config.match_fraction),
            (
                self.config.fallback_position_tolerance,
                self.config.fallback_match_fraction,
            ),
        ];
        for (tolerance, fraction) in passes {
            if let Some(transform) = self.solve_pass(candidates, tolerance, fraction) {
                return AlignmentResult::from_transform(&transform);
            }
        }
        debug!(candidates = candidates.len(), "Plate solve failed");
        AlignmentResult::invalid()
    }

    fn solve_pass(
        &self,
        candidates: &[Star],
        tolerance: f32,
        fraction: f32,
    ) -> Option<GeometricTransformer> {
        for quad in QuadCombinations::new(candidates.len()) {
            let stars = quad.map(|i| candidates[i]);
            let Some(asterism) = calculate_asterism_hash(&stars) else {
                continue;
            };
            let Ok(matches) = self
                .hashes
                .get_k_nearest_neighbors(&asterism.hash, ASTERISM_MATCH_CANDIDATES)
            else {
                return None;
            };

            for matched in matches {
                let reference_roles = matched.value;
                let cand_a = stars[asterism.roles[0]];
                let cand_b = stars[asterism.roles[1]];
                let ref_a = self.reference_stars[reference_roles[0]];
                let ref_b = self.reference_stars[reference_roles[1]];

                let transform = hypothesis(&cand_a, &cand_b, &ref_a, &ref_b, self.config.variable_zoom);
                if self.validate(&transform, candidates, tolerance, fraction) {
                    debug!(
                        shift_x = transform.shift_x,
                        shift_y = transform.shift_y,
                        rotation = transform.rotation,
                        zoom = transform.zoom,
                        tolerance,
                        "Plate solve hypothesis accepted"
                    );
                    return Some(transform);
                }
            }
        }
        None
    }

    fn validate(
        &self,
        transform: &GeometricTransformer,
        candidates: &[Star],
        tolerance: f32,
        fraction: f32,
    ) -> bool {
        let mut in_bounds = 0usize;
        let mut paired = 0usize;
        for star in candidates {
            let (x, y) = transform.to_reference(star.x, star.y);
            if x < 0.0 || y < 0.0 || x >= self.width as f32 || y >= self.height as f32 {
                continue;
            }
            in_bounds += 1;
            let has_pair = self
                .star_index
                .get_points_within(&[x, y], tolerance as f64)
                .is_ok_and(|found| !found.is_empty());
            if has_pair {
                paired += 1;
            }
        }
        paired >= self.config.min_paired_stars && paired as f32 > fraction * in_bounds as f32
    }
}

/// Transform rotating about candidate A and moving it onto reference A,
/// with the rotation that aligns candidate AB with reference AB. With
/// `variable_zoom` the zoom is the ratio of the AB lengths.
fn hypothesis(
    cand_a: &Star,
    cand_b: &Star,
    ref_a: &Star,
    ref_b: &Star,
    variable_zoom: bool,
) -> GeometricTransformer {
    let ref_angle = (ref_b.y - ref_a.y).atan2(ref_b.x - ref_a.x);
    let cand_angle = (cand_b.y - cand_a.y).atan2(cand_b.x - cand_a.x);
    let mut rotation = ref_angle - cand_angle;
    if rotation > PI {
        rotation -= TAU;
    } else if rotation <= -PI {
        rotation += TAU;
    }
    let zoom = if variable_zoom {
        let ref_length = (ref_b.x - ref_a.x).hypot(ref_b.y - ref_a.y);
        let cand_length = (cand_b.x - cand_a.x).hypot(cand_b.y - cand_a.y);
        if ref_length > 0.0 {
            cand_length / ref_length
        } else {
            1.0
        }
    } else {
        1.0
    };
    GeometricTransformer::new(
        ref_a.x - cand_a.x,
        ref_a.y - cand_a.y,
        cand_a.x,
        cand_a.y,
        rotation,
    )
    .with_zoom(zoom)
}
