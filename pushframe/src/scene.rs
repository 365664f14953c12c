//! Synthetic textured scenes for simulation and testing.
//!
//! Scenes combine two slow plane waves with randomly placed Gaussian blobs,
//! giving texture that correlates well at every position without repeating.
//! All randomness is seeded so a scene is reproducible from its seed.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

/// Mean level of generated scenes
const BASE_LEVEL: f64 = 20000.0;

/// Seed used by [`textured_band`]
const DEFAULT_SEED: u64 = 7;

/// Generate a `lines` x `samples` textured scene.
pub fn textured_scene(samples: usize, lines: usize, seed: u64) -> Array2<f64> {
    let mut scene = Array2::from_shape_fn((lines, samples), |(l, s)| {
        let (s, l) = (s as f64, l as f64);
        BASE_LEVEL + 2500.0 * (0.37 * s + 0.11 * l).sin() + 2000.0 * (0.23 * l - 0.05 * s + 1.0).sin()
    });

    let mut rng = StdRng::seed_from_u64(seed);
    let blob_count = (samples * lines / 30).max(1);
    for _ in 0..blob_count {
        let cs = rng.random_range(-5.0..samples as f64 + 5.0);
        let cl = rng.random_range(-5.0..lines as f64 + 5.0);
        let sigma = rng.random_range(1.5..4.0);
        let amplitude = rng.random_range(-6000.0..6000.0);
        add_blob(&mut scene, cs, cl, sigma, amplitude);
    }

    scene
}

/// Textured scene with a fixed seed
pub fn textured_band(samples: usize, lines: usize) -> Array2<f64> {
    textured_scene(samples, lines, DEFAULT_SEED)
}

/// Add a Gaussian blob centered at 0-based (`cs`, `cl`), cut off at 4 sigma
fn add_blob(scene: &mut Array2<f64>, cs: f64, cl: f64, sigma: f64, amplitude: f64) {
    let (lines, samples) = scene.dim();
    let reach = 4.0 * sigma;
    let s0 = (cs - reach).floor().max(0.0) as usize;
    let s1 = ((cs + reach).ceil().max(0.0) as usize).min(samples);
    let l0 = (cl - reach).floor().max(0.0) as usize;
    let l1 = ((cl + reach).ceil().max(0.0) as usize).min(lines);

    let denom = 2.0 * sigma * sigma;
    for l in l0..l1 {
        for s in s0..s1 {
            let ds = s as f64 - cs;
            let dl = l as f64 - cl;
            scene[[l, s]] += amplitude * (-(ds * ds + dl * dl) / denom).exp();
        }
    }
}

/// Add zero-mean Gaussian noise of standard deviation `sigma`.
///
/// Rows are processed in parallel chunks, each with its own RNG seeded from
/// `seed` and the chunk index, so the result does not depend on scheduling.
pub fn add_noise(mut band: Array2<f64>, sigma: f64, seed: u64) -> Array2<f64> {
    let Ok(normal) = Normal::new(0.0, sigma) else {
        return band;
    };
    if sigma <= 0.0 {
        return band;
    }

    band.axis_chunks_iter_mut(Axis(0), 64)
        .into_par_iter()
        .enumerate()
        .for_each(|(chunk_idx, mut chunk)| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(chunk_idx as u64));
            chunk
                .iter_mut()
                .for_each(|pixel| *pixel += normal.sample(&mut rng));
        });

    band
}
