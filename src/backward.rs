use anyhow::Result;
use ndarray::Array2;
use rand::Rng;
use rand::rngs::SmallRng;

use crate::kernel::homochronous_probability;
use crate::sampler::{InfeasibleSample, Schedule};

// Draws the lineage-count trajectory from the smoothed posterior induced by
// the forward matrix, anchored at the bound. trajectory[0] is the count at
// the bound, trajectory[j] for j >= 1 the count just below schedule time
// j-1. Returns the product of the conditional probabilities consumed.
pub fn sample_trajectory(
    phi: &Array2<f64>,
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    bound_size: usize,
    trajectory: &mut Vec<usize>,
    rng: &mut SmallRng,
) -> Result<f64> {
    let n_tips = schedule.n_tips();
    let n_epochs = schedule.n_epochs();
    let times = schedule.times();
    let tips = schedule.tips();
    debug_assert!(bound_size >= 1 && bound_size <= n_tips);

    trajectory.clear();
    trajectory.resize(n_epochs + 1, 0);
    trajectory[0] = bound_size;

    let mut likelihood = 1.0;
    for step in 0..n_epochs {
        let (dt, n_end_ref) = if step == 0 {
            (times[0] - bound, trajectory[0])
        } else {
            if trajectory[step] <= tips[step - 1] {
                return Err(InfeasibleSample.into());
            }
            (times[step] - times[step - 1], trajectory[step] - tips[step - 1])
        };
        let marginal = phi[(trajectory[step] - 1, step)];
        if marginal <= 0.0 {
            return Err(InfeasibleSample.into());
        }

        let u: f64 = rng.gen_range(0.0..1.0);
        let mut cumulative = 0.0;
        let mut chosen = 0usize;
        let mut chosen_p = 0.0;
        for n in 1..=n_tips {
            let p =
                homochronous_probability(n, n_end_ref, dt, pop_size) * phi[(n - 1, step + 1)]
                    / marginal;
            if p <= 0.0 {
                continue;
            }
            // First count whose cumulative smoothed probability exceeds u;
            // if rounding leaves the total short of u, the last count with
            // positive mass wins.
            cumulative += p;
            chosen = n;
            chosen_p = p;
            if cumulative > u {
                break;
            }
        }
        if chosen == 0 {
            return Err(InfeasibleSample.into());
        }
        trajectory[step + 1] = chosen;
        likelihood *= chosen_p;
    }
    Ok(likelihood)
}
