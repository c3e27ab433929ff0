use ndarray::Array2;

use crate::kernel::homochronous_probability;
use crate::sampler::Schedule;

// Unnormalized forward probabilities over lineage counts. Row n-1 holds count
// n; column 0 is the bound, column j >= 1 holds the counts just below
// schedule time j-1, tips at that time included. The recursion runs from the
// most recent epoch toward the bound, so entry (0, 0) ends up carrying the
// total probability mass of reaching a single ancestral lineage above the
// bound.
pub fn forward_matrix(schedule: &Schedule, pop_size: f64, bound: f64) -> Array2<f64> {
    let n_tips = schedule.n_tips();
    let n_epochs = schedule.n_epochs();
    let times = schedule.times();
    let tips = schedule.tips();

    let mut phi = Array2::zeros((n_tips, n_epochs + 1));
    phi[(tips[n_epochs - 1] - 1, n_epochs)] = 1.0;

    // Tips at epochs >= the column currently being filled.
    let mut upstream = tips[n_epochs - 1];
    for j in (1..n_epochs).rev() {
        let dt = times[j] - times[j - 1];
        let merged = tips[j - 1];
        for n_start in 1..=upstream {
            let src = phi[(n_start - 1, j + 1)];
            if src == 0.0 {
                continue;
            }
            for n_end in 1..=n_start {
                let p = homochronous_probability(n_start, n_end, dt, pop_size);
                if p != 0.0 {
                    phi[(n_end + merged - 1, j)] += p * src;
                }
            }
        }
        upstream += merged;
    }

    let dt = times[0] - bound;
    for n_start in 1..=upstream {
        let src = phi[(n_start - 1, 1)];
        if src == 0.0 {
            continue;
        }
        for n_end in 1..=n_start {
            let p = homochronous_probability(n_start, n_end, dt, pop_size);
            if p != 0.0 {
                phi[(n_end - 1, 0)] += p * src;
            }
        }
    }
    phi
}
