use rand::Rng;
use rand::rngs::SmallRng;

use crate::kernel::{homochronous_probability, significance_loss};
use crate::sampler::Schedule;

pub const DEFAULT_NORM_TOL: f64 = 1e-10;

// One coalescent event, constrained to (lower, upper] with `lineages` extant
// just below `upper`. During resolution a record may temporarily describe
// `events` > 1 coalescences sharing the interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoalInterval {
    pub lower: f64,
    pub upper: f64,
    pub lineages: usize,
    pub events: usize,
}

// Partitions every multi-event interval of the trajectory into single-event
// sub-intervals by repeated bisection, drawing each left/right event split
// from the Markov-bridge conditional. Returns the product of split
// probabilities, or 0.0 once any split had to fall back to a deterministic
// median because the kernel sum lost all significance.
pub fn resolve_constraints(
    trajectory: &[usize],
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    norm_tol: f64,
    intervals: &mut Vec<CoalInterval>,
    rng: &mut SmallRng,
) -> f64 {
    let times = schedule.times();
    let tips = schedule.tips();

    intervals.clear();
    debug_assert_eq!(trajectory.len(), schedule.n_epochs() + 1);
    debug_assert!(trajectory[1] >= trajectory[0]);
    let bound_events = trajectory[1] - trajectory[0];
    for _ in 0..bound_events {
        intervals.push(CoalInterval {
            lower: bound,
            upper: times[0],
            lineages: trajectory[1],
            events: bound_events,
        });
    }
    for j in 1..schedule.n_epochs() {
        let events = tips[j - 1] + trajectory[j + 1] - trajectory[j];
        for _ in 0..events {
            intervals.push(CoalInterval {
                lower: times[j - 1],
                upper: times[j],
                lineages: trajectory[j + 1],
                events,
            });
        }
    }
    debug_assert_eq!(intervals.len(), schedule.n_tips() - trajectory[0]);

    let mut likelihood = 1.0;
    let mut i = 0;
    while i < intervals.len() {
        while intervals[i].events > 1 {
            let rec = intervals[i];
            let n = rec.lineages;
            let events = rec.events;
            let mid = 0.5 * (rec.lower + rec.upper);
            let half = 0.5 * (rec.upper - rec.lower);
            let norm = homochronous_probability(n, n - events, 2.0 * half, pop_size);
            let sig = significance_loss(n, n - events, half, pop_size);

            let events_lhs = if sig > norm_tol && norm > 0.0 {
                let u: f64 = rng.gen_range(0.0..1.0);
                let mut cumulative = 0.0;
                let mut chosen = None;
                let mut chosen_p = 0.0;
                for lhs in 0..=events {
                    let rhs = events - lhs;
                    let p = homochronous_probability(n, n - rhs, half, pop_size)
                        * homochronous_probability(n - rhs, n - events, half, pop_size)
                        / norm;
                    if p <= 0.0 {
                        continue;
                    }
                    cumulative += p;
                    chosen = Some(lhs);
                    chosen_p = p;
                    if cumulative > u {
                        break;
                    }
                }
                match chosen {
                    Some(lhs) => {
                        likelihood *= chosen_p;
                        lhs
                    }
                    None => {
                        likelihood = 0.0;
                        events / 2
                    }
                }
            } else {
                likelihood = 0.0;
                events / 2
            };

            let events_rhs = events - events_lhs;
            for m in 0..events {
                let rec = &mut intervals[i + m];
                if m < events_lhs {
                    rec.upper = mid;
                    rec.lineages -= events_rhs;
                    rec.events = events_lhs;
                } else {
                    rec.lower = mid;
                    rec.events = events_rhs;
                }
            }
        }
        i += 1;
    }
    likelihood
}
