// Closed-form lineage-count transition probabilities for the constant-size
// Kingman coalescent (Tavare 1984), via partial fractions. The alternating
// terms cancel catastrophically for large n_start and small dt, which is why
// significance_loss exists.

#[inline]
pub(crate) fn pair_rate(j: usize) -> f64 {
    (j * j.saturating_sub(1)) as f64 / 2.0
}

fn kernel_terms(n_start: usize, n_end: usize, dt: f64, pop_size: f64) -> (f64, f64) {
    if n_start == 0 || n_end == 0 || n_start < n_end || dt < 0.0 || !(pop_size > 0.0) {
        return (0.0, 0.0);
    }
    if n_start == 1 && n_end == 1 {
        return (1.0, 1.0);
    }

    let mut sum = 0.0f64;
    let mut max_abs = 0.0f64;
    if n_end >= 2 {
        let rate_end = pair_rate(n_end);
        for k in n_end..=n_start {
            let rate_k = pair_rate(k);
            let mut term = rate_k / rate_end * (-rate_k * dt / pop_size).exp();
            for l in n_end..=n_start {
                if l != k {
                    let rate_l = pair_rate(l);
                    term *= rate_l / (rate_l - rate_k);
                }
            }
            sum += term;
            max_abs = max_abs.max(term.abs());
        }
    } else {
        // Absorbing case n_end = 1: the summation starts at k = 2 and the
        // exponential enters as a survival complement.
        for k in 2..=n_start {
            let rate_k = pair_rate(k);
            let mut term = 1.0 - (-rate_k * dt / pop_size).exp();
            for l in 2..=n_start {
                if l != k {
                    let rate_l = pair_rate(l);
                    term *= rate_l / (rate_l - rate_k);
                }
            }
            sum += term;
            max_abs = max_abs.max(term.abs());
        }
    }
    (sum, max_abs)
}

pub fn homochronous_probability(n_start: usize, n_end: usize, dt: f64, pop_size: f64) -> f64 {
    kernel_terms(n_start, n_end, dt, pop_size).0
}

// Ratio of the summed probability to its largest term, in [0, 1]. Values near
// zero mean the partial-fraction sum is dominated by cancellation noise and
// cannot be trusted for inverse-CDF sampling.
pub fn significance_loss(n_start: usize, n_end: usize, dt: f64, pop_size: f64) -> f64 {
    let (sum, max_abs) = kernel_terms(n_start, n_end, dt, pop_size);
    if max_abs > 0.0 { (sum / max_abs).abs() } else { 0.0 }
}
