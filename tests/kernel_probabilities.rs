use epicoal_rs::kernel::{homochronous_probability, significance_loss};

fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "expected {a} ~= {b} within eps={eps}, got diff={}",
        (a - b).abs()
    );
}

#[test]
fn identity_and_guard_cases() {
    for n in 1..=8 {
        approx_eq(homochronous_probability(n, n, 0.0, 1.0), 1.0, 0.0);
    }
    approx_eq(homochronous_probability(1, 1, 123.4, 0.2), 1.0, 0.0);

    assert_eq!(homochronous_probability(0, 1, 1.0, 1.0), 0.0);
    assert_eq!(homochronous_probability(1, 0, 1.0, 1.0), 0.0);
    assert_eq!(homochronous_probability(3, 4, 1.0, 1.0), 0.0);
    assert_eq!(homochronous_probability(4, 2, -0.5, 1.0), 0.0);
    assert_eq!(homochronous_probability(4, 2, 1.0, 0.0), 0.0);
    assert_eq!(homochronous_probability(4, 2, 1.0, -2.0), 0.0);
    // No time, no coalescence.
    assert_eq!(homochronous_probability(2, 1, 0.0, 1.0), 0.0);
}

#[test]
fn transition_rows_sum_to_one() {
    for &n_start in &[2usize, 3, 5, 8] {
        for &dt in &[0.0, 0.05, 1.0, 4.0] {
            for &pop_size in &[0.5, 1.0, 10.0] {
                let total: f64 = (1..=n_start)
                    .map(|n_end| homochronous_probability(n_start, n_end, dt, pop_size))
                    .sum();
                approx_eq(total, 1.0, 1e-8);
            }
        }
    }
}

#[test]
fn matches_tavare_partial_fractions() {
    // P(5 -> 3 | dt = 0.1, pop = 1) evaluated by hand from the three
    // partial-fraction terms: 20/7 e^{-0.3} - 5 e^{-0.6} + 15/7 e^{-1}.
    approx_eq(
        homochronous_probability(5, 3, 0.1, 1.0),
        0.16087839541643814,
        1e-10,
    );
}

#[test]
fn absorbing_case_closed_forms() {
    let dt = 0.7;
    let pop_size = 2.0;
    approx_eq(
        homochronous_probability(2, 1, dt, pop_size),
        1.0 - (-dt / pop_size).exp(),
        1e-12,
    );

    for &t in &[0.1f64, 0.5, 2.0] {
        let expected = 1.0 - 1.5 * (-t).exp() + 0.5 * (-3.0 * t).exp();
        approx_eq(homochronous_probability(3, 1, t, 1.0), expected, 1e-12);
    }
}

#[test]
fn significance_loss_tracks_cancellation() {
    // Single-term sums keep full significance.
    approx_eq(significance_loss(5, 5, 1.0, 1.0), 1.0, 0.0);
    approx_eq(significance_loss(1, 1, 0.3, 1.0), 1.0, 0.0);

    let sig = significance_loss(5, 3, 0.1, 1.0);
    assert!(sig > 0.0 && sig <= 1.0, "sig {sig} outside (0, 1]");

    // 29 coalescences over a vanishing interval: the sum is pure noise.
    assert!(significance_loss(30, 1, 1e-9, 1.0) < 1e-6);

    // Guard inputs lose everything.
    assert_eq!(significance_loss(0, 1, 1.0, 1.0), 0.0);
    assert_eq!(significance_loss(4, 2, -1.0, 1.0), 0.0);
}
