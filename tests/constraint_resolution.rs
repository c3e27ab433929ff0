use rand::SeedableRng;
use rand::rngs::SmallRng;

use epicoal_rs::constrain::{DEFAULT_NORM_TOL, resolve_constraints};
use epicoal_rs::sampler::Schedule;

#[test]
fn resolves_to_single_event_records() {
    let schedule = Schedule::new(vec![1.0, 2.0], vec![2, 2]).expect("schedule");
    // Two coalescences below the first epoch, one between the epochs.
    let trajectory = vec![1usize, 3, 2];
    for seed in 0..20 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut intervals = Vec::new();
        let likelihood = resolve_constraints(
            &trajectory,
            &schedule,
            1.0,
            0.0,
            DEFAULT_NORM_TOL,
            &mut intervals,
            &mut rng,
        );
        assert!(likelihood > 0.0);
        assert_eq!(intervals.len(), 3);
        for rec in &intervals {
            assert_eq!(rec.events, 1);
            assert!(rec.lower < rec.upper);
            assert!(rec.lineages >= 2);
        }
        // The bound-interval records tile (0, 1], the epoch record is (1, 2].
        assert_eq!(intervals[0].lower, 0.0);
        assert_eq!(intervals[0].upper, intervals[1].lower);
        assert_eq!(intervals[1].upper, 1.0);
        assert_eq!((intervals[2].lower, intervals[2].upper), (1.0, 2.0));
        assert_eq!(intervals[2].lineages, 2);
    }
}

#[test]
fn hopeless_cancellation_takes_the_median_fallback() {
    // 29 coalescences crammed into a 0.01-wide interval: the bridge-split
    // kernel sums are pure rounding noise, so the resolver must go
    // deterministic and zero the likelihood.
    let schedule = Schedule::new(vec![1.0], vec![30]).expect("schedule");
    let trajectory = vec![1usize, 30];
    for seed in 0..5 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut intervals = Vec::new();
        let likelihood = resolve_constraints(
            &trajectory,
            &schedule,
            1.0,
            0.99,
            DEFAULT_NORM_TOL,
            &mut intervals,
            &mut rng,
        );
        assert_eq!(likelihood, 0.0);
        assert_eq!(intervals.len(), 29);
        for (i, rec) in intervals.iter().enumerate() {
            assert_eq!(rec.events, 1);
            assert!(rec.lower < rec.upper);
            assert!(rec.upper <= 1.0 && rec.lower >= 0.99);
            // Count above the bound grows by one per record.
            assert_eq!(rec.lineages, i + 2);
        }
        for w in intervals.windows(2) {
            assert_eq!(w[0].upper, w[1].lower, "sub-intervals must tile the parent");
        }
    }
}

#[test]
fn trajectory_without_events_yields_no_records() {
    let schedule = Schedule::new(vec![1.0, 2.0], vec![1, 1]).expect("schedule");
    // The only coalescence sits in the bound interval.
    let trajectory = vec![1usize, 2, 1];
    let mut rng = SmallRng::seed_from_u64(0);
    let mut intervals = Vec::new();
    let likelihood = resolve_constraints(
        &trajectory,
        &schedule,
        0.5,
        0.0,
        DEFAULT_NORM_TOL,
        &mut intervals,
        &mut rng,
    );
    assert_eq!(likelihood, 1.0);
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].events, 1);
    assert_eq!((intervals[0].lower, intervals[0].upper), (0.0, 1.0));
    assert_eq!(intervals[0].lineages, 2);
}
