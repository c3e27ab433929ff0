use anyhow::{Result, bail};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backward::sample_trajectory;
use crate::constrain::{CoalInterval, DEFAULT_NORM_TOL, resolve_constraints};
use crate::forward::forward_matrix;
use crate::kernel::pair_rate;
use crate::topology::{sample_coalescence_times, sample_topology};

// Sampling schedule of a single within-host problem: distinct tip times with
// their multiplicities, strictly above the host's infection bound.
#[derive(Debug, Clone)]
pub struct Schedule {
    times: Vec<f64>,
    tips: Vec<usize>,
    n_tips: usize,
}

impl Schedule {
    pub fn new(times: Vec<f64>, tips: Vec<usize>) -> Result<Self> {
        if times.is_empty() {
            bail!("sampling schedule is empty");
        }
        if times.len() != tips.len() {
            bail!(
                "schedule has {} sampling times but {} tip counts",
                times.len(),
                tips.len()
            );
        }
        for (k, &t) in times.iter().enumerate() {
            if !t.is_finite() {
                bail!("sampling time at epoch {k} is not finite");
            }
        }
        for w in times.windows(2) {
            if w[1] <= w[0] {
                bail!("sampling times must be strictly increasing");
            }
        }
        for (k, &m) in tips.iter().enumerate() {
            if m == 0 {
                bail!("epoch {k} has zero tips");
            }
        }
        let n_tips = tips.iter().sum();
        Ok(Self { times, tips, n_tips })
    }

    pub fn n_epochs(&self) -> usize {
        self.times.len()
    }

    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn tips(&self) -> &[usize] {
        &self.tips
    }
}

// Marker error for trajectories the forward matrix assigns zero mass (or
// that the topology stage cannot realize). Callers distinguish it from
// argument errors via downcast_ref and decide whether to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfeasibleSample;

impl std::fmt::Display for InfeasibleSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sampled lineage trajectory has zero probability under the bound")
    }
}

impl std::error::Error for InfeasibleSample {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub time: f64,
    pub id: usize,
    pub left: usize,
    pub right: usize,
}

// Scratch buffers reused across samples of a batch.
#[derive(Debug, Default)]
pub struct Workspace {
    trajectory: Vec<usize>,
    intervals: Vec<CoalInterval>,
    times: Vec<f64>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSample {
    pub coalescence_times: Vec<f64>,
    pub edges: Vec<(usize, usize)>,
    pub edge_lengths: Vec<f64>,
    pub nodes: Vec<NodeRow>,
    pub likelihood: f64,
}

fn check_inputs(schedule: &Schedule, pop_size: f64, bound: f64) -> Result<()> {
    if !pop_size.is_finite() || !(pop_size > 0.0) {
        bail!("effective population size must be positive and finite, got {pop_size}");
    }
    if !bound.is_finite() {
        bail!("bound must be finite, got {bound}");
    }
    if bound >= schedule.times()[0] {
        bail!(
            "bound {bound} must lie strictly below the first sampling time {}",
            schedule.times()[0]
        );
    }
    Ok(())
}

// A single tip needs no coalescence: one edge from the bound to the tip,
// with the bound row keeping the reserved id 0.
fn degenerate_sample(schedule: &Schedule, bound: f64) -> TreeSample {
    let tip_time = schedule.times()[0];
    TreeSample {
        coalescence_times: Vec::new(),
        edges: Vec::new(),
        edge_lengths: Vec::new(),
        nodes: vec![
            NodeRow { time: tip_time, id: 1, left: 0, right: 0 },
            NodeRow { time: bound, id: 0, left: 1, right: 0 },
        ],
        likelihood: 1.0,
    }
}

// One bounded-coalescent draw against a precomputed forward matrix. The
// matrix is read-only and can be shared across samples and threads.
pub fn sample_tree_with(
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    phi: &Array2<f64>,
    workspace: &mut Workspace,
    rng: &mut SmallRng,
) -> Result<TreeSample> {
    check_inputs(schedule, pop_size, bound)?;
    if schedule.n_tips() == 1 {
        return Ok(degenerate_sample(schedule, bound));
    }

    let trajectory_likelihood = sample_trajectory(
        phi,
        schedule,
        pop_size,
        bound,
        1,
        &mut workspace.trajectory,
        rng,
    )?;
    let split_likelihood = resolve_constraints(
        &workspace.trajectory,
        schedule,
        pop_size,
        bound,
        DEFAULT_NORM_TOL,
        &mut workspace.intervals,
        rng,
    );
    let time_likelihood =
        sample_coalescence_times(&workspace.intervals, pop_size, &mut workspace.times, rng)?;

    let n_tips = schedule.n_tips();
    let mut nodes = Vec::with_capacity(2 * n_tips - 1);
    let mut edges = Vec::with_capacity(2 * (n_tips - 1));
    let mut edge_lengths = Vec::with_capacity(2 * (n_tips - 1));
    let topology_likelihood = sample_topology(
        schedule,
        &workspace.times,
        &mut nodes,
        &mut edges,
        &mut edge_lengths,
        rng,
    )?;

    Ok(TreeSample {
        coalescence_times: workspace.times.clone(),
        edges,
        edge_lengths,
        nodes,
        likelihood: trajectory_likelihood
            * split_likelihood
            * time_likelihood
            * topology_likelihood,
    })
}

pub fn sample_tree(
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    rng: &mut SmallRng,
) -> Result<TreeSample> {
    check_inputs(schedule, pop_size, bound)?;
    if schedule.n_tips() == 1 {
        return Ok(degenerate_sample(schedule, bound));
    }
    let phi = forward_matrix(schedule, pop_size, bound);
    let mut workspace = Workspace::new();
    sample_tree_with(schedule, pop_size, bound, &phi, &mut workspace, rng)
}

// Independent draws sharing one forward matrix. Every sample gets its own
// seed-derived rng so the batch is reproducible regardless of how rayon
// schedules it.
pub fn sample_trees(
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    n_samples: usize,
    seed: u64,
) -> Result<Vec<TreeSample>> {
    check_inputs(schedule, pop_size, bound)?;
    if schedule.n_tips() == 1 {
        return Ok(vec![degenerate_sample(schedule, bound); n_samples]);
    }
    let phi = forward_matrix(schedule, pop_size, bound);
    (0..n_samples)
        .into_par_iter()
        .map_init(Workspace::new, |workspace, i| {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(i as u64));
            sample_tree_with(schedule, pop_size, bound, &phi, workspace, &mut rng)
        })
        .collect()
}

// Normalized bounded-coalescent density of an externally supplied ascending
// set of coalescence times: the unconditional Kingman density of the
// configuration divided by the total mass of reaching one lineage above the
// bound. Times at or below the bound, or beyond the last epoch, or implying
// an impossible lineage count have density zero; no early exit.
pub fn bounded_times_likelihood(
    schedule: &Schedule,
    pop_size: f64,
    bound: f64,
    coalescence_times: &[f64],
) -> Result<f64> {
    check_inputs(schedule, pop_size, bound)?;
    let n_tips = schedule.n_tips();
    if n_tips < 2 {
        bail!("bounded density requires at least two tips");
    }
    if coalescence_times.len() != n_tips - 1 {
        bail!(
            "expected {} coalescence times, got {}",
            n_tips - 1,
            coalescence_times.len()
        );
    }
    for w in coalescence_times.windows(2) {
        if w[1] < w[0] {
            bail!("coalescence times must be sorted ascending");
        }
    }

    let times = schedule.times();
    let tips = schedule.tips();
    let n_epochs = schedule.n_epochs();
    let last_epoch = times[n_epochs - 1];
    for &t in coalescence_times {
        if t <= bound || t > last_epoch {
            return Ok(0.0);
        }
    }

    let mut density = 1.0;
    let mut lineages = tips[n_epochs - 1];
    let mut current = last_epoch;
    let mut epoch = n_epochs - 1;
    let mut event = coalescence_times.len();
    while event > 0 || epoch > 0 {
        let next_is_epoch =
            epoch > 0 && (event == 0 || times[epoch - 1] >= coalescence_times[event - 1]);
        let rate = pair_rate(lineages) / pop_size;
        if next_is_epoch {
            let t = times[epoch - 1];
            density *= (-rate * (current - t)).exp();
            lineages += tips[epoch - 1];
            current = t;
            epoch -= 1;
        } else {
            if lineages < 2 {
                return Ok(0.0);
            }
            let t = coalescence_times[event - 1];
            density *= rate * (-rate * (current - t)).exp();
            lineages -= 1;
            current = t;
            event -= 1;
        }
    }

    let phi = forward_matrix(schedule, pop_size, bound);
    let total = phi[(0, 0)];
    if total <= 0.0 {
        return Ok(0.0);
    }
    Ok(density / total)
}
