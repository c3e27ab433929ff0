use anyhow::Result;
use rand::Rng;
use rand::rngs::SmallRng;

use crate::constrain::CoalInterval;
use crate::sampler::{InfeasibleSample, NodeRow, Schedule};

// Inverse-CDF draw of each coalescence time from the truncated coalescent
// density on its resolved interval. Records arrive ordered from the bound
// toward the present and their sub-intervals are disjoint, so the returned
// times are ascending.
pub fn sample_coalescence_times(
    intervals: &[CoalInterval],
    pop_size: f64,
    times: &mut Vec<f64>,
    rng: &mut SmallRng,
) -> Result<f64> {
    times.clear();
    let mut likelihood = 1.0;
    for rec in intervals {
        if rec.events != 1 || rec.lineages < 2 {
            return Err(InfeasibleSample.into());
        }
        let rate = (rec.lineages - 1) as f64 / pop_size;
        let z = (1.0 - (rate * (rec.lower - rec.upper)).exp()) / rate;
        if !(z > 0.0) {
            return Err(InfeasibleSample.into());
        }
        let u: f64 = rng.gen_range(0.0..1.0);
        let t = rec.upper + (1.0 - rate * z * u).ln() / rate;
        likelihood *= (rate * (t - rec.upper)).exp() / z;
        times.push(t);
    }
    Ok(likelihood)
}

fn pick_active(active: &[(usize, f64)], rng: &mut SmallRng) -> usize {
    let u: f64 = rng.gen_range(0.0..1.0);
    let weight = 1.0 / active.len() as f64;
    let mut cumulative = 0.0;
    for i in 0..active.len() {
        cumulative += weight;
        if cumulative > u {
            return i;
        }
    }
    active.len() - 1
}

// Wires tips and coalescence times into a binary tree by walking both event
// streams latest-first and merging two uniformly chosen active lineages at
// each coalescence. Tip ids count down from n_tips as epochs activate,
// internal ids count down from 2*n_tips - 1, so the root ends up with id
// n_tips + 1. Tips at an epoch activate before a coalescence at the same
// instant; an interval's lineage count already includes the tips at its
// upper boundary.
pub fn sample_topology(
    schedule: &Schedule,
    coalescence_times: &[f64],
    nodes: &mut Vec<NodeRow>,
    edges: &mut Vec<(usize, usize)>,
    edge_lengths: &mut Vec<f64>,
    rng: &mut SmallRng,
) -> Result<f64> {
    let n_tips = schedule.n_tips();
    let times = schedule.times();
    let tips = schedule.tips();

    nodes.clear();
    edges.clear();
    edge_lengths.clear();

    let mut active: Vec<(usize, f64)> = Vec::with_capacity(n_tips);
    let mut next_tip = n_tips;
    let mut next_internal = 2 * n_tips - 1;
    let mut epoch = schedule.n_epochs();
    let mut event = coalescence_times.len();
    let mut likelihood = 1.0;

    while event > 0 {
        if epoch > 0 && times[epoch - 1] >= coalescence_times[event - 1] {
            let t = times[epoch - 1];
            for _ in 0..tips[epoch - 1] {
                active.push((next_tip, t));
                nodes.push(NodeRow { time: t, id: next_tip, left: 0, right: 0 });
                next_tip -= 1;
            }
            epoch -= 1;
            continue;
        }

        let t = coalescence_times[event - 1];
        let total = active.len();
        if total < 2 {
            return Err(InfeasibleSample.into());
        }
        let first = pick_active(&active, rng);
        likelihood *= 2.0 / total as f64;
        let (left_id, left_age) = active.remove(first);
        let second = pick_active(&active, rng);
        likelihood *= 1.0 / (total - 1) as f64;
        let (right_id, right_age) = active.remove(second);

        edges.push((next_internal, left_id));
        edge_lengths.push(left_age - t);
        edges.push((next_internal, right_id));
        edge_lengths.push(right_age - t);
        nodes.push(NodeRow { time: t, id: next_internal, left: left_id, right: right_id });
        active.push((next_internal, t));
        next_internal -= 1;
        event -= 1;
    }

    if epoch != 0 || active.len() != 1 {
        return Err(InfeasibleSample.into());
    }
    nodes.sort_by_key(|row| row.id);
    Ok(likelihood)
}
