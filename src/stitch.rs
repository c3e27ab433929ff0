use anyhow::{Result, bail};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::forward::forward_matrix;
use crate::host::{Host, TipEvent};
use crate::sampler::{Schedule, Workspace, sample_tree, sample_tree_with};

// Node of a stitched phylogeny. left = right = 0 is a tip; right = 0 with
// left != 0 is a unary transmission (or introduction) node. The host
// annotations are carried for every node and never read by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhyloNode {
    pub time: f64,
    pub id: usize,
    pub left: usize,
    pub right: usize,
    pub label: Option<String>,
    pub host_id: String,
    pub host_kind: Option<String>,
    pub infector_id: Option<String>,
    pub infector_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionTree {
    pub nodes: Vec<PhyloNode>,
    pub edges: Vec<(usize, usize)>,
    pub edge_lengths: Vec<f64>,
    pub likelihood: f64,
}

// Draws one bounded-coalescent genealogy per host and glues them into a
// single phylogeny (a forest when the linelist has several introductions).
// Per-host node ids are relabeled by block offset; each transmission tip in
// the infector's genealogy becomes the unary parent of the infectee's root,
// and every introduction gets a unary origin node at its infection time.
pub fn stitch_transmission_tree(
    hosts: &[Host],
    pop_size: f64,
    rng: &mut SmallRng,
) -> Result<TransmissionTree> {
    if hosts.is_empty() {
        bail!("no hosts to stitch");
    }

    let mut workspace = Workspace::new();
    let mut samples = Vec::with_capacity(hosts.len());
    let mut offsets = Vec::with_capacity(hosts.len());
    let mut next_id = 0usize;
    for host in hosts {
        let schedule = Schedule::new(host.tip_times.clone(), host.tip_counts.clone())?;
        let sample = if host.n_tips() == 1 {
            sample_tree(&schedule, pop_size, host.infection_time, rng)?
        } else {
            let phi = forward_matrix(&schedule, pop_size, host.infection_time);
            sample_tree_with(&schedule, pop_size, host.infection_time, &phi, &mut workspace, rng)?
        };
        offsets.push(next_id);
        next_id += if host.n_tips() == 1 { 1 } else { 2 * host.n_tips() - 1 };
        samples.push(sample);
    }

    let mut nodes: Vec<PhyloNode> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut edge_lengths: Vec<f64> = Vec::new();
    let mut id_index: HashMap<usize, usize> = HashMap::new();
    let mut roots = Vec::with_capacity(hosts.len());
    let mut transmission_parent: HashMap<usize, usize> = HashMap::new();
    let mut likelihood = 1.0;

    for (h, host) in hosts.iter().enumerate() {
        let sample = &samples[h];
        let offset = offsets[h];
        likelihood *= sample.likelihood;

        let infector_name = host.infector.map(|g| hosts[g].name.clone());
        let infector_kind = host.infector.and_then(|g| hosts[g].kind.clone());

        let mut tip_events: HashMap<usize, TipEvent> = HashMap::new();
        for (j, epoch_events) in host.attachments.iter().enumerate() {
            let top = host.cum_tips(j);
            for (p, ev) in epoch_events.iter().enumerate() {
                tip_events.insert(top - p, *ev);
            }
        }

        let root_local = if host.n_tips() == 1 { 1 } else { host.n_tips() + 1 };
        for row in &sample.nodes {
            // The degenerate bound row (id 0) is superseded by the unary
            // node the stitching introduces.
            if row.id == 0 {
                continue;
            }
            if row.id == root_local {
                roots.push((offset + row.id, row.time));
            }
            let mut label = None;
            match tip_events.get(&row.id) {
                Some(TipEvent::Sampling) => label = Some(host.name.clone()),
                Some(TipEvent::Transmission(infectee)) => {
                    transmission_parent.insert(*infectee, offset + row.id);
                }
                None => {}
            }
            id_index.insert(offset + row.id, nodes.len());
            nodes.push(PhyloNode {
                time: row.time,
                id: offset + row.id,
                left: if row.left == 0 { 0 } else { offset + row.left },
                right: if row.right == 0 { 0 } else { offset + row.right },
                label,
                host_id: host.name.clone(),
                host_kind: host.kind.clone(),
                infector_id: infector_name.clone(),
                infector_kind: infector_kind.clone(),
            });
        }
        for (k, &(parent, child)) in sample.edges.iter().enumerate() {
            edges.push((offset + parent, offset + child));
            edge_lengths.push(sample.edge_lengths[k]);
        }
    }

    let mut origin_id = next_id;
    for (h, host) in hosts.iter().enumerate() {
        let (root_global, root_time) = roots[h];
        match host.infector {
            Some(_) => {
                let Some(&parent) = transmission_parent.get(&h) else {
                    bail!(
                        "host '{}' has no transmission tip in its infector's genealogy",
                        host.name
                    );
                };
                nodes[id_index[&parent]].left = root_global;
                edges.push((parent, root_global));
                edge_lengths.push(root_time - host.infection_time);
            }
            None => {
                origin_id += 1;
                nodes.push(PhyloNode {
                    time: host.infection_time,
                    id: origin_id,
                    left: root_global,
                    right: 0,
                    label: None,
                    host_id: host.name.clone(),
                    host_kind: host.kind.clone(),
                    infector_id: None,
                    infector_kind: None,
                });
                edges.push((origin_id, root_global));
                edge_lengths.push(root_time - host.infection_time);
            }
        }
    }

    Ok(TransmissionTree { nodes, edges, edge_lengths, likelihood })
}

// Removes unary nodes, merging their incident edges; a unary chain with no
// parent collapses onto its child, which becomes a root. Node ids are
// preserved, edges are rebuilt from the surviving node table.
pub fn collapse_unary(tree: &mut TransmissionTree) {
    let by_id: HashMap<usize, usize> =
        tree.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let is_unary = |n: &PhyloNode| n.right == 0 && n.left != 0;
    let resolve = |mut id: usize| {
        loop {
            let n = &tree.nodes[by_id[&id]];
            if is_unary(n) {
                id = n.left;
            } else {
                return id;
            }
        }
    };

    let mut nodes: Vec<PhyloNode> = Vec::with_capacity(tree.nodes.len());
    for n in &tree.nodes {
        if is_unary(n) {
            continue;
        }
        let mut kept = n.clone();
        if kept.left != 0 {
            kept.left = resolve(kept.left);
            kept.right = resolve(kept.right);
        }
        nodes.push(kept);
    }

    let mut edges = Vec::with_capacity(2 * nodes.len());
    let mut edge_lengths = Vec::with_capacity(2 * nodes.len());
    for n in &nodes {
        if n.left != 0 {
            edges.push((n.id, n.left));
            edge_lengths.push(tree.nodes[by_id[&n.left]].time - n.time);
            edges.push((n.id, n.right));
            edge_lengths.push(tree.nodes[by_id[&n.right]].time - n.time);
        }
    }

    tree.nodes = nodes;
    tree.edges = edges;
    tree.edge_lengths = edge_lengths;
}
