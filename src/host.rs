use anyhow::{Result, bail};
use std::collections::HashMap;

use crate::io::linelist::CaseRecord;

// A tip of a within-host genealogy: either the host's own sampling event or
// the lineage handed to an infectee at its infection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipEvent {
    Sampling,
    Transmission(usize),
}

// One within-host bounded-coalescent problem. Tips are grouped into epochs
// of equal time, ascending; `attachments[j]` lists the events of epoch j in
// activation order, so the tip with core id `cum_tips(j) - p` corresponds to
// `attachments[j][p]`.
#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    pub kind: Option<String>,
    pub infector: Option<usize>,
    pub infection_time: f64,
    pub tip_times: Vec<f64>,
    pub tip_counts: Vec<usize>,
    pub attachments: Vec<Vec<TipEvent>>,
}

impl Host {
    pub fn n_tips(&self) -> usize {
        self.tip_counts.iter().sum()
    }

    // Total tips at epochs 0..=j; the core hands out tip ids from this value
    // downward within epoch j.
    pub fn cum_tips(&self, epoch: usize) -> usize {
        self.tip_counts[..=epoch].iter().sum()
    }
}

// Converts a validated linelist into within-host problems. Cases whose
// transmission subtree contains no sampling event are pruned together with
// the tips that pointed at them.
pub fn build_hosts(records: &[CaseRecord]) -> Result<Vec<Host>> {
    let mut index = HashMap::new();
    for (i, rec) in records.iter().enumerate() {
        if index.insert(rec.id.as_str(), i).is_some() {
            bail!("duplicate case id '{}' in linelist", rec.id);
        }
    }

    let mut infector_of = vec![None; records.len()];
    for (i, rec) in records.iter().enumerate() {
        if let Some(name) = &rec.infector {
            let Some(&j) = index.get(name.as_str()) else {
                bail!("case '{}' names unknown infector '{name}'", rec.id);
            };
            if j == i {
                bail!("case '{}' cannot infect itself", rec.id);
            }
            if rec.infection_time <= records[j].infection_time {
                bail!(
                    "case '{}' infected at {} is not after its infector '{name}' at {}",
                    rec.id,
                    rec.infection_time,
                    records[j].infection_time
                );
            }
            infector_of[i] = Some(j);
        }
    }

    // Infection times strictly increase along every chain, so walking cases
    // latest-first visits infectees before their infectors.
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| records[b].infection_time.total_cmp(&records[a].infection_time));
    let mut keep = vec![false; records.len()];
    for &i in &order {
        keep[i] = records[i].sampling_time.is_some();
    }
    for &i in &order {
        if keep[i] && let Some(j) = infector_of[i] {
            keep[j] = true;
        }
    }

    if !keep.iter().any(|&k| k) {
        bail!("linelist contains no sampled case");
    }

    let mut host_index = vec![usize::MAX; records.len()];
    let mut next = 0usize;
    for (i, &kept) in keep.iter().enumerate() {
        if kept {
            host_index[i] = next;
            next += 1;
        }
    }

    let mut hosts: Vec<Host> = records
        .iter()
        .enumerate()
        .filter(|(i, _)| keep[*i])
        .map(|(i, rec)| Host {
            name: rec.id.clone(),
            kind: rec.kind.clone(),
            infector: infector_of[i].map(|j| host_index[j]),
            infection_time: rec.infection_time,
            tip_times: Vec::new(),
            tip_counts: Vec::new(),
            attachments: Vec::new(),
        })
        .collect();

    // Collect each host's tip events, then group them into epochs.
    let mut events: Vec<Vec<(f64, TipEvent)>> = vec![Vec::new(); hosts.len()];
    for (i, rec) in records.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        let h = host_index[i];
        if let Some(t) = rec.sampling_time {
            events[h].push((t, TipEvent::Sampling));
        }
        if let Some(j) = infector_of[i] {
            events[host_index[j]].push((rec.infection_time, TipEvent::Transmission(h)));
        }
    }

    for (h, mut evs) in events.into_iter().enumerate() {
        evs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (t, ev) in evs {
            if hosts[h].tip_times.last() == Some(&t) {
                let last = hosts[h].tip_counts.len() - 1;
                hosts[h].tip_counts[last] += 1;
                hosts[h].attachments[last].push(ev);
            } else {
                hosts[h].tip_times.push(t);
                hosts[h].tip_counts.push(1);
                hosts[h].attachments.push(vec![ev]);
            }
        }
    }

    Ok(hosts)
}
