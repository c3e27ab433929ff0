use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::path::PathBuf;

use epicoal_rs::host::build_hosts;
use epicoal_rs::io::linelist::read_linelist;
use epicoal_rs::io::trees::save_trees;
use epicoal_rs::progress;
use epicoal_rs::stitch::{collapse_unary, stitch_transmission_tree};

#[derive(Parser, Debug)]
#[command(name = "epicoal")]
#[command(about = "Sample time-scaled outbreak phylogenies from a transmission linelist", long_about = None)]
struct Cli {
    linelist: PathBuf,
    output: PathBuf,
    #[arg(long, default_value_t = 1.0)]
    pop_size: f64,
    #[arg(long, default_value_t = 1)]
    n_trees: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long)]
    collapse_unary: bool,
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.n_trees == 0 {
        bail!("--n-trees must be > 0");
    }

    let records = if cli.no_progress {
        read_linelist(&cli.linelist).with_context(|| "failed to read linelist")?
    } else {
        let pb = progress::spinner("IO", "Reading linelist");
        let records = read_linelist(&cli.linelist).with_context(|| "failed to read linelist")?;
        pb.finish_with_message("Reading linelist done");
        records
    };

    let hosts = build_hosts(&records)?;
    let n_tips: usize = hosts.iter().map(|h| h.n_tips()).sum();

    let mut rng = SmallRng::seed_from_u64(cli.seed);
    let mut trees = Vec::with_capacity(cli.n_trees);
    let pb = if cli.no_progress {
        None
    } else {
        Some(progress::bar(cli.n_trees as u64, "SIM", "Sampling phylogenies"))
    };
    for _ in 0..cli.n_trees {
        let mut tree = stitch_transmission_tree(&hosts, cli.pop_size, &mut rng)?;
        if cli.collapse_unary {
            collapse_unary(&mut tree);
        }
        trees.push(tree);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_with_message("Sampling phylogenies done");
    }

    save_trees(&cli.output, &trees)?;
    println!(
        "Sampled {} phylogenies over {} hosts ({} tips) into {:?}",
        trees.len(),
        hosts.len(),
        n_tips,
        cli.output
    );
    Ok(())
}
