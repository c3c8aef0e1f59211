use clap::*;
use hicbin::libs::assoc::{read_host_bins, read_tiers, score, Association};
use hicbin::libs::matrix::Artifact;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("assoc")
        .about("Counts Hi-C contacts between host bins and MGE contigs")
        .after_help(
            r###"
Scans the normalized contact matrix once. A cell counts for a tier when one
contig belongs to a host bin and the other is an MGE of that tier; cells
between two hosts or two MGEs are skipped. Every MGE is attributed to the
host bin with the largest summed weight (ties to the smaller bin id).

Inputs:
* --bins: `contig<TAB>bin`, e.g. the output of `hicbin consensus`
* --tiers: `contig<TAB>tier`, e.g. CheckV contig_id and checkv_quality;
  `#` lines and a `contig_id` header are skipped

A contig listed both in a host bin and as an MGE is treated as an MGE.

Output:
* tier, MGE contigs, host contacts, attributed MGEs
* --records: MGE, tier, best host bin, weight

Examples:
1. Tier summary:
   hicbin assoc norm --bins bins.tsv --tiers tiers.tsv

2. Per-MGE attributions:
   hicbin assoc norm --bins bins.tsv --tiers tiers.tsv --records hosts.tsv -o summary.tsv

"###,
        )
        .arg(
            Arg::new("indir")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Directory of the normalized contact matrix"),
        )
        .arg(
            Arg::new("bins")
                .long("bins")
                .num_args(1)
                .required(true)
                .help("Host bins"),
        )
        .arg(
            Arg::new("tiers")
                .long("tiers")
                .num_args(1)
                .required(true)
                .help("MGE quality tiers"),
        )
        .arg(super::arg_parallel())
        .arg(
            Arg::new("records")
                .long("records")
                .num_args(1)
                .help("Write per-MGE host attributions to this file"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

pub fn run_assoc(bins: &str, tiers: &str, artifact: &Artifact) -> anyhow::Result<Association> {
    let hosts = read_host_bins(hicbin::reader(bins)?)?;
    let tiers = read_tiers(hicbin::reader(tiers)?)?;
    log::info!(
        "{} host contigs, {} MGE contigs in {} tiers",
        hosts.len(),
        tiers.len(),
        tiers.names().len()
    );
    Ok(score(&artifact.table, &artifact.matrix, &hosts, &tiers)?)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    super::init_pool(args)?;
    let indir = args.get_one::<String>("indir").unwrap();
    let bins = args.get_one::<String>("bins").unwrap();
    let tiers = args.get_one::<String>("tiers").unwrap();

    //----------------------------
    // Ops
    //----------------------------
    let artifact = Artifact::load(indir)?;
    let association = run_assoc(bins, tiers, &artifact)?;

    //----------------------------
    // Output
    //----------------------------
    let mut writer = hicbin::writer(args.get_one::<String>("outfile").unwrap())?;
    association.write_summary(&mut writer)?;
    writer.flush()?;

    if let Some(records) = args.get_one::<String>("records") {
        let mut writer = hicbin::writer(records)?;
        association.write_records(&mut writer)?;
        writer.flush()?;
    }

    Ok(())
}
