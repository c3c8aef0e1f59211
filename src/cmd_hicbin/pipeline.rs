use clap::*;
use hicbin::libs::matrix::Artifact;
use std::io::Write;
use std::path::Path;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("pipeline")
        .about("Runs contact -> norm -> consensus -> assoc")
        .after_help(
            r###"
Runs every step in one process. A step starts only after the previous one
wrote its output, and the first failure stops the run.

Output directory:
* raw/            - raw contact matrix
* extract.tsv     - extraction statistics
* norm/           - normalized contact matrix
* consensus.tsv   - consensus bins
* order.tsv       - size-sorted bin ordering
* assoc.tsv       - host-MGE tier summary     [with --tiers]
* assoc.hosts.tsv - per-MGE host attributions [with --tiers]

`normcc` and `coverage` need --coverage.

Examples:
1. Full run with MetaBAT depths and CheckV tiers:
   hicbin pipeline hic.sam --fasta asm.fa --coverage depth.txt \
       --metacc metacc_out --bin3c bin3c_out --imputecc imputecc_out \
       --tiers tiers.tsv -p 8 -o hicbin_out

2. Without coverage:
   hicbin pipeline hic.sam --fasta asm.fa --method bin3c \
       --metacc a.tsv --bin3c b.tsv --imputecc c.tsv -o hicbin_out

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Input SAM or BAM file, mates on adjacent records"),
        );

    super::contact::extract_args(cmd)
        .arg(
            Arg::new("method")
                .long("method")
                .short('m')
                .num_args(1)
                .default_value("normcc")
                .help("Normalization method"),
        )
        .args(super::norm::norm_args())
        .args(super::consensus::source_args())
        .arg(
            Arg::new("tiers")
                .long("tiers")
                .num_args(1)
                .help("MGE quality tiers; enables the association step"),
        )
        .arg(super::arg_parallel())
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .num_args(1)
                .required(true)
                .help("Output directory"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    super::init_pool(args)?;
    let outdir = Path::new(args.get_one::<String>("outdir").unwrap());
    std::fs::create_dir_all(outdir)?;
    let out = |name: &str| outdir.join(name).to_string_lossy().to_string();

    //----------------------------
    // Contacts
    //----------------------------
    log::info!("==> contact");
    let (raw, stats) = super::contact::run_extract(args)?;
    raw.save(outdir.join("raw"))?;
    let mut writer = hicbin::writer(&out("extract.tsv"))?;
    writer.write_all(stats.to_tsv().as_bytes())?;
    writer.flush()?;

    //----------------------------
    // Normalization
    //----------------------------
    log::info!("==> norm");
    let raw = Artifact::load(outdir.join("raw"))?;
    let normalized = super::norm::run_norm(args, &raw)?;
    normalized.save(outdir.join("norm"))?;

    //----------------------------
    // Consensus
    //----------------------------
    log::info!("==> consensus");
    let normalized = Artifact::load(outdir.join("norm"))?;
    let consensus = super::consensus::run_consensus(args, &normalized)?;
    let mut writer = hicbin::writer(&out("consensus.tsv"))?;
    consensus.write_entries(&mut writer)?;
    writer.flush()?;
    let mut writer = hicbin::writer(&out("order.tsv"))?;
    consensus.write_order(&mut writer)?;
    writer.flush()?;

    //----------------------------
    // Association
    //----------------------------
    if let Some(tiers) = args.get_one::<String>("tiers") {
        log::info!("==> assoc");
        let association = super::assoc::run_assoc(&out("consensus.tsv"), tiers, &normalized)?;
        let mut writer = hicbin::writer(&out("assoc.tsv"))?;
        association.write_summary(&mut writer)?;
        writer.flush()?;
        let mut writer = hicbin::writer(&out("assoc.hosts.tsv"))?;
        association.write_records(&mut writer)?;
        writer.flush()?;
    }

    Ok(())
}
