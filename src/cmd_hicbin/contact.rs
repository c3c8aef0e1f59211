use clap::*;
use hicbin::libs::contact::{extract, ExtractOptions, ExtractStats};
use hicbin::libs::contig::read_assembly;
use hicbin::libs::enzyme::RestrictionModel;
use hicbin::libs::matrix::Artifact;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    let cmd = Command::new("contact")
        .about("Builds the raw contig contact matrix from Hi-C alignments")
        .after_help(
            r###"
Counts Hi-C read pairs linking two different contigs and writes the contact
matrix together with its contig table.

A pair qualifies when both ends are mapped and not duplicates, both MAPQs are
>= --min-mapq, both aligned lengths (CIGAR M/=/X) are >= --min-match, both
contigs are in the assembly and >= --min-len, and the ends lie on different
contigs. Contigs with fewer than --min-signal contacts are then dropped.

Output directory:
* contigs.tsv  - index, id, length, restriction sites, signal, coverage
* contacts.tsv - i, j, count; upper triangle

Contigs are ordered by descending length, then id. This order indexes the
matrix in every later step.

Enzymes: Sau3AI, MboI, DpnII, MluCI, MseI, AluI, HinfI, DdeI, HindIII, NcoI,
and Arima (GATC + GANTC).

Examples:
1. Raw contacts with the defaults:
   hicbin contact hic.bam --fasta asm.fa -o raw

2. Arima kit, 8 threads, statistics to a file:
   hicbin contact hic.sam.gz --fasta asm.fa.gz --enzyme Arima -p 8 --stats extract.tsv -o raw

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Input SAM or BAM file, mates on adjacent records"),
        );

    extract_args(cmd)
        .arg(
            Arg::new("stats")
                .long("stats")
                .num_args(1)
                .help("Write extraction statistics to this file"),
        )
        .arg(super::arg_parallel())
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .num_args(1)
                .required(true)
                .help("Output directory of the contact matrix"),
        )
}

/// Options shared with `pipeline`
pub fn extract_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("fasta")
            .long("fasta")
            .short('f')
            .num_args(1)
            .required(true)
            .help("Assembly in FASTA format"),
    )
    .arg(
        Arg::new("enzyme")
            .long("enzyme")
            .short('e')
            .num_args(1)
            .default_value("Sau3AI,MluCI")
            .help("Comma separated restriction enzymes"),
    )
    .arg(
        Arg::new("min_mapq")
            .long("min-mapq")
            .value_parser(value_parser!(u8))
            .num_args(1)
            .default_value("30")
            .help("Minimal mapping quality of both ends"),
    )
    .arg(
        Arg::new("min_len")
            .long("min-len")
            .value_parser(value_parser!(u64))
            .num_args(1)
            .default_value("1000")
            .help("Minimal contig length"),
    )
    .arg(
        Arg::new("min_match")
            .long("min-match")
            .value_parser(value_parser!(u32))
            .num_args(1)
            .default_value("30")
            .help("Minimal aligned length of both ends"),
    )
    .arg(
        Arg::new("min_signal")
            .long("min-signal")
            .value_parser(value_parser!(u64))
            .num_args(1)
            .default_value("2")
            .help("Minimal number of contacts of a retained contig"),
    )
    .arg(
        Arg::new("chunk")
            .long("chunk")
            .value_parser(value_parser!(usize))
            .num_args(1)
            .default_value("100000")
            .help("Read pairs per parallel batch"),
    )
}

pub fn extract_options(args: &ArgMatches) -> ExtractOptions {
    ExtractOptions {
        min_mapq: *args.get_one::<u8>("min_mapq").unwrap(),
        min_len: *args.get_one::<u64>("min_len").unwrap(),
        min_match: *args.get_one::<u32>("min_match").unwrap(),
        min_signal: *args.get_one::<u64>("min_signal").unwrap(),
        chunk: *args.get_one::<usize>("chunk").unwrap(),
    }
}

/// Reads the assembly and the alignments, returns the raw artifact
pub fn run_extract(args: &ArgMatches) -> anyhow::Result<(Artifact, ExtractStats)> {
    let model = RestrictionModel::from_list(args.get_one::<String>("enzyme").unwrap())?;
    let opts = extract_options(args);

    let fa_reader = hicbin::reader(args.get_one::<String>("fasta").unwrap())?;
    let assembly = read_assembly(fa_reader, &model)?;
    log::info!(
        "Read {} contigs, counting sites of {}",
        assembly.len(),
        model.enzymes().join(",")
    );

    let reader = hicbin::reader(args.get_one::<String>("infile").unwrap())?;
    extract(reader, assembly, &opts)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    super::init_pool(args)?;
    let outdir = args.get_one::<String>("outdir").unwrap();

    //----------------------------
    // Ops
    //----------------------------
    let (artifact, stats) = run_extract(args)?;

    //----------------------------
    // Output
    //----------------------------
    artifact.save(outdir)?;
    if let Some(stats_file) = args.get_one::<String>("stats") {
        let mut writer = hicbin::writer(stats_file)?;
        writer.write_all(stats.to_tsv().as_bytes())?;
        writer.flush()?;
    }

    Ok(())
}
