use clap::*;
use hicbin::libs::bins::{Bin3c, BinAssignment, BinSource, ImputeCc, MetaCc};
use hicbin::libs::consensus::{integrate, Consensus, IdOnly, LargerBinThenId, TieBreak};
use hicbin::libs::matrix::Artifact;
use std::io::Write;
use std::path::PathBuf;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("consensus")
        .about("Reconciles three binning results into consensus bins")
        .after_help(
            r###"
Combines the bins of MetaCC, bin3C and ImputeCC, using a normalized contact
matrix to settle disagreements.

Rules:
* Two or more sources agree on a bin: the contig keeps it (majority)
* Otherwise, each bin that claims the contig is scored by the summed contact
  weight between the contig and the bin's other members; the best bin wins
  (contact)
* Ties go to the larger resulting bin, then the smaller bin id
  (--tie-break larger), or to the smaller bin id only (--tie-break id)
* No contact with any claiming bin: the contig stays unassigned ("-")

Each source is either a binner's output directory (MetaCC `BIN/*.fa`, bin3C
`fasta/*.fna`, ImputeCC `FINAL_BIN/*.fa`) or a `contig<TAB>bin` file.

Output:
* contig, bin, agreeing sources, resolution (majority / contact / unassigned)
* --order: bin, size, comma separated contigs; largest bins first

Examples:
1. Consensus from the three output directories:
   hicbin consensus norm --metacc metacc_out --bin3c bin3c_out --imputecc imputecc_out

2. Bin tables, ordering for plots:
   hicbin consensus norm --metacc a.tsv --bin3c b.tsv --imputecc c.tsv -o bins.tsv --order order.tsv

"###,
        )
        .arg(
            Arg::new("indir")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Directory of the normalized contact matrix"),
        )
        .args(source_args())
        .arg(super::arg_parallel())
        .arg(
            Arg::new("order")
                .long("order")
                .num_args(1)
                .help("Write the size-sorted bin ordering to this file"),
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

/// Options shared with `pipeline`
pub fn source_args() -> Vec<Arg> {
    vec![
        Arg::new("metacc")
            .long("metacc")
            .num_args(1)
            .required(true)
            .help("MetaCC output directory or bin table"),
        Arg::new("bin3c")
            .long("bin3c")
            .num_args(1)
            .required(true)
            .help("bin3C output directory or bin table"),
        Arg::new("imputecc")
            .long("imputecc")
            .num_args(1)
            .required(true)
            .help("ImputeCC output directory or bin table"),
        Arg::new("tie_break")
            .long("tie-break")
            .value_parser(["larger", "id"])
            .default_value("larger")
            .help("Tie-break between bins of equal support"),
    ]
}

pub fn run_consensus(args: &ArgMatches, artifact: &Artifact) -> anyhow::Result<Consensus> {
    let path = |name: &str| PathBuf::from(args.get_one::<String>(name).unwrap());
    let sources: Vec<Box<dyn BinSource>> = vec![
        Box::new(MetaCc {
            path: path("metacc"),
        }),
        Box::new(Bin3c {
            path: path("bin3c"),
        }),
        Box::new(ImputeCc {
            path: path("imputecc"),
        }),
    ];
    let parts = sources
        .iter()
        .map(|s| s.load())
        .collect::<anyhow::Result<Vec<BinAssignment>>>()?;

    let policy: Box<dyn TieBreak> = match args.get_one::<String>("tie_break").unwrap().as_str() {
        "id" => Box::new(IdOnly),
        _ => Box::new(LargerBinThenId),
    };

    Ok(integrate(
        [&parts[0], &parts[1], &parts[2]],
        &artifact.table,
        &artifact.matrix,
        policy.as_ref(),
    ))
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    super::init_pool(args)?;
    let indir = args.get_one::<String>("indir").unwrap();

    //----------------------------
    // Ops
    //----------------------------
    let artifact = Artifact::load(indir)?;
    let consensus = run_consensus(args, &artifact)?;

    //----------------------------
    // Output
    //----------------------------
    let mut writer = hicbin::writer(args.get_one::<String>("outfile").unwrap())?;
    consensus.write_entries(&mut writer)?;
    writer.flush()?;

    if let Some(order) = args.get_one::<String>("order") {
        let mut writer = hicbin::writer(order)?;
        consensus.write_order(&mut writer)?;
        writer.flush()?;
    }

    Ok(())
}
