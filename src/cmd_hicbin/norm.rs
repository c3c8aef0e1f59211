use clap::*;
use hicbin::libs::matrix::Artifact;
use hicbin::libs::norm::{normalize, Method, NormOptions};

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("norm")
        .about("Normalizes a contact matrix")
        .after_help(
            r###"
Rescales the cells of a contact matrix by the features of the two contigs.
Cells are never added; a cell may only be rescaled or dropped.

Methods:
* raw      - unchanged
* length   - w * mean(L)^2 / (L_i * L_j)
* site     - w * mean(S+1)^2 / ((S_i+1) * (S_j+1))
* coverage - w * mean(C)^2 / (C_i * C_j)                    [needs --coverage]
* normcc   - log-linear fit of w on sites, length and coverage;
             cells below the --thres quantile are dropped   [needs --coverage]
* bin3c    - site, then Sinkhorn-Knopp balancing, scaled back to the total

Contigs with zero or missing coverage lose all their cells under `coverage`
and `normcc`.

Coverage file:
* `contig<TAB>coverage`, or
* the depth table of `jgi_summarize_bam_contig_depths` (contigName, totalAvgDepth)

Examples:
1. NormCC with MetaBAT depths:
   hicbin norm raw --method normcc --coverage depth.txt -o norm

2. bin3C style normalization:
   hicbin norm raw --method bin3c -o norm

"###,
        )
        .arg(
            Arg::new("indir")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Directory of the raw contact matrix"),
        )
        .arg(norm_method_arg())
        .args(norm_args())
        .arg(super::arg_parallel())
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .short('o')
                .num_args(1)
                .required(true)
                .help("Output directory of the normalized matrix"),
        )
}

fn norm_method_arg() -> Arg {
    Arg::new("method")
        .long("method")
        .short('m')
        .num_args(1)
        .required(true)
        .help("Normalization method")
}

/// Options shared with `pipeline`
pub fn norm_args() -> Vec<Arg> {
    vec![
        Arg::new("coverage")
            .long("coverage")
            .short('c')
            .num_args(1)
            .help("Per-contig coverage table"),
        Arg::new("pattern")
            .long("pattern")
            .num_args(1)
            .help("Regex whose first group extracts the contig id from coverage rows"),
        Arg::new("thres")
            .long("thres")
            .value_parser(value_parser!(f64))
            .num_args(1)
            .default_value("0.05")
            .help("NormCC quantile below which cells are dropped"),
    ]
}

/// Joins the optional coverage and normalizes the artifact
pub fn run_norm(args: &ArgMatches, raw: &Artifact) -> anyhow::Result<Artifact> {
    let method: Method = args.get_one::<String>("method").unwrap().parse()?;
    let opts = NormOptions {
        thres: *args.get_one::<f64>("thres").unwrap(),
        ..Default::default()
    };

    let table = match args.get_one::<String>("coverage") {
        Some(coverage) => {
            let pattern = match args.get_one::<String>("pattern") {
                Some(p) => Some(regex::Regex::new(p)?),
                None => None,
            };
            let reader = hicbin::reader(coverage)?;
            raw.table.join_coverage(reader, pattern.as_ref())?
        }
        None => raw.table.clone(),
    };

    let matrix = normalize(method, &table, &raw.matrix, &opts)?;
    Ok(Artifact::new(table, matrix)?)
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    super::init_pool(args)?;
    let indir = args.get_one::<String>("indir").unwrap();
    let outdir = args.get_one::<String>("outdir").unwrap();

    //----------------------------
    // Ops
    //----------------------------
    let raw = Artifact::load(indir)?;
    let normalized = run_norm(args, &raw)?;

    //----------------------------
    // Output
    //----------------------------
    normalized.save(outdir)?;

    Ok(())
}
