use clap::*;
use hicbin::libs::matrix::Artifact;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("stat")
        .about("Summarizes a contact matrix")
        .after_help(
            r###"
Reports, as `key<TAB>value` lines:
* contigs      - contigs in the table
* contacts     - non-zero cells of the upper triangle
* total_weight - sum of the cells
* signal       - sum of the contig signals recorded at extraction
* size         - total length of the contigs
* n50, l50     - N50 and L50 of the contig lengths

Examples:
1. Summary of a raw matrix:
   hicbin stat raw

"###,
        )
        .arg(
            Arg::new("indir")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Directory of a contact matrix"),
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

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let artifact = Artifact::load(args.get_one::<String>("indir").unwrap())?;
    let mut writer = hicbin::writer(args.get_one::<String>("outfile").unwrap())?;

    let signal: u64 = artifact.table.iter().map(|c| c.signal).sum();
    let (n50, l50) = artifact.table.n50();

    writer.write_fmt(format_args!("contigs\t{}\n", artifact.table.len()))?;
    writer.write_fmt(format_args!("contacts\t{}\n", artifact.matrix.nnz()))?;
    writer.write_fmt(format_args!(
        "total_weight\t{:.4}\n",
        artifact.matrix.total()
    ))?;
    writer.write_fmt(format_args!("signal\t{}\n", signal))?;
    writer.write_fmt(format_args!("size\t{}\n", artifact.table.total_length()))?;
    writer.write_fmt(format_args!("n50\t{}\n", n50))?;
    writer.write_fmt(format_args!("l50\t{}\n", l50))?;
    writer.flush()?;

    Ok(())
}
