extern crate clap;
use clap::*;
use env_logger::Env;

mod cmd_hicbin;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let app = Command::new("hicbin")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`hicbin` - Hi-C contact graphs for metagenome binning")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_hicbin::pairs::make_subcommand())
        .subcommand(cmd_hicbin::contact::make_subcommand())
        .subcommand(cmd_hicbin::norm::make_subcommand())
        .subcommand(cmd_hicbin::consensus::make_subcommand())
        .subcommand(cmd_hicbin::assoc::make_subcommand())
        .subcommand(cmd_hicbin::stat::make_subcommand())
        .subcommand(cmd_hicbin::pipeline::make_subcommand())
        .after_help(
            r###"Subcommand groups:

* Read pairs:
    * pairs   - Informative, long-range and 3D ratios of a SAM stream
    * contact - Raw contig contact matrix from a SAM stream

* Matrices:
    * norm    - Normalize a contact matrix
    * stat    - Summary of a contact matrix

* Bins:
    * consensus - Reconcile MetaCC, bin3C and ImputeCC bins
    * assoc     - Host-MGE contacts per quality tier

* Pipelines:
    * pipeline  - contact -> norm -> consensus -> assoc

Log verbosity follows RUST_LOG, e.g. RUST_LOG=debug.

"###,
        );

    // Check which subcomamnd the user ran...
    match app.get_matches().subcommand() {
        Some(("pairs", sub_matches)) => cmd_hicbin::pairs::execute(sub_matches),
        Some(("contact", sub_matches)) => cmd_hicbin::contact::execute(sub_matches),
        Some(("norm", sub_matches)) => cmd_hicbin::norm::execute(sub_matches),
        Some(("consensus", sub_matches)) => cmd_hicbin::consensus::execute(sub_matches),
        Some(("assoc", sub_matches)) => cmd_hicbin::assoc::execute(sub_matches),
        Some(("stat", sub_matches)) => cmd_hicbin::stat::execute(sub_matches),
        Some(("pipeline", sub_matches)) => cmd_hicbin::pipeline::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
