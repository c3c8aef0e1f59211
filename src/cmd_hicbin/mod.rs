//! Subcommand modules for the `hicbin` binary.

pub mod assoc;
pub mod consensus;
pub mod contact;
pub mod norm;
pub mod pairs;
pub mod pipeline;
pub mod stat;

/// Sizes the global rayon pool from `--parallel`.
pub fn init_pool(args: &clap::ArgMatches) -> anyhow::Result<()> {
    let opt_parallel = *args.get_one::<usize>("parallel").unwrap();
    rayon::ThreadPoolBuilder::new()
        .num_threads(opt_parallel)
        .build_global()?;
    Ok(())
}

pub fn arg_parallel() -> clap::Arg {
    clap::Arg::new("parallel")
        .long("parallel")
        .short('p')
        .value_parser(clap::value_parser!(usize))
        .num_args(1)
        .default_value("1")
        .help("Number of threads for parallel processing")
}
