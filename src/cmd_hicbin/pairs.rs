use clap::*;
use hicbin::libs::insert::{EmOptions, Mixture};
use hicbin::libs::pairs::{classify, PairOptions};
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("pairs")
        .about("Classifies Hi-C read pairs and reports quality ratios")
        .after_help(
            r###"
Reads a SAM or BAM stream whose mates sit on adjacent records (aligner output
or `samtools sort -n`) and classifies every read pair.

Definitions:
* informative: both ends mapped, no duplicate, MAPQ > 0, and not two ends on
  one contig within --distance bp
* chimeric: as informative, without the distance rule
* informative_ratio = informative / total
* long_range_ratio  = chimeric / (total - chimeric)
* ratio_3d          = inter-contig / intra-contig mapped pairs
A zero denominator gives 0 when the numerator is 0, and inf otherwise.

Insert sizes (|TLEN| below 5000) of same-contig pairs on the --top-k longest
header contigs feed a two-component Gaussian mixture fitted by EM:
* pi_chimeric: share of the wide, chimeric component
* insert_cutoff: min(chimeric 5% quantile, normal 95% quantile), at least 100
* mixture_long_range_ratio = (intra * pi_chimeric + inter) / (intra + inter)

Notes:
* Secondary, supplementary and single-end records are skipped
* Mates that are not adjacent stop the run with an error
* BAM is recognized by its BGZF magic, SAM text needs its @SQ header lines
* Supports both plain text and gzipped (.gz) files
* Reads from stdin if input file is 'stdin'

Examples:
1. Ratios of an alignment:
   hicbin pairs tests/hic/reads.sam

2. Name-sorted BAM, insert sizes from the 20 longest contigs:
   hicbin pairs hic.bam --top-k 20

3. Stream from samtools:
   samtools sort -n -O sam hic.bam | hicbin pairs stdin --distance 5000

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Input SAM or BAM file to process"),
        )
        .arg(
            Arg::new("distance")
                .long("distance")
                .short('d')
                .value_parser(value_parser!(u64))
                .num_args(1)
                .default_value("10000")
                .help("Same-contig pairs at most this far apart are not informative"),
        )
        .arg(
            Arg::new("top_k")
                .long("top-k")
                .short('k')
                .value_parser(value_parser!(usize))
                .num_args(1)
                .default_value("100")
                .help("Sample insert sizes on this many longest contigs, 0 for all"),
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
    //----------------------------
    // Args
    //----------------------------
    let reader = hicbin::reader(args.get_one::<String>("infile").unwrap())?;
    let mut writer = hicbin::writer(args.get_one::<String>("outfile").unwrap())?;

    let opts = PairOptions {
        distance: *args.get_one::<u64>("distance").unwrap(),
        top_k: *args.get_one::<usize>("top_k").unwrap(),
    };

    //----------------------------
    // Ops
    //----------------------------
    let (stats, sample) = classify(reader, &opts)?;
    let mixture = Mixture::fit(sample.values(), &EmOptions::default());

    //----------------------------
    // Output
    //----------------------------
    writer.write_fmt(format_args!("total\t{}\n", stats.total))?;
    writer.write_fmt(format_args!("informative\t{}\n", stats.informative))?;
    writer.write_fmt(format_args!("chimeric\t{}\n", stats.chimeric))?;
    writer.write_fmt(format_args!("intra\t{}\n", stats.intra))?;
    writer.write_fmt(format_args!("inter\t{}\n", stats.inter))?;
    writer.write_fmt(format_args!(
        "informative_ratio\t{:.4}\n",
        stats.informative_ratio()
    ))?;
    writer.write_fmt(format_args!(
        "long_range_ratio\t{:.4}\n",
        stats.long_range_ratio()
    ))?;
    writer.write_fmt(format_args!("ratio_3d\t{:.4}\n", stats.ratio_3d()))?;
    writer.write_fmt(format_args!("insert_sizes\t{}\n", sample.len()))?;
    writer.write_fmt(format_args!("mu_normal\t{:.1}\n", mixture.mu_n))?;
    writer.write_fmt(format_args!("sigma_normal\t{:.1}\n", mixture.sigma_n))?;
    writer.write_fmt(format_args!("mu_chimeric\t{:.1}\n", mixture.mu_c))?;
    writer.write_fmt(format_args!("sigma_chimeric\t{:.1}\n", mixture.sigma_c))?;
    writer.write_fmt(format_args!("pi_chimeric\t{:.4}\n", mixture.pi_c))?;
    writer.write_fmt(format_args!("insert_cutoff\t{:.2}\n", mixture.cutoff()))?;
    writer.write_fmt(format_args!(
        "mixture_long_range_ratio\t{:.4}\n",
        mixture.long_range_ratio(stats.intra, stats.inter)
    ))?;
    writer.flush()?;

    Ok(())
}
