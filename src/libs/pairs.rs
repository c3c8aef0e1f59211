//! Read pairing and pair classification.
//!
//! The alignment stream must keep the two primary records of a mate pair on
//! adjacent lines, as produced by aligners or by `samtools sort -n`. Secondary
//! and supplementary records are skipped, single-end reads as well. Anything
//! else that breaks adjacency is a [`HicError::StreamOrdering`] error.

use crate::libs::error::HicError;
use crate::libs::insert::InsertSample;
use crate::libs::sam::{SamReader, SamRecord};
use std::io::BufRead;

/// One end of a read pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadEnd {
    pub contig: String,
    pub pos: u64,
    pub mapq: u8,
    pub match_len: u32,
    pub unmapped: bool,
    pub duplicate: bool,
    /// Observed template length, 0 for ends on different contigs
    pub tlen: i32,
}

impl From<SamRecord> for ReadEnd {
    fn from(rec: SamRecord) -> Self {
        let unmapped = rec.is_unmapped();
        let duplicate = rec.is_duplicate();
        Self {
            contig: rec.rname,
            pos: rec.pos,
            mapq: rec.mapq,
            match_len: rec.match_len,
            unmapped,
            duplicate,
            tlen: rec.tlen,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPair {
    pub name: String,
    pub a: ReadEnd,
    pub b: ReadEnd,
}

impl ReadPair {
    pub fn is_mapped(&self) -> bool {
        !self.a.unmapped && !self.b.unmapped
    }

    pub fn is_intra(&self) -> bool {
        self.a.contig == self.b.contig
    }

    /// Distance between the ends when both lie on the same contig
    pub fn distance(&self) -> Option<u64> {
        if self.is_mapped() && self.is_intra() {
            Some(self.a.pos.abs_diff(self.b.pos))
        } else {
            None
        }
    }

    /// Absolute template length of the pair, 0 when not available
    pub fn insert_size(&self) -> u32 {
        if self.a.tlen != 0 {
            self.a.tlen.unsigned_abs()
        } else {
            self.b.tlen.unsigned_abs()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairOptions {
    /// Same-contig pairs closer than this are not informative
    pub distance: u64,
    /// Insert sizes are sampled on this many longest contigs, 0 for all
    pub top_k: usize,
}

impl Default for PairOptions {
    fn default() -> Self {
        Self {
            distance: 10_000,
            top_k: 100,
        }
    }
}

impl PairOptions {
    pub fn informative(&self, a: &ReadEnd, b: &ReadEnd, check_distance: bool) -> bool {
        informative(a, b, check_distance, self.distance)
    }
}

/// Whether a pair is usable proximity evidence.
///
/// With `check_distance = false` the answer is the chimeric label used by
/// the long-range ratio.
///
/// ```
/// use hicbin::libs::pairs::{informative, ReadEnd};
/// let a = ReadEnd { contig: "c1".into(), pos: 1_000, mapq: 60, ..Default::default() };
/// let b = ReadEnd { contig: "c1".into(), pos: 4_000, mapq: 60, ..Default::default() };
/// assert!(!informative(&a, &b, true, 10_000));
/// assert!(informative(&a, &b, false, 10_000));
/// ```
pub fn informative(a: &ReadEnd, b: &ReadEnd, check_distance: bool, distance: u64) -> bool {
    if a.unmapped || b.unmapped || a.duplicate || b.duplicate {
        return false;
    }
    if a.mapq == 0 || b.mapq == 0 {
        return false;
    }
    if check_distance && a.contig == b.contig && a.pos.abs_diff(b.pos) <= distance {
        return false;
    }
    true
}

/// Groups adjacent primary records into [`ReadPair`]s.
pub struct PairReader<I>
where
    I: Iterator<Item = anyhow::Result<SamRecord>>,
{
    records: I,
}

impl<'a> PairReader<SamReader<'a>> {
    /// Pairs the records of a SAM or BAM stream.
    pub fn from_reader<R: BufRead + 'a>(reader: R) -> anyhow::Result<Self> {
        Ok(Self::new(SamReader::new(reader)?))
    }
}

impl<I> PairReader<I>
where
    I: Iterator<Item = anyhow::Result<SamRecord>>,
{
    pub fn new(records: I) -> Self {
        Self { records }
    }

    fn next_mate(&mut self) -> Option<anyhow::Result<SamRecord>> {
        loop {
            match self.records.next()? {
                Ok(rec) if !rec.is_primary() || !rec.is_paired() => continue,
                other => return Some(other),
            }
        }
    }
}

impl<I> Iterator for PairReader<I>
where
    I: Iterator<Item = anyhow::Result<SamRecord>>,
{
    type Item = anyhow::Result<ReadPair>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.next_mate()? {
            Ok(rec) => rec,
            Err(e) => return Some(Err(e)),
        };
        let second = match self.next_mate() {
            Some(Ok(rec)) => rec,
            Some(Err(e)) => return Some(Err(e)),
            None => {
                return Some(Err(HicError::StreamOrdering(format!(
                    "mate of `{}` is missing at the end of the stream",
                    first.qname
                ))
                .into()))
            }
        };

        if first.qname != second.qname {
            return Some(Err(HicError::StreamOrdering(format!(
                "expected the mate of `{}`, found `{}`",
                first.qname, second.qname
            ))
            .into()));
        }
        if !first.segment().is_empty() && first.segment() == second.segment() {
            return Some(Err(HicError::StreamOrdering(format!(
                "`{}` has two records for the same mate",
                first.qname
            ))
            .into()));
        }

        let name = first.qname.clone();
        Some(Ok(ReadPair {
            name,
            a: first.into(),
            b: second.into(),
        }))
    }
}

/// Aggregate counts over a pair stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairStats {
    pub total: u64,
    pub informative: u64,
    pub chimeric: u64,
    /// Both ends mapped, same contig
    pub intra: u64,
    /// Both ends mapped, different contigs
    pub inter: u64,
}

impl PairStats {
    pub fn add(&mut self, pair: &ReadPair, opts: &PairOptions) {
        self.total += 1;
        if opts.informative(&pair.a, &pair.b, true) {
            self.informative += 1;
        }
        if opts.informative(&pair.a, &pair.b, false) {
            self.chimeric += 1;
        }
        if pair.is_mapped() {
            if pair.is_intra() {
                self.intra += 1;
            } else {
                self.inter += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &PairStats) {
        self.total += other.total;
        self.informative += other.informative;
        self.chimeric += other.chimeric;
        self.intra += other.intra;
        self.inter += other.inter;
    }

    pub fn informative_ratio(&self) -> f64 {
        ratio(self.informative, self.total)
    }

    /// Chimeric pairs over non-chimeric pairs
    pub fn long_range_ratio(&self) -> f64 {
        ratio(self.chimeric, self.total - self.chimeric)
    }

    /// Inter-contig over intra-contig mapped pairs
    pub fn ratio_3d(&self) -> f64 {
        ratio(self.inter, self.intra)
    }
}

/// Division with sentinels: `0/0` is `0`, `x/0` is infinite.
///
/// ```
/// assert_eq!(hicbin::libs::pairs::ratio(0, 0), 0.0);
/// assert!(hicbin::libs::pairs::ratio(3, 0).is_infinite());
/// assert_eq!(hicbin::libs::pairs::ratio(1, 4), 0.25);
/// ```
pub fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        if num == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        num as f64 / den as f64
    }
}

/// Classifies every pair of a SAM or BAM stream.
///
/// Insert sizes of the pairs on the `top_k` longest header contigs are
/// sampled along the way.
pub fn classify<R: BufRead>(
    reader: R,
    opts: &PairOptions,
) -> anyhow::Result<(PairStats, InsertSample)> {
    let records = SamReader::new(reader)?;
    let mut sample = InsertSample::new(records.references(), opts.top_k);

    let mut stats = PairStats::default();
    for pair in PairReader::new(records) {
        let pair = pair?;
        stats.add(&pair, opts);
        sample.add(&pair);
    }
    log::info!(
        "Classified {} pairs: {} informative, {} chimeric, {} insert sizes",
        stats.total,
        stats.informative,
        stats.chimeric,
        sample.len()
    );
    Ok((stats, sample))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(contig: &str, pos: u64, mapq: u8) -> ReadEnd {
        ReadEnd {
            contig: contig.to_string(),
            pos,
            mapq,
            match_len: 100,
            ..Default::default()
        }
    }

    #[test]
    fn same_contig_close_pair() {
        let opts = PairOptions::default();
        let a = end("c1", 1_000, 60);
        let b = end("c1", 4_000, 60);
        assert!(!opts.informative(&a, &b, true));
        assert!(opts.informative(&a, &b, false));

        let mut stats = PairStats::default();
        stats.add(
            &ReadPair {
                name: "p".into(),
                a,
                b,
            },
            &opts,
        );
        assert_eq!(stats.informative, 0);
        assert_eq!(stats.chimeric, 1);
        assert!(stats.long_range_ratio().is_infinite());
    }

    #[test]
    fn distance_is_configurable() {
        let opts = PairOptions {
            distance: 2_000,
            ..Default::default()
        };
        let a = end("c1", 1_000, 60);
        let b = end("c1", 4_000, 60);
        assert!(opts.informative(&a, &b, true));
        let b = end("c1", 3_000, 60);
        assert!(!opts.informative(&a, &b, true));
    }

    #[test]
    fn quality_rules() {
        let opts = PairOptions::default();
        assert!(opts.informative(&end("c1", 1, 60), &end("c2", 1, 1), true));
        assert!(!opts.informative(&end("c1", 1, 60), &end("c2", 1, 0), false));

        let mut dup = end("c2", 1, 60);
        dup.duplicate = true;
        assert!(!opts.informative(&end("c1", 1, 60), &dup, false));

        let mut unmapped = end("c2", 1, 60);
        unmapped.unmapped = true;
        assert!(!opts.informative(&end("c1", 1, 60), &unmapped, false));
    }

    const HEADER: &str = "@HD\tVN:1.6\n@SQ\tSN:c1\tLN:50000\n@SQ\tSN:c2\tLN:30000\n@SQ\tSN:c3\tLN:1000\n";

    // Alignment lines written as `qname flag rname pos mapq cigar [tlen]`
    fn sam(lines: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for line in lines {
            let f: Vec<&str> = line.split_whitespace().collect();
            let tlen = f.get(6).copied().unwrap_or("0");
            text.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t*\t0\t{}\t*\t*\n",
                f[0], f[1], f[2], f[3], f[4], f[5], tlen
            ));
        }
        text
    }

    #[test]
    fn pairs_adjacent_records() {
        let lines = [
            "r1 65 c1 1 60 50M",
            "r1 321 c3 9 0 50M",
            "r1 129 c2 7 60 50M",
            "r2/1 65 c1 100 60 50M",
            "r2/2 129 c1 20000 60 50M",
            "r3 1 c1 1 60 50M",
        ];
        // r3 has no mate
        let err = PairReader::from_reader(sam(&lines).as_bytes())
            .unwrap()
            .collect::<anyhow::Result<Vec<ReadPair>>>()
            .unwrap_err();
        assert!(err.to_string().contains("`r3`"));

        let ok = sam(&lines[..5]);
        let pairs: Vec<ReadPair> = PairReader::from_reader(ok.as_bytes())
            .unwrap()
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].b.contig, "c2");
        assert_eq!(pairs[1].name, "r2");
        assert_eq!(pairs[1].distance(), Some(19_900));
    }

    #[test]
    fn out_of_order_stream() {
        let text = sam(&[
            "r1 65 c1 1 60 50M",
            "r2 65 c1 1 60 50M",
            "r1 129 c2 1 60 50M",
            "r2 129 c2 1 60 50M",
        ]);
        let err = PairReader::from_reader(text.as_bytes())
            .unwrap()
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HicError>(),
            Some(HicError::StreamOrdering(_))
        ));
    }

    #[test]
    fn duplicated_mate_record() {
        let text = sam(&["r1 65 c1 1 60 50M", "r1 65 c1 1 60 50M"]);
        let err = classify(text.as_bytes(), &PairOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HicError>(),
            Some(HicError::StreamOrdering(_))
        ));
    }

    #[test]
    fn ratios_are_bounded() {
        let text = format!(
            "{}c\t73\tc1\t1\t60\t50M\t=\t1\t0\t*\t*\nc\t133\t*\t0\t0\t*\tc1\t1\t0\t*\t*\n",
            sam(&[
                "a 65 c1 1 60 50M",
                "a 129 c2 1 60 50M",
                "b 65 c1 1 60 50M 549",
                "b 129 c1 500 60 50M -549",
                "d 65 c1 1 60 50M",
                "d 129 c1 50000 60 50M",
            ])
        );
        let (stats, sample) = classify(text.as_bytes(), &PairOptions::default()).unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.informative, 2);
        assert_eq!(stats.chimeric, 3);
        assert_eq!(stats.intra, 2);
        assert_eq!(stats.inter, 1);
        assert!(stats.informative <= stats.total);
        assert_eq!(stats.informative_ratio(), 0.5);
        assert_eq!(stats.long_range_ratio(), 3.0);
        assert_eq!(stats.ratio_3d(), 0.5);
        assert_eq!(sample.values(), &[549.0]);
    }

    #[test]
    fn insert_sizes_follow_top_k() {
        let text = sam(&[
            "a 65 c1 1 60 50M 300",
            "a 129 c1 250 60 50M -300",
            "b 65 c3 1 60 50M 200",
            "b 129 c3 150 60 50M -200",
            "c 65 c2 1 60 50M 7000",
            "c 129 c2 6950 60 50M -7000",
        ]);
        let opts = PairOptions {
            top_k: 1,
            ..Default::default()
        };
        let (_, sample) = classify(text.as_bytes(), &opts).unwrap();
        assert_eq!(sample.values(), &[300.0]);

        let opts = PairOptions {
            top_k: 0,
            ..Default::default()
        };
        let (_, sample) = classify(text.as_bytes(), &opts).unwrap();
        // 7 kb is beyond the sampling window
        assert_eq!(sample.values(), &[300.0, 200.0]);
    }

    #[test]
    fn empty_stream() {
        let (stats, sample) =
            classify("@HD\tVN:1.6\n".as_bytes(), &PairOptions::default()).unwrap();
        assert_eq!(stats.total, 0);
        assert!(sample.is_empty());
        assert_eq!(stats.informative_ratio(), 0.0);
        assert_eq!(stats.long_range_ratio(), 0.0);
        assert_eq!(stats.ratio_3d(), 0.0);
    }
}
