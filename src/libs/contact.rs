//! Raw contact extraction.
//!
//! Qualifying read pairs become counts on the unordered contig pair they
//! link. Pairs are read in chunks; every chunk is split across rayon workers
//! that fill private maps, and the partial maps are summed afterwards.

use crate::libs::contig::{Contig, ContigTable};
use crate::libs::error::HicError;
use crate::libs::matrix::{Artifact, ContactMatrix};
use crate::libs::pairs::{ratio, PairReader, ReadEnd, ReadPair};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub min_mapq: u8,
    pub min_len: u64,
    pub min_match: u32,
    pub min_signal: u64,
    /// Pairs per parallel batch
    pub chunk: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_mapq: 30,
            min_len: 1000,
            min_match: 30,
            min_signal: 2,
            chunk: 100_000,
        }
    }
}

/// Why a pair did not become a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    Unmapped,
    Duplicate,
    LowMapq,
    ShortMatch,
    UnknownContig,
    ShortContig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Contact(u32, u32),
    Intra,
    Rejected(Reject),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub pairs: u64,
    /// Pairs counted into the matrix
    pub qualifying: u64,
    /// Pairs passing every filter but landing on one contig
    pub intra: u64,
    pub unmapped: u64,
    pub duplicate: u64,
    pub low_mapq: u64,
    pub short_match: u64,
    pub unknown_contig: u64,
    pub short_contig: u64,
    pub contigs_total: usize,
    pub contigs_eligible: usize,
    pub contigs_retained: usize,
}

impl ExtractStats {
    fn record(&mut self, verdict: Verdict) {
        self.pairs += 1;
        match verdict {
            Verdict::Contact(..) => self.qualifying += 1,
            Verdict::Intra => self.intra += 1,
            Verdict::Rejected(Reject::Unmapped) => self.unmapped += 1,
            Verdict::Rejected(Reject::Duplicate) => self.duplicate += 1,
            Verdict::Rejected(Reject::LowMapq) => self.low_mapq += 1,
            Verdict::Rejected(Reject::ShortMatch) => self.short_match += 1,
            Verdict::Rejected(Reject::UnknownContig) => self.unknown_contig += 1,
            Verdict::Rejected(Reject::ShortContig) => self.short_contig += 1,
        }
    }

    /// Pair counters only; contig counters are set once after pruning.
    pub fn merge(&mut self, other: &ExtractStats) {
        self.pairs += other.pairs;
        self.qualifying += other.qualifying;
        self.intra += other.intra;
        self.unmapped += other.unmapped;
        self.duplicate += other.duplicate;
        self.low_mapq += other.low_mapq;
        self.short_match += other.short_match;
        self.unknown_contig += other.unknown_contig;
        self.short_contig += other.short_contig;
    }

    /// Intra-contig over inter-contig qualifying pairs
    pub fn enrichment_ratio(&self) -> f64 {
        ratio(self.intra, self.qualifying)
    }

    /// `key\tvalue` lines
    pub fn to_tsv(&self) -> String {
        let rows: Vec<(&str, String)> = vec![
            ("pairs", self.pairs.to_string()),
            ("qualifying", self.qualifying.to_string()),
            ("intra", self.intra.to_string()),
            ("unmapped", self.unmapped.to_string()),
            ("duplicate", self.duplicate.to_string()),
            ("low_mapq", self.low_mapq.to_string()),
            ("short_match", self.short_match.to_string()),
            ("unknown_contig", self.unknown_contig.to_string()),
            ("short_contig", self.short_contig.to_string()),
            ("contigs_total", self.contigs_total.to_string()),
            ("contigs_eligible", self.contigs_eligible.to_string()),
            ("contigs_retained", self.contigs_retained.to_string()),
            ("enrichment_ratio", format!("{:.4}", self.enrichment_ratio())),
        ];
        rows.iter()
            .map(|(k, v)| format!("{}\t{}\n", k, v))
            .collect()
    }
}

#[derive(Default)]
struct Partial {
    counts: FxHashMap<(u32, u32), u64>,
    stats: ExtractStats,
}

impl Partial {
    fn merge(mut self, other: Partial) -> Partial {
        let (mut big, small) = if self.counts.len() >= other.counts.len() {
            (self.counts, other.counts)
        } else {
            (other.counts, self.counts)
        };
        for (key, count) in small {
            *big.entry(key).or_insert(0) += count;
        }
        self.counts = big;
        self.stats.merge(&other.stats);
        self
    }
}

/// Assembly contigs by id, in file order
struct Lookup {
    contigs: IndexMap<String, Contig>,
}

impl Lookup {
    fn new(assembly: Vec<Contig>) -> Result<Self, HicError> {
        let mut contigs = IndexMap::with_capacity(assembly.len());
        for c in assembly {
            if contigs.contains_key(&c.id) {
                return Err(HicError::InvalidInput(format!(
                    "duplicated contig id `{}` in the assembly",
                    c.id
                )));
            }
            contigs.insert(c.id.clone(), c);
        }
        Ok(Self { contigs })
    }

    fn end_check(&self, end: &ReadEnd, opts: &ExtractOptions) -> Result<u32, Reject> {
        let (idx, _, contig) = self
            .contigs
            .get_full(&end.contig)
            .ok_or(Reject::UnknownContig)?;
        if contig.length < opts.min_len {
            return Err(Reject::ShortContig);
        }
        Ok(idx as u32)
    }

    fn judge(&self, pair: &ReadPair, opts: &ExtractOptions) -> Verdict {
        let (a, b) = (&pair.a, &pair.b);
        if a.unmapped || b.unmapped {
            return Verdict::Rejected(Reject::Unmapped);
        }
        if a.duplicate || b.duplicate {
            return Verdict::Rejected(Reject::Duplicate);
        }
        if a.mapq < opts.min_mapq || b.mapq < opts.min_mapq {
            return Verdict::Rejected(Reject::LowMapq);
        }
        if a.match_len < opts.min_match || b.match_len < opts.min_match {
            return Verdict::Rejected(Reject::ShortMatch);
        }
        let ia = match self.end_check(a, opts) {
            Ok(i) => i,
            Err(r) => return Verdict::Rejected(r),
        };
        let ib = match self.end_check(b, opts) {
            Ok(i) => i,
            Err(r) => return Verdict::Rejected(r),
        };

        match ia.cmp(&ib) {
            std::cmp::Ordering::Equal => Verdict::Intra,
            std::cmp::Ordering::Less => Verdict::Contact(ia, ib),
            std::cmp::Ordering::Greater => Verdict::Contact(ib, ia),
        }
    }
}

fn count_chunk(lookup: &Lookup, chunk: &[ReadPair], opts: &ExtractOptions) -> Partial {
    chunk
        .par_iter()
        .fold(Partial::default, |mut acc, pair| {
            let verdict = lookup.judge(pair, opts);
            if let Verdict::Contact(i, j) = verdict {
                *acc.counts.entry((i, j)).or_insert(0) += 1;
            }
            acc.stats.record(verdict);
            acc
        })
        .reduce(Partial::default, Partial::merge)
}

/// Builds the raw contact artifact from a name-grouped SAM or BAM stream.
///
/// `assembly` supplies lengths and site counts. Contigs shorter than
/// `min_len` or with fewer than `min_signal` contacts are pruned together
/// with their cells; the survivors are ordered by descending length, then id.
pub fn extract<R: BufRead>(
    reader: R,
    assembly: Vec<Contig>,
    opts: &ExtractOptions,
) -> anyhow::Result<(Artifact, ExtractStats)> {
    let lookup = Lookup::new(assembly)?;
    let chunk_size = opts.chunk.max(1);

    let mut total = Partial::default();
    let mut pairs = PairReader::from_reader(reader)?;
    let mut chunk_no = 0usize;
    loop {
        let mut chunk = Vec::with_capacity(chunk_size.min(1 << 16));
        for pair in pairs.by_ref().take(chunk_size) {
            chunk.push(pair?);
        }
        if chunk.is_empty() {
            break;
        }
        chunk_no += 1;

        let partial = count_chunk(&lookup, &chunk, opts);
        log::debug!(
            "Chunk {}: {} pairs, {} contacts",
            chunk_no,
            partial.stats.pairs,
            partial.stats.qualifying
        );
        total = total.merge(partial);

        if chunk.len() < chunk_size {
            break;
        }
    }

    let Partial { counts, mut stats } = total;

    let n = lookup.contigs.len();
    let mut signal = vec![0u64; n];
    for (&(i, j), &c) in &counts {
        signal[i as usize] += c;
        signal[j as usize] += c;
    }

    let mut retained = vec![];
    for (idx, contig) in lookup.contigs.values().enumerate() {
        if contig.length < opts.min_len {
            continue;
        }
        stats.contigs_eligible += 1;
        if signal[idx] < opts.min_signal {
            continue;
        }
        let mut contig = contig.clone();
        contig.signal = signal[idx];
        retained.push(contig);
    }
    stats.contigs_total = n;
    stats.contigs_retained = retained.len();

    let table = ContigTable::canonical(retained)?;
    let mapping: Vec<Option<usize>> = lookup
        .contigs
        .keys()
        .map(|id| table.index_of(id))
        .collect();
    let triplets = counts
        .iter()
        .filter_map(|(&(i, j), &c)| match (mapping[i as usize], mapping[j as usize]) {
            (Some(a), Some(b)) => Some((a, b, c as f64)),
            _ => None,
        });
    let matrix = ContactMatrix::from_triplets(table.len(), triplets)?;

    log::info!(
        "{} of {} pairs qualified, {} intra-contig",
        stats.qualifying,
        stats.pairs,
        stats.intra
    );
    log::info!(
        "Retained {} of {} contigs (min length {}, min signal {}), {} contacts",
        stats.contigs_retained,
        stats.contigs_total,
        opts.min_len,
        opts.min_signal,
        matrix.nnz()
    );

    Ok((Artifact::new(table, matrix)?, stats))
}
