//! Consensus of three binning partitions.
//!
//! A contig placed in the same bin by at least two sources keeps that bin.
//! Every other contig goes to the candidate bin it is most strongly linked
//! to in the normalized contact matrix, or stays unassigned when it has no
//! contact with any candidate.

use crate::libs::bins::BinAssignment;
use crate::libs::contig::ContigTable;
use crate::libs::matrix::ContactMatrix;
use fxhash::{FxHashMap, FxHashSet};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Majority,
    Contact,
    Unassigned,
}

impl Resolution {
    pub fn name(&self) -> &'static str {
        match self {
            Resolution::Majority => "majority",
            Resolution::Contact => "contact",
            Resolution::Unassigned => "unassigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusEntry {
    pub contig: String,
    pub bin: Option<String>,
    /// Sources placing the contig in `bin`
    pub agreement: usize,
    /// Contact weight to the chosen bin; zero for majority calls
    pub support: f64,
    pub resolution: Resolution,
}

/// A bin competing for a contig without a majority
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bin: String,
    pub support: f64,
    /// Majority members of the bin plus the contig itself
    pub size: usize,
}

/// Orders candidates of equal support; `Greater` means `a` wins.
pub trait TieBreak {
    fn prefer(&self, a: &Candidate, b: &Candidate) -> Ordering;
}

/// Larger resulting bin first, then the smaller bin id
#[derive(Debug, Clone, Copy, Default)]
pub struct LargerBinThenId;

impl TieBreak for LargerBinThenId {
    fn prefer(&self, a: &Candidate, b: &Candidate) -> Ordering {
        a.size.cmp(&b.size).then_with(|| b.bin.cmp(&a.bin))
    }
}

/// Smaller bin id only
#[derive(Debug, Clone, Copy, Default)]
pub struct IdOnly;

impl TieBreak for IdOnly {
    fn prefer(&self, a: &Candidate, b: &Candidate) -> Ordering {
        b.bin.cmp(&a.bin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinOrder {
    pub bin: String,
    pub contigs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consensus {
    /// Grouped by `order`, unassigned contigs last
    pub entries: Vec<ConsensusEntry>,
    /// Non-empty bins by descending size, then id
    pub order: Vec<BinOrder>,
}

impl Consensus {
    pub fn write_entries<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writeln!(writer, "#contig\tbin\tagreement\tresolution")?;
        for e in &self.entries {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                e.contig,
                e.bin.as_deref().unwrap_or("-"),
                e.agreement,
                e.resolution.name()
            )?;
        }
        Ok(())
    }

    pub fn write_order<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writeln!(writer, "#bin\tsize\tcontigs")?;
        for b in &self.order {
            writeln!(writer, "{}\t{}\t{}", b.bin, b.contigs.len(), b.contigs.iter().join(","))?;
        }
        Ok(())
    }

    /// Assigned contigs as a `contig -> bin` partition
    pub fn to_assignment(&self) -> BinAssignment {
        let mut assignment = BinAssignment::new("consensus");
        for e in &self.entries {
            assignment.insert(&e.contig, e.bin.as_deref());
        }
        assignment
    }
}

/// Reconciles three partitions against the normalized `matrix`.
pub fn integrate(
    parts: [&BinAssignment; 3],
    table: &ContigTable,
    matrix: &ContactMatrix,
    policy: &dyn TieBreak,
) -> Consensus {
    let mut contigs: IndexSet<&str> = IndexSet::new();
    for part in parts {
        contigs.extend(part.contigs());
    }

    // bin -> table indices of every contig any source put there
    let mut members: IndexMap<&str, FxHashSet<usize>> = IndexMap::new();
    for part in parts {
        for (contig, bin) in part.iter() {
            if let Some(bin) = bin {
                let set = members.entry(bin).or_default();
                if let Some(idx) = table.index_of(contig) {
                    set.insert(idx);
                }
            }
        }
    }

    let mut decided: FxHashMap<&str, (Option<String>, f64, Resolution)> = FxHashMap::default();
    let mut majority_size: FxHashMap<&str, usize> = FxHashMap::default();
    let mut pending: Vec<(&str, Vec<&str>)> = vec![];

    for &contig in &contigs {
        let labels: Vec<&str> = parts.iter().filter_map(|p| p.get(contig).flatten()).collect();
        let majority = labels
            .iter()
            .find(|b| labels.iter().filter(|x| x == b).count() >= 2)
            .copied();

        match majority {
            Some(bin) => {
                *majority_size.entry(bin).or_insert(0) += 1;
                decided.insert(contig, (Some(bin.to_string()), 0.0, Resolution::Majority));
            }
            None if labels.is_empty() => {
                decided.insert(contig, (None, 0.0, Resolution::Unassigned));
            }
            None => {
                let candidates: Vec<&str> = labels.into_iter().unique().collect();
                pending.push((contig, candidates));
            }
        }
    }

    // support of every pending contig for each of its candidate bins
    let pending_rows: Vec<Option<usize>> = pending
        .iter()
        .map(|(contig, _)| table.index_of(contig))
        .collect();
    let (pending_ref, rows) = (&pending, &pending_rows);
    let bins: Vec<(&str, &FxHashSet<usize>)> = members.iter().map(|(b, s)| (*b, s)).collect();
    let support: FxHashMap<(usize, &str), f64> = bins
        .par_iter()
        .flat_map_iter(|&(bin, set)| {
            pending_ref
                .iter()
                .enumerate()
                .filter(move |(_, (_, candidates))| candidates.contains(&bin))
                .map(move |(p, _)| {
                    let weight = match rows[p] {
                        Some(row) => matrix
                            .row(row)
                            .filter(|(j, _)| *j != row && set.contains(j))
                            .map(|(_, w)| w)
                            .sum::<f64>(),
                        None => 0.0,
                    };
                    ((p, bin), weight)
                })
        })
        .collect();

    for (p, (contig, candidates)) in pending.iter().enumerate() {
        let best = candidates
            .iter()
            .map(|&bin| Candidate {
                bin: bin.to_string(),
                support: support.get(&(p, bin)).copied().unwrap_or(0.0),
                size: majority_size.get(bin).copied().unwrap_or(0) + 1,
            })
            .max_by(|a, b| {
                a.support
                    .total_cmp(&b.support)
                    .then_with(|| policy.prefer(a, b))
            });

        let decision = match best {
            Some(c) if c.support > 0.0 => (Some(c.bin), c.support, Resolution::Contact),
            _ => (None, 0.0, Resolution::Unassigned),
        };
        decided.insert(*contig, decision);
    }

    // canonical position, then id for contigs outside the table
    let rank = |contig: &str| (table.index_of(contig).unwrap_or(usize::MAX), contig.to_string());

    let mut by_bin: IndexMap<String, Vec<&str>> = IndexMap::new();
    let mut unassigned: Vec<&str> = vec![];
    for &contig in &contigs {
        match &decided[contig].0 {
            Some(bin) => by_bin.entry(bin.clone()).or_default().push(contig),
            None => unassigned.push(contig),
        }
    }

    let order: Vec<BinOrder> = by_bin
        .into_iter()
        .map(|(bin, list)| BinOrder {
            bin,
            contigs: list
                .into_iter()
                .sorted_by_key(|c| rank(c))
                .map(|c| c.to_string())
                .collect(),
        })
        .sorted_by(|a, b| b.contigs.len().cmp(&a.contigs.len()).then_with(|| a.bin.cmp(&b.bin)))
        .collect();

    let entry = |contig: &str| {
        let (bin, support, resolution) = decided[contig].clone();
        let agreement = match &bin {
            Some(b) => parts
                .iter()
                .filter(|p| p.get(contig).flatten() == Some(b.as_str()))
                .count(),
            None => 0,
        };
        ConsensusEntry {
            contig: contig.to_string(),
            bin,
            agreement,
            support,
            resolution,
        }
    };

    let mut entries: Vec<ConsensusEntry> = order
        .iter()
        .flat_map(|b| b.contigs.iter())
        .map(|c| entry(c))
        .collect();
    entries.extend(unassigned.into_iter().sorted_by_key(|c| rank(c)).map(entry));

    let resolved = entries
        .iter()
        .filter(|e| e.resolution == Resolution::Contact)
        .count();
    log::info!(
        "{} contigs in {} bins, {} resolved by contacts, {} unassigned",
        entries.len(),
        order.len(),
        resolved,
        entries.iter().filter(|e| e.bin.is_none()).count()
    );

    Consensus { entries, order }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::contig::Contig;

    fn table() -> ContigTable {
        ContigTable::from_ordered(vec![
            Contig::new("c1", 4000),
            Contig::new("c2", 3000),
            Contig::new("c3", 2000),
            Contig::new("c4", 1000),
        ])
        .unwrap()
    }

    fn part(source: &str, rows: &[(&str, &str)]) -> BinAssignment {
        let mut p = BinAssignment::new(source);
        for (c, b) in rows {
            p.insert(c, if *b == "-" { None } else { Some(*b) });
        }
        p
    }

    fn scenario_matrix() -> ContactMatrix {
        ContactMatrix::from_triplets(4, vec![(0, 1, 5.0), (1, 2, 1.0), (2, 3, 9.0)]).unwrap()
    }

    fn bin_of<'a>(c: &'a Consensus, contig: &str) -> Option<&'a str> {
        c.entries
            .iter()
            .find(|e| e.contig == contig)
            .and_then(|e| e.bin.as_deref())
    }

    #[test]
    fn majority_scenario() {
        let a = part("a", &[("c1", "bin1"), ("c2", "bin1"), ("c3", "bin2"), ("c4", "bin2")]);
        let b = part("b", &[("c1", "bin1"), ("c2", "bin2"), ("c3", "bin2"), ("c4", "bin2")]);
        let c = a.clone();

        let res = integrate([&a, &b, &c], &table(), &scenario_matrix(), &LargerBinThenId);
        assert_eq!(bin_of(&res, "c1"), Some("bin1"));
        assert_eq!(bin_of(&res, "c2"), Some("bin1"));
        assert_eq!(bin_of(&res, "c3"), Some("bin2"));
        assert_eq!(bin_of(&res, "c4"), Some("bin2"));

        let c2 = res.entries.iter().find(|e| e.contig == "c2").unwrap();
        assert_eq!(c2.agreement, 2);
        assert_eq!(c2.resolution, Resolution::Majority);

        // equal sizes, ordered by id
        assert_eq!(res.order[0].bin, "bin1");
        assert_eq!(res.order[0].contigs, vec!["c1", "c2"]);
        let ids: Vec<&str> = res.entries.iter().map(|e| e.contig.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn contact_resolution() {
        // c2 is claimed by three different bins
        let a = part("a", &[("c1", "x"), ("c2", "x")]);
        let b = part("b", &[("c2", "y"), ("c3", "y"), ("c4", "y")]);
        let c = part("c", &[("c1", "x"), ("c2", "z"), ("c3", "y")]);

        let res = integrate([&a, &b, &c], &table(), &scenario_matrix(), &LargerBinThenId);
        let c2 = res.entries.iter().find(|e| e.contig == "c2").unwrap();
        assert_eq!(c2.bin.as_deref(), Some("x"));
        assert_eq!(c2.resolution, Resolution::Contact);
        assert_eq!(c2.support, 5.0);
        assert_eq!(c2.agreement, 1);

        // c4 has a single vote and no majority; its contact to c3 decides
        let c4 = res.entries.iter().find(|e| e.contig == "c4").unwrap();
        assert_eq!(c4.bin.as_deref(), Some("y"));
        assert_eq!(c4.support, 9.0);
    }

    #[test]
    fn zero_support_is_unassigned() {
        let a = part("a", &[("c1", "x"), ("c4", "x"), ("ghost", "x")]);
        let b = part("b", &[("c4", "y"), ("ghost", "-")]);
        let c = part("c", &[("c1", "x"), ("c2", "-")]);

        let res = integrate([&a, &b, &c], &table(), &scenario_matrix(), &LargerBinThenId);
        assert_eq!(bin_of(&res, "c4"), None);
        assert_eq!(bin_of(&res, "ghost"), None);
        assert_eq!(bin_of(&res, "c2"), None);
        // unassigned contigs come last, canonical order then id
        let tail: Vec<&str> = res.entries[1..].iter().map(|e| e.contig.as_str()).collect();
        assert_eq!(tail, vec!["c2", "c4", "ghost"]);
        // bin y never keeps a member
        assert_eq!(res.order.len(), 1);
    }

    #[test]
    fn tie_break_policies() {
        // c2 has weight 2 towards both bins; bin "b" has two majority members
        let m = ContactMatrix::from_triplets(4, vec![(1, 0, 2.0), (1, 2, 1.0), (1, 3, 1.0)])
            .unwrap();
        let s1 = part("s1", &[("c1", "a"), ("c2", "a"), ("c3", "b"), ("c4", "b")]);
        let s2 = part("s2", &[("c1", "a"), ("c2", "b"), ("c3", "b"), ("c4", "b")]);
        let s3 = part("s3", &[("c3", "b"), ("c4", "b")]);

        let res = integrate([&s1, &s2, &s3], &table(), &m, &LargerBinThenId);
        assert_eq!(bin_of(&res, "c2"), Some("b"));

        let res = integrate([&s1, &s2, &s3], &table(), &m, &IdOnly);
        assert_eq!(bin_of(&res, "c2"), Some("a"));
    }

    #[test]
    fn deterministic_and_writable() {
        let a = part("a", &[("c1", "x"), ("c2", "x"), ("c3", "y")]);
        let b = part("b", &[("c2", "y"), ("c3", "y"), ("c4", "y")]);
        let c = part("c", &[("c1", "z"), ("c4", "x")]);

        let first = integrate([&a, &b, &c], &table(), &scenario_matrix(), &LargerBinThenId);
        for _ in 0..5 {
            let again = integrate([&a, &b, &c], &table(), &scenario_matrix(), &LargerBinThenId);
            assert_eq!(first, again);
        }

        let mut out = vec![];
        first.write_order(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("#bin\tsize\tcontigs\n"));
        assert_eq!(first.to_assignment().len(), first.entries.len());
    }
}
