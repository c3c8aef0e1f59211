//! Host-MGE association.
//!
//! Every contig gets one role: member of a host bin, member of an MGE
//! quality tier, or neither. A matrix cell linking a host contig to an MGE
//! contig is one host-MGE contact of that MGE's tier. Cells between two
//! contigs of the same kind are ignored.

use crate::libs::bins::BinAssignment;
use crate::libs::contig::ContigTable;
use crate::libs::error::HicError;
use crate::libs::matrix::ContactMatrix;
use fxhash::FxHashMap;
use rayon::prelude::*;
use std::io::{BufRead, Write};

/// MGE quality tiers, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tiers {
    names: Vec<String>,
    contigs: FxHashMap<String, usize>,
}

impl Tiers {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn tier_of(&self, contig: &str) -> Option<usize> {
        self.contigs.get(contig).copied()
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn insert(&mut self, contig: &str, tier: &str) {
        let idx = match self.names.iter().position(|n| n == tier) {
            Some(i) => i,
            None => {
                self.names.push(tier.to_string());
                self.names.len() - 1
            }
        };
        if let Some(prev) = self.contigs.insert(contig.to_string(), idx) {
            if prev != idx {
                log::warn!("MGE {} listed in two tiers, keeping {}", contig, tier);
            }
        }
    }
}

/// Reads `contig<TAB>tier` lines; `#` lines and a `contig_id` header are skipped.
///
/// ```
/// use hicbin::libs::assoc::read_tiers;
/// let text = "contig_id\tcheckv_quality\nv1\tHigh-quality\nv2\tMedium-quality\nv3\tHigh-quality\n";
/// let tiers = read_tiers(text.as_bytes()).unwrap();
/// assert_eq!(tiers.names(), &["High-quality".to_string(), "Medium-quality".to_string()]);
/// assert_eq!(tiers.tier_of("v3"), Some(0));
/// ```
pub fn read_tiers<R: BufRead>(reader: R) -> anyhow::Result<Tiers> {
    let mut tiers = Tiers::default();
    for line in reader.lines() {
        let line = line?;
        if crate::libs::io::is_comment(&line) {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(|f| f.trim()).collect();
        if fields[0] == "contig_id" {
            continue;
        }
        if fields.len() < 2 || fields[0].is_empty() || fields[1].is_empty() {
            return Err(HicError::Parse(format!("tier line without two columns: {}", line)).into());
        }
        tiers.insert(fields[0], fields[1]);
    }
    Ok(tiers)
}

/// Reads the host bins, e.g. the assigned rows of a consensus table.
pub fn read_host_bins<R: BufRead>(reader: R) -> anyhow::Result<BinAssignment> {
    BinAssignment::from_tsv("hosts", reader)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Index into the sorted host bin ids
    Host(usize),
    /// Index into the tier names
    Mge(usize),
    Unclassified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRecord {
    pub mge: String,
    pub tier: String,
    pub host_bin: String,
    /// Summed weight between the MGE and its best host bin
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSummary {
    pub tier: String,
    /// Tier members present in the contig table
    pub mges: usize,
    /// Host-MGE cells
    pub contacts: u64,
    /// Members with a best host
    pub attributed: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    pub tiers: Vec<TierSummary>,
    /// In canonical contig order
    pub records: Vec<AssociationRecord>,
}

impl Association {
    pub fn write_summary<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writeln!(writer, "#tier\tmge_contigs\tcontacts\tattributed")?;
        for t in &self.tiers {
            writeln!(writer, "{}\t{}\t{}\t{}", t.tier, t.mges, t.contacts, t.attributed)?;
        }
        Ok(())
    }

    pub fn write_records<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writeln!(writer, "#mge\ttier\thost_bin\tweight")?;
        for r in &self.records {
            writeln!(writer, "{}\t{}\t{}\t{:.4}", r.mge, r.tier, r.host_bin, r.weight)?;
        }
        Ok(())
    }
}

/// Role of every contig of the table; MGE membership wins over a host bin.
pub fn roles(table: &ContigTable, hosts: &BinAssignment, tiers: &Tiers) -> (Vec<Role>, Vec<String>) {
    let mut bin_ids: Vec<String> = hosts
        .iter()
        .filter_map(|(_, b)| b.map(|b| b.to_string()))
        .collect();
    bin_ids.sort_unstable();
    bin_ids.dedup();

    let mut overlap = 0usize;
    let roles = table
        .iter()
        .map(|c| {
            let host = hosts.get(&c.id).flatten();
            match (tiers.tier_of(&c.id), host) {
                (Some(t), host) => {
                    if host.is_some() {
                        overlap += 1;
                    }
                    Role::Mge(t)
                }
                (None, Some(b)) => match bin_ids.binary_search_by(|x| x.as_str().cmp(b)) {
                    Ok(idx) => Role::Host(idx),
                    Err(_) => Role::Unclassified,
                },
                (None, None) => Role::Unclassified,
            }
        })
        .collect();

    if overlap > 0 {
        log::warn!("{} MGE contigs are also in host bins, treated as MGE", overlap);
    }
    (roles, bin_ids)
}

struct RowHit {
    row: usize,
    tier: usize,
    contacts: u64,
    best: Option<(usize, f64)>,
}

/// Counts host-MGE cells per tier and attributes every MGE to a host bin.
///
/// Rows of MGE contigs are scanned in parallel; each host-MGE cell is
/// visited exactly once, from its MGE end.
pub fn score(
    table: &ContigTable,
    matrix: &ContactMatrix,
    hosts: &BinAssignment,
    tiers: &Tiers,
) -> Result<Association, HicError> {
    if table.len() != matrix.dim() {
        return Err(HicError::InvalidInput(format!(
            "{} contigs for a matrix of dimension {}",
            table.len(),
            matrix.dim()
        )));
    }
    let (roles, bin_ids) = roles(table, hosts, tiers);

    let hits: Vec<RowHit> = (0..matrix.dim())
        .into_par_iter()
        .filter_map(|row| {
            let tier = match roles[row] {
                Role::Mge(t) => t,
                _ => return None,
            };
            let mut contacts = 0u64;
            let mut per_bin: FxHashMap<usize, f64> = FxHashMap::default();
            for (j, w) in matrix.row(row) {
                if let Role::Host(b) = roles[j] {
                    contacts += 1;
                    *per_bin.entry(b).or_insert(0.0) += w;
                }
            }
            let best = per_bin
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
            Some(RowHit {
                row,
                tier,
                contacts,
                best,
            })
        })
        .collect();

    let mut summaries: Vec<TierSummary> = tiers
        .names()
        .iter()
        .map(|name| TierSummary {
            tier: name.clone(),
            mges: 0,
            contacts: 0,
            attributed: 0,
        })
        .collect();

    let mut records = vec![];
    for hit in hits {
        let summary = &mut summaries[hit.tier];
        summary.mges += 1;
        summary.contacts += hit.contacts;
        if let Some((bin, weight)) = hit.best {
            summary.attributed += 1;
            records.push(AssociationRecord {
                mge: table.contigs()[hit.row].id.clone(),
                tier: summary.tier.clone(),
                host_bin: bin_ids[bin].clone(),
                weight,
            });
        }
    }

    for s in &summaries {
        log::info!(
            "{}: {} MGE contigs, {} host contacts, {} attributed",
            s.tier,
            s.mges,
            s.contacts,
            s.attributed
        );
    }

    Ok(Association {
        tiers: summaries,
        records,
    })
}
