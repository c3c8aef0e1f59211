//! Restriction-site model.
//!
//! Hi-C junctions are anchored at restriction sites, so the number of sites
//! on a contig bounds how many ligation products it can take part in. The
//! count is one of the features the normalizers divide out.

use crate::libs::error::HicError;
use indexmap::IndexMap;
use lazy_static::lazy_static;

lazy_static! {
    /// Recognition motifs, IUPAC `N` matches any base
    static ref ENZYMES: IndexMap<&'static str, Vec<&'static str>> = {
        let mut m = IndexMap::new();
        m.insert("Sau3AI", vec!["GATC"]);
        m.insert("MboI", vec!["GATC"]);
        m.insert("DpnII", vec!["GATC"]);
        m.insert("MluCI", vec!["AATT"]);
        m.insert("MseI", vec!["TTAA"]);
        m.insert("AluI", vec!["AGCT"]);
        m.insert("HinfI", vec!["GANTC"]);
        m.insert("DdeI", vec!["CTNAG"]);
        m.insert("HindIII", vec!["AAGCTT"]);
        m.insert("NcoI", vec!["CCATGG"]);
        m.insert("Arima", vec!["GATC", "GANTC"]);
        m
    };
}

/// Names of the built-in enzymes
pub fn known_enzymes() -> Vec<&'static str> {
    ENZYMES.keys().copied().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionModel {
    enzymes: Vec<String>,
    motifs: Vec<Vec<u8>>,
}

impl RestrictionModel {
    /// Builds the model from enzyme names, matched case-insensitively.
    ///
    /// ```
    /// use hicbin::libs::enzyme::RestrictionModel;
    /// let model = RestrictionModel::from_names(&["Sau3AI", "mboi", "MluCI"]).unwrap();
    /// assert_eq!(model.motifs().len(), 2);
    /// assert!(RestrictionModel::from_names(&["EcoXYZ"]).is_err());
    /// ```
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, HicError> {
        let mut enzymes = vec![];
        let mut motifs: Vec<Vec<u8>> = vec![];

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let (key, sites) = ENZYMES
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .ok_or_else(|| HicError::UnknownEnzyme(name.to_string()))?;
            enzymes.push(key.to_string());
            for site in sites {
                let site = site.as_bytes().to_vec();
                if !motifs.contains(&site) {
                    motifs.push(site);
                }
            }
        }

        Ok(Self { enzymes, motifs })
    }

    /// Parses a comma separated list such as `Sau3AI,MluCI`
    pub fn from_list(list: &str) -> Result<Self, HicError> {
        let names: Vec<&str> = list.split(',').collect();
        Self::from_names(&names)
    }

    pub fn enzymes(&self) -> &[String] {
        &self.enzymes
    }

    pub fn motifs(&self) -> &[Vec<u8>] {
        &self.motifs
    }

    /// Counts positions where any motif starts; shared positions count once.
    ///
    /// ```
    /// use hicbin::libs::enzyme::RestrictionModel;
    /// let model = RestrictionModel::from_names(&["Arima"]).unwrap();
    /// // GATC at 0, GAATC at 6, gatc at 13
    /// assert_eq!(model.count_sites(b"GATCCCGAATCAAgatc"), 3);
    /// ```
    pub fn count_sites(&self, seq: &[u8]) -> u32 {
        let mut count = 0;
        for i in 0..seq.len() {
            if self.motifs.iter().any(|m| matches_at(seq, i, m)) {
                count += 1;
            }
        }
        count
    }
}

fn matches_at(seq: &[u8], start: usize, motif: &[u8]) -> bool {
    if start + motif.len() > seq.len() {
        return false;
    }
    seq[start..start + motif.len()]
        .iter()
        .zip(motif)
        .all(|(s, m)| *m == b'N' || s.to_ascii_uppercase() == *m)
}
