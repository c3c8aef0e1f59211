//! Contig-to-bin partitions produced by upstream binners.
//!
//! Every binner is reduced to the same contract, a contig -> bin map, read
//! either from its directory of per-bin FASTA files or from a two-column
//! `contig<TAB>bin` table.

use indexmap::IndexMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// One partition; `None` marks a contig the source saw but left unbinned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinAssignment {
    source: String,
    bins: IndexMap<String, Option<String>>,
}

impl BinAssignment {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            bins: IndexMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Adds a contig; a conflicting second label is ignored with a warning.
    pub fn insert(&mut self, contig: &str, bin: Option<&str>) {
        match self.bins.get(contig) {
            Some(existing) if existing.as_deref() != bin => {
                log::warn!(
                    "{}: contig {} is in {:?} and {:?}, keeping the first",
                    self.source,
                    contig,
                    existing,
                    bin
                );
            }
            Some(_) => {}
            None => {
                self.bins
                    .insert(contig.to_string(), bin.map(|b| b.to_string()));
            }
        }
    }

    /// `None` when the contig is absent, `Some(None)` when present but unbinned
    pub fn get(&self, contig: &str) -> Option<Option<&str>> {
        self.bins.get(contig).map(|b| b.as_deref())
    }

    /// Contigs in the order the source listed them
    pub fn contigs(&self) -> impl Iterator<Item = &str> {
        self.bins.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.bins.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Number of distinct bin ids
    pub fn bin_count(&self) -> usize {
        let mut ids: Vec<&str> = self.bins.values().flatten().map(|b| b.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Reads `contig<TAB>bin` lines.
    ///
    /// A bin of `-`, `*` or an empty column leaves the contig unassigned.
    /// Lines starting with `#` are skipped.
    ///
    /// ```
    /// use hicbin::libs::bins::BinAssignment;
    /// let text = "k1\tbin_1\nk2\t-\nk3\tbin_1\n";
    /// let bins = BinAssignment::from_tsv("metacc", text.as_bytes()).unwrap();
    /// assert_eq!(bins.get("k3"), Some(Some("bin_1")));
    /// assert_eq!(bins.get("k2"), Some(None));
    /// assert_eq!(bins.get("k9"), None);
    /// ```
    pub fn from_tsv<R: BufRead>(source: &str, reader: R) -> anyhow::Result<Self> {
        let mut assignment = Self::new(source);
        for line in reader.lines() {
            let line = line?;
            if crate::libs::io::is_comment(&line) {
                continue;
            }
            let mut fields = line.split('\t');
            let contig = fields.next().unwrap_or("").trim();
            if contig.is_empty() {
                return Err(crate::libs::error::HicError::Parse(format!(
                    "bin table of {} without a contig column: {}",
                    source, line
                ))
                .into());
            }
            let bin = match fields.next().map(|b| b.trim()) {
                None | Some("") | Some("-") | Some("*") => None,
                Some(b) => Some(b),
            };
            assignment.insert(contig, bin);
        }
        Ok(assignment)
    }

    /// Reads a directory of per-bin FASTA files.
    ///
    /// Files are taken in name order; the bin id is the file name without
    /// the matched extension, contig ids are the first word of each header.
    pub fn from_fasta_dir(source: &str, dir: &Path, exts: &[&str]) -> anyhow::Result<Self> {
        let mut files: Vec<(String, PathBuf)> = vec![];
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if let Some(bin) = strip_fasta_ext(&file_name, exts) {
                files.push((bin.to_string(), path));
            }
        }
        files.sort();

        let mut assignment = Self::new(source);
        for (bin, path) in &files {
            let reader = crate::reader(&path.to_string_lossy())?;
            for line in reader.lines() {
                let line = line?;
                if let Some(header) = line.strip_prefix('>') {
                    if let Some(contig) = header.split_whitespace().next() {
                        assignment.insert(contig, Some(bin.as_str()));
                    }
                }
            }
        }

        log::info!(
            "{}: {} contigs in {} bins from {}",
            source,
            assignment.len(),
            files.len(),
            dir.display()
        );
        Ok(assignment)
    }
}

fn strip_fasta_ext<'a>(file_name: &'a str, exts: &[&str]) -> Option<&'a str> {
    let base = file_name.strip_suffix(".gz").unwrap_or(file_name);
    exts.iter()
        .find_map(|ext| base.strip_suffix(&format!(".{}", ext)))
        .filter(|stem| !stem.is_empty())
}

/// Anything that yields a contig -> bin partition
pub trait BinSource {
    fn name(&self) -> &str;

    fn load(&self) -> anyhow::Result<BinAssignment>;
}

// A path is either a two-column table or an output directory; in the
// latter case the binner's own subdirectory is used when present.
fn load_path(
    name: &str,
    path: &Path,
    subdir: &str,
    exts: &[&str],
) -> anyhow::Result<BinAssignment> {
    if path.is_dir() {
        let nested = path.join(subdir);
        let dir = if nested.is_dir() { nested } else { path.to_path_buf() };
        BinAssignment::from_fasta_dir(name, &dir, exts)
    } else {
        let reader = crate::reader(&path.to_string_lossy())?;
        let assignment = BinAssignment::from_tsv(name, reader)?;
        log::info!(
            "{}: {} contigs in {} bins from {}",
            name,
            assignment.len(),
            assignment.bin_count(),
            path.display()
        );
        Ok(assignment)
    }
}

/// MetaCC writes `BIN/*.fa`
pub struct MetaCc {
    pub path: PathBuf,
}

impl BinSource for MetaCc {
    fn name(&self) -> &str {
        "metacc"
    }

    fn load(&self) -> anyhow::Result<BinAssignment> {
        load_path(self.name(), &self.path, "BIN", &["fa", "fasta"])
    }
}

/// bin3C writes `fasta/*.fna`
pub struct Bin3c {
    pub path: PathBuf,
}

impl BinSource for Bin3c {
    fn name(&self) -> &str {
        "bin3c"
    }

    fn load(&self) -> anyhow::Result<BinAssignment> {
        load_path(self.name(), &self.path, "fasta", &["fna", "fa"])
    }
}

/// ImputeCC writes `FINAL_BIN/*.fa`
pub struct ImputeCc {
    pub path: PathBuf,
}

impl BinSource for ImputeCc {
    fn name(&self) -> &str {
        "imputecc"
    }

    fn load(&self) -> anyhow::Result<BinAssignment> {
        load_path(self.name(), &self.path, "FINAL_BIN", &["fa"])
    }
}
