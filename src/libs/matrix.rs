//! Sparse symmetric contig contact matrix.
//!
//! Weights live in a `nalgebra_sparse` CSR matrix that stores both
//! triangles, so a row scan yields every neighbour of a contig. The diagonal is never stored
//! and every stored weight is finite and strictly positive.
//!
//! A matrix is only meaningful together with the [`ContigTable`] that fixes
//! its index; [`Artifact`] keeps the two together on disk.

use crate::libs::contig::{Contig, ContigTable};
use crate::libs::error::HicError;
use anyhow::Context;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::io::{BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ContactMatrix {
    csr: CsrMatrix<f64>,
}

impl Default for ContactMatrix {
    fn default() -> Self {
        Self::empty(0)
    }
}

impl ContactMatrix {
    pub fn empty(n: usize) -> Self {
        Self {
            csr: CsrMatrix::zeros(n, n),
        }
    }

    /// Builds a matrix from unordered triplets.
    ///
    /// `(i, j)` and `(j, i)` address the same cell and repeated cells are
    /// summed. Diagonal and zero weights are dropped.
    ///
    /// ```
    /// use hicbin::libs::matrix::ContactMatrix;
    /// let m = ContactMatrix::from_triplets(3, vec![(0, 1, 2.0), (1, 0, 1.0), (2, 2, 5.0)]).unwrap();
    /// assert_eq!(m.nnz(), 1);
    /// assert_eq!(m.weight(1, 0), 3.0);
    /// assert_eq!(m.weight(2, 2), 0.0);
    /// ```
    pub fn from_triplets<I>(n: usize, triplets: I) -> Result<Self, HicError>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut rows = vec![];
        let mut cols = vec![];
        let mut vals = vec![];
        for (i, j, w) in triplets {
            if i >= n || j >= n {
                return Err(HicError::InvalidInput(format!(
                    "cell ({}, {}) outside a {}x{} matrix",
                    i, j, n, n
                )));
            }
            if !w.is_finite() || w < 0.0 {
                return Err(HicError::InvalidInput(format!(
                    "weight {} at ({}, {}) is not a finite non-negative number",
                    w, i, j
                )));
            }
            if i == j || w == 0.0 {
                continue;
            }
            rows.extend([i, j]);
            cols.extend([j, i]);
            vals.extend([w, w]);
        }

        let coo = CooMatrix::try_from_triplets(n, n, rows, cols, vals)
            .map_err(|e| HicError::InvalidInput(e.to_string()))?;
        // the conversion sorts every row and sums repeated cells
        Ok(Self {
            csr: CsrMatrix::from(&coo),
        })
    }

    // `upper` is sorted, unique, strictly above the diagonal and positive
    fn from_sorted_upper(n: usize, upper: &[(usize, usize, f64)]) -> Result<Self, HicError> {
        let mut degree = vec![0usize; n];
        for &(i, j, _) in upper {
            degree[i] += 1;
            degree[j] += 1;
        }

        let mut row_offsets = Vec::with_capacity(n + 1);
        let mut offset = 0usize;
        row_offsets.push(offset);
        for d in &degree {
            offset += d;
            row_offsets.push(offset);
        }

        // Rows fill in ascending column order: lower-triangle cells of row r
        // come from earlier source rows than its upper-triangle cells.
        let mut col_indices = vec![0usize; offset];
        let mut values = vec![0f64; offset];
        let mut cursor: Vec<usize> = row_offsets[..n].to_vec();
        for &(i, j, w) in upper {
            col_indices[cursor[i]] = j;
            values[cursor[i]] = w;
            cursor[i] += 1;
            col_indices[cursor[j]] = i;
            values[cursor[j]] = w;
            cursor[j] += 1;
        }

        let csr = CsrMatrix::try_from_csr_data(n, n, row_offsets, col_indices, values)
            .map_err(|e| HicError::InvalidInput(e.to_string()))?;
        Ok(Self { csr })
    }

    /// The underlying compressed-row storage, holding both triangles
    pub fn csr(&self) -> &CsrMatrix<f64> {
        &self.csr
    }

    /// Number of rows and columns
    pub fn dim(&self) -> usize {
        self.csr.nrows()
    }

    /// Number of stored unordered contig pairs
    pub fn nnz(&self) -> usize {
        self.csr.nnz() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.csr.nnz() == 0
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.csr
            .get_entry(i, j)
            .map(|entry| entry.into_value())
            .unwrap_or(0.0)
    }

    /// Neighbours of row `i` in ascending column order
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let offsets = self.csr.row_offsets();
        let (start, end) = (offsets[i], offsets[i + 1]);
        self.csr.col_indices()[start..end]
            .iter()
            .zip(&self.csr.values()[start..end])
            .map(|(&j, &w)| (j, w))
    }

    pub fn row_sum(&self, i: usize) -> f64 {
        self.row(i).map(|(_, w)| w).sum()
    }

    /// Upper-triangle cells `(i, j, w)` with `i < j`, in row-major order
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.csr
            .triplet_iter()
            .filter(|(i, j, _)| j > i)
            .map(|(i, j, &w)| (i, j, w))
    }

    /// Sum of all unordered cells
    pub fn total(&self) -> f64 {
        self.entries().map(|(_, _, w)| w).sum()
    }

    /// Applies `f` to every stored cell, row by row in parallel.
    ///
    /// Results that are zero, negative or not finite are dropped, so the
    /// pattern of the output is always a subset of the input pattern.
    pub fn map_entries<F>(&self, f: F) -> Self
    where
        F: Fn(usize, usize, f64) -> f64 + Sync,
    {
        let rows: Vec<Vec<(usize, usize, f64)>> = (0..self.dim())
            .into_par_iter()
            .map(|i| {
                self.row(i)
                    .filter(|(j, _)| *j > i)
                    .filter_map(|(j, w)| {
                        let v = f(i, j, w);
                        if v.is_finite() && v > 0.0 {
                            Some((i, j, v))
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect();

        let mut coo = CooMatrix::new(self.dim(), self.dim());
        for (i, j, v) in rows.into_iter().flatten() {
            coo.push(i, j, v);
            coo.push(j, i, v);
        }
        Self {
            csr: CsrMatrix::from(&coo),
        }
    }

    /// Moves rows and columns to new positions; `None` drops the contig and
    /// all of its cells.
    pub fn reindex(&self, mapping: &[Option<usize>], new_n: usize) -> Result<Self, HicError> {
        if mapping.len() != self.dim() {
            return Err(HicError::InvalidInput(format!(
                "index mapping has {} slots for a matrix of dimension {}",
                mapping.len(),
                self.dim()
            )));
        }
        let triplets = self.entries().filter_map(|(i, j, w)| match (mapping[i], mapping[j]) {
            (Some(a), Some(b)) => Some((a, b, w)),
            _ => None,
        });
        Self::from_triplets(new_n, triplets)
    }
}

pub const CONTIGS_FILE: &str = "contigs.tsv";
pub const CONTACTS_FILE: &str = "contacts.tsv";

/// A contact matrix and the contig table that indexes it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    pub table: ContigTable,
    pub matrix: ContactMatrix,
}

impl Artifact {
    pub fn new(table: ContigTable, matrix: ContactMatrix) -> Result<Self, HicError> {
        if table.len() != matrix.dim() {
            return Err(HicError::InvalidInput(format!(
                "{} contigs for a matrix of dimension {}",
                table.len(),
                matrix.dim()
            )));
        }
        Ok(Self { table, matrix })
    }

    /// Loads `contigs.tsv` and `contacts.tsv` from a directory.
    pub fn load<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let bad = |path: &Path, message: String| HicError::Artifact {
            path: path.display().to_string(),
            message,
        };

        let contigs_path = dir.join(CONTIGS_FILE);
        let reader = crate::reader(&contigs_path.to_string_lossy())?;
        let mut contigs = vec![];
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if crate::libs::io::is_comment(&line) {
                continue;
            }
            let contig = parse_contig_line(&line, contigs.len())
                .map_err(|msg| bad(&contigs_path, format!("line {}: {}", line_no + 1, msg)))?;
            contigs.push(contig);
        }
        let table = ContigTable::from_ordered(contigs)
            .map_err(|e| bad(&contigs_path, e.to_string()))?;
        let n = table.len();

        let contacts_path = dir.join(CONTACTS_FILE);
        let reader = crate::reader(&contacts_path.to_string_lossy())?;
        let mut upper: Vec<(usize, usize, f64)> = vec![];
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if crate::libs::io::is_comment(&line) {
                continue;
            }
            let cell = parse_contact_line(&line, n)
                .map_err(|msg| bad(&contacts_path, format!("line {}: {}", line_no + 1, msg)))?;
            if let Some(last) = upper.last() {
                if (last.0, last.1) >= (cell.0, cell.1) {
                    return Err(bad(
                        &contacts_path,
                        format!("line {}: cells are not sorted and unique", line_no + 1),
                    )
                    .into());
                }
            }
            upper.push(cell);
        }

        let matrix = ContactMatrix::from_sorted_upper(n, &upper)
            .map_err(|e| bad(&contacts_path, e.to_string()))?;
        log::debug!(
            "Loaded {} contigs and {} contacts from {}",
            n,
            matrix.nnz(),
            dir.display()
        );

        Ok(Self { table, matrix })
    }

    /// Writes both files into a staging directory next to `dir`, then moves
    /// it into place; `dir` is replaced only after everything is written.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("could not create {}", parent.display()))?;

        let staging = tempfile::Builder::new()
            .prefix(".hicbin-")
            .tempdir_in(&parent)?;

        let mut writer =
            crate::writer(&staging.path().join(CONTIGS_FILE).to_string_lossy())?;
        writeln!(writer, "#index\tid\tlength\tsites\tsignal\tcoverage")?;
        for (i, c) in self.table.iter().enumerate() {
            let coverage = c
                .coverage
                .map(|v| v.to_string())
                .unwrap_or_else(|| "NA".to_string());
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}",
                i, c.id, c.length, c.sites, c.signal, coverage
            )?;
        }
        writer.flush()?;
        drop(writer);

        let mut writer =
            crate::writer(&staging.path().join(CONTACTS_FILE).to_string_lossy())?;
        writeln!(writer, "#i\tj\tweight")?;
        for (i, j, w) in self.matrix.entries() {
            writeln!(writer, "{}\t{}\t{}", i, j, w)?;
        }
        writer.flush()?;
        drop(writer);

        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("could not replace {}", dir.display()))?;
        }
        std::fs::rename(staging.path(), dir)
            .with_context(|| format!("could not move the artifact to {}", dir.display()))?;

        log::info!(
            "Wrote {} contigs and {} contacts to {}",
            self.table.len(),
            self.matrix.nnz(),
            dir.display()
        );
        Ok(())
    }
}

fn parse_contig_line(line: &str, expected: usize) -> Result<Contig, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(format!("expected 6 columns: {}", line));
    }

    let index: usize = fields[0]
        .parse()
        .map_err(|_| format!("invalid index {}", fields[0]))?;
    if index != expected {
        return Err(format!("index {} out of order, expected {}", index, expected));
    }
    let length: u64 = fields[2]
        .parse()
        .map_err(|_| format!("invalid length {}", fields[2]))?;
    if length == 0 {
        return Err(format!("contig {} has zero length", fields[1]));
    }
    let sites: u32 = fields[3]
        .parse()
        .map_err(|_| format!("invalid site count {}", fields[3]))?;
    let signal: u64 = fields[4]
        .parse()
        .map_err(|_| format!("invalid signal {}", fields[4]))?;
    let coverage = match fields[5] {
        "NA" | "" => None,
        v => match v.parse::<f64>() {
            Ok(c) if c.is_finite() && c >= 0.0 => Some(c),
            _ => return Err(format!("invalid coverage {}", v)),
        },
    };

    Ok(Contig {
        id: fields[1].to_string(),
        length,
        sites,
        signal,
        coverage,
    })
}

fn parse_contact_line(line: &str, n: usize) -> Result<(usize, usize, f64), String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return Err(format!("expected 3 columns: {}", line));
    }
    let i: usize = fields[0]
        .parse()
        .map_err(|_| format!("invalid row {}", fields[0]))?;
    let j: usize = fields[1]
        .parse()
        .map_err(|_| format!("invalid column {}", fields[1]))?;
    let w: f64 = fields[2]
        .parse()
        .map_err(|_| format!("invalid weight {}", fields[2]))?;

    if i >= j || j >= n {
        return Err(format!("cell ({}, {}) is not in the upper triangle of {} contigs", i, j, n));
    }
    if !w.is_finite() || w <= 0.0 {
        return Err(format!("weight {} is not finite and positive", w));
    }
    Ok((i, j, w))
}
