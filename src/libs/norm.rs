//! Contact matrix normalization.
//!
//! Every method maps the raw matrix and the contig features to a new matrix
//! without adding cells: cells can only be rescaled or dropped.
//!
//! Zero guards:
//!
//! * `length` - lengths are clamped to at least 1
//! * `site` and `bin3c` - one pseudo-site is added to every contig
//! * `coverage` and `normcc` - cells touching a contig with zero or missing
//!   coverage are dropped
//!
//! A pattern without an exact symmetric balance (a hub contig whose leaves
//! touch nothing else, say) drives the `bin3c` scalings towards 0 and
//! infinity. The iteration stops at the last scaling inside
//! `[1 / SCALE_BOUND, SCALE_BOUND]`, so every cell stays finite and positive.

use crate::libs::contig::ContigTable;
use crate::libs::error::HicError;
use crate::libs::matrix::ContactMatrix;
use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Raw,
    Length,
    Site,
    Coverage,
    NormCc,
    Bin3c,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Raw,
        Method::Length,
        Method::Site,
        Method::Coverage,
        Method::NormCc,
        Method::Bin3c,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Raw => "raw",
            Method::Length => "length",
            Method::Site => "site",
            Method::Coverage => "coverage",
            Method::NormCc => "normcc",
            Method::Bin3c => "bin3c",
        }
    }

    pub fn requires_coverage(&self) -> bool {
        matches!(self, Method::Coverage | Method::NormCc)
    }
}

impl FromStr for Method {
    type Err = HicError;

    /// ```
    /// use hicbin::libs::norm::Method;
    /// assert_eq!("NormCC".parse::<Method>().unwrap(), Method::NormCc);
    /// assert!("hiczin".parse::<Method>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| HicError::UnknownMethod {
                name: s.to_string(),
                expected: Method::ALL
                    .iter()
                    .map(|m| m.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormOptions {
    /// NormCC drops cells below this quantile of the normalized weights
    pub thres: f64,
    /// Sinkhorn-Knopp iteration cap
    pub max_iter: usize,
    /// Sinkhorn-Knopp tolerance on the row sums
    pub tol: f64,
    /// Ridge added to the NormCC normal equations
    pub ridge: f64,
}

impl Default for NormOptions {
    fn default() -> Self {
        Self {
            thres: 0.05,
            max_iter: 1000,
            tol: 1e-6,
            ridge: 1e-6,
        }
    }
}

/// Applies `method` to a raw matrix indexed by `table`.
pub fn normalize(
    method: Method,
    table: &ContigTable,
    raw: &ContactMatrix,
    opts: &NormOptions,
) -> Result<ContactMatrix, HicError> {
    if table.len() != raw.dim() {
        return Err(HicError::InvalidInput(format!(
            "{} contigs for a matrix of dimension {}",
            table.len(),
            raw.dim()
        )));
    }
    if method.requires_coverage() && !table.has_coverage() {
        return Err(HicError::MissingCoverage(method.name().to_string()));
    }

    let normalized = match method {
        Method::Raw => raw.clone(),
        Method::Length => by_length(table, raw),
        Method::Site => by_sites(table, raw),
        Method::Coverage => by_coverage(table, raw),
        Method::NormCc => normcc(table, raw, opts)?,
        Method::Bin3c => bin3c(table, raw, opts),
    };

    log::info!(
        "{}: {} of {} cells kept, total weight {:.4}",
        method,
        normalized.nnz(),
        raw.nnz(),
        normalized.total()
    );
    Ok(normalized)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn by_length(table: &ContigTable, raw: &ContactMatrix) -> ContactMatrix {
    let lengths: Vec<f64> = table.iter().map(|c| c.length.max(1) as f64).collect();
    let scale = mean(&lengths).powi(2);
    raw.map_entries(|i, j, w| w * scale / (lengths[i] * lengths[j]))
}

fn site_features(table: &ContigTable) -> Vec<f64> {
    table.iter().map(|c| c.sites as f64 + 1.0).collect()
}

fn by_sites(table: &ContigTable, raw: &ContactMatrix) -> ContactMatrix {
    let sites = site_features(table);
    let scale = mean(&sites).powi(2);
    raw.map_entries(|i, j, w| w * scale / (sites[i] * sites[j]))
}

// Positive coverage only; zero and missing become `None`
fn positive_coverage(table: &ContigTable) -> Vec<Option<f64>> {
    table
        .iter()
        .map(|c| c.coverage.filter(|v| *v > 0.0))
        .collect()
}

fn by_coverage(table: &ContigTable, raw: &ContactMatrix) -> ContactMatrix {
    let coverage = positive_coverage(table);
    let present: Vec<f64> = coverage.iter().flatten().copied().collect();
    let scale = mean(&present).powi(2);
    raw.map_entries(|i, j, w| match (coverage[i], coverage[j]) {
        (Some(ci), Some(cj)) => w * scale / (ci * cj),
        _ => 0.0,
    })
}

/// Fits `ln w = b0 + b1 x1 + b2 x2 + b3 x3` over the cells whose contigs
/// all have coverage and divides the fitted feature effect out of each cell.
fn normcc(
    table: &ContigTable,
    raw: &ContactMatrix,
    opts: &NormOptions,
) -> Result<ContactMatrix, HicError> {
    let coverage = positive_coverage(table);
    let sites = site_features(table);
    let lengths: Vec<f64> = table.iter().map(|c| c.length.max(1) as f64).collect();

    let features = |i: usize, j: usize| -> Option<Vector4<f64>> {
        let (ci, cj) = (coverage[i]?, coverage[j]?);
        Some(Vector4::new(
            1.0,
            (sites[i] * sites[j]).ln(),
            (lengths[i] * lengths[j]).ln(),
            (ci * cj).ln(),
        ))
    };

    // Sequential accumulation keeps the fit bit-for-bit reproducible
    let mut xtx = Matrix4::<f64>::zeros();
    let mut xty = Vector4::<f64>::zeros();
    let mut observations = 0usize;
    for (i, j, w) in raw.entries() {
        if let Some(x) = features(i, j) {
            xtx += x * x.transpose();
            xty += x * w.ln();
            observations += 1;
        }
    }
    if observations == 0 {
        return Ok(ContactMatrix::empty(raw.dim()));
    }

    xtx += Matrix4::identity() * opts.ridge;
    let beta = xtx
        .cholesky()
        .ok_or_else(|| HicError::Model("NormCC normal equations are not positive definite".into()))?
        .solve(&xty);
    log::debug!(
        "NormCC coefficients: {:.4} {:.4} {:.4} {:.4}",
        beta[0],
        beta[1],
        beta[2],
        beta[3]
    );

    let fitted = raw.map_entries(|i, j, w| match features(i, j) {
        Some(x) => w / (beta[1] * x[1] + beta[2] * x[2] + beta[3] * x[3]).exp(),
        None => 0.0,
    });

    let mut values: Vec<f64> = fitted.entries().map(|(_, _, w)| w).collect();
    if values.is_empty() {
        return Ok(fitted);
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let q = opts.thres.clamp(0.0, 1.0);
    let cutoff = values[((values.len() - 1) as f64 * q).floor() as usize];

    Ok(fitted.map_entries(|_, _, w| if w < cutoff { 0.0 } else { w }))
}

/// Largest Sinkhorn-Knopp scaling, and inverse of the smallest
pub const SCALE_BOUND: f64 = 1e100;

/// Site normalization followed by symmetric Sinkhorn-Knopp balancing,
/// rescaled to the total weight of the site-normalized matrix.
fn bin3c(table: &ContigTable, raw: &ContactMatrix, opts: &NormOptions) -> ContactMatrix {
    let m = by_sites(table, raw);
    let n = m.dim();
    if m.is_empty() {
        return m;
    }

    let active: Vec<bool> = (0..n).map(|i| m.row(i).next().is_some()).collect();
    let mut x = vec![1.0f64; n];
    let mut converged = false;
    let mut diverged = false;
    let mut iterations = 0;

    while iterations < opts.max_iter {
        iterations += 1;
        let ax: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| m.row(i).map(|(j, w)| w * x[j]).sum())
            .collect();

        let err = (0..n)
            .filter(|&i| active[i])
            .map(|i| (x[i] * ax[i] - 1.0).abs())
            .fold(0.0, f64::max);
        if err < opts.tol {
            converged = true;
            break;
        }

        let next: Vec<f64> = (0..n)
            .map(|i| {
                if active[i] && ax[i] > 0.0 {
                    (x[i] / ax[i]).sqrt()
                } else {
                    x[i]
                }
            })
            .collect();
        let bounded = next
            .iter()
            .all(|&v| v.is_finite() && (1.0 / SCALE_BOUND..=SCALE_BOUND).contains(&v));
        if !bounded {
            diverged = true;
            break;
        }
        x = next;
    }

    if converged {
        log::debug!("Sinkhorn-Knopp converged after {} iterations", iterations);
    } else if diverged {
        log::warn!(
            "Sinkhorn-Knopp scalings diverge after {} iterations, the pattern has no exact balance",
            iterations
        );
    } else {
        log::warn!(
            "Sinkhorn-Knopp did not reach tolerance {} in {} iterations",
            opts.tol,
            opts.max_iter
        );
    }

    let balanced = m.map_entries(|i, j, w| w * x[i] * x[j]);
    let (before, after) = (m.total(), balanced.total());
    if after > 0.0 {
        let factor = before / after;
        balanced.map_entries(|_, _, w| w * factor)
    } else {
        balanced
    }
}
