//! Insert-size mixture model.
//!
//! Template lengths of same-contig pairs mix two populations: shotgun-like
//! pairs with a short, tight insert and chimeric Hi-C ligations spread far
//! wider. A two-component Gaussian mixture fitted by EM separates them. The
//! chimeric share `pi_c` refines the long-range ratio, and the fitted
//! components give the insert cutoff under which a pair looks shotgun-like.

use crate::libs::pairs::ReadPair;
use fxhash::FxHashSet;
use itertools::Itertools;

/// Pairs with a template length at or beyond this are not sampled
pub const MAX_INSERT: u32 = 5000;

/// Lower cutoff bound, and the fallback when the fit is unusable
pub const MIN_CUTOFF: f64 = 100.0;
pub const DEFAULT_CUTOFF: f64 = 500.0;

// Standard normal quantile at 0.95
const Z95: f64 = 1.644_853_626_951_472_2;

/// Insert sizes of pairs on a chosen set of contigs
#[derive(Debug, Clone, Default)]
pub struct InsertSample {
    /// `None` samples every contig
    contigs: Option<FxHashSet<String>>,
    values: Vec<f64>,
}

impl InsertSample {
    /// Restricts sampling to the `top_k` longest contigs, ties broken by name.
    /// `top_k = 0` keeps every contig.
    pub fn new(references: &[(String, usize)], top_k: usize) -> Self {
        let contigs = if top_k == 0 {
            None
        } else {
            Some(
                references
                    .iter()
                    .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
                    .take(top_k)
                    .map(|(name, _)| name.clone())
                    .collect(),
            )
        };
        Self {
            contigs,
            values: vec![],
        }
    }

    pub fn add(&mut self, pair: &ReadPair) {
        if !pair.is_mapped() || !pair.is_intra() {
            return;
        }
        if let Some(contigs) = &self.contigs {
            if !contigs.contains(&pair.a.contig) {
                return;
            }
        }
        let size = pair.insert_size();
        if size > 0 && size < MAX_INSERT {
            self.values.push(size as f64);
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmOptions {
    /// Quantile splitting the initial normal and chimeric groups
    pub init_frac: f64,
    /// Stop once the log-likelihood moves less than this
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for EmOptions {
    fn default() -> Self {
        Self {
            init_frac: 0.8,
            tol: 1e-2,
            max_iter: 100,
        }
    }
}

/// Two Gaussian components: `n` for normal pairs, `c` for chimeric ones
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mixture {
    pub mu_n: f64,
    pub sigma_n: f64,
    pub pi_n: f64,
    pub mu_c: f64,
    pub sigma_c: f64,
    pub pi_c: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Default for Mixture {
    /// Parameters used when no insert size was sampled
    fn default() -> Self {
        Self {
            mu_n: 400.0,
            sigma_n: 100.0,
            pi_n: 0.8,
            mu_c: 2000.0,
            sigma_c: 500.0,
            pi_c: 0.2,
            iterations: 0,
            converged: false,
        }
    }
}

impl Mixture {
    /// Splits the sample at the `frac` quantile: the lower part seeds the
    /// normal component, the upper part the chimeric one.
    pub fn init(data: &[f64], frac: f64) -> Self {
        if data.is_empty() {
            return Self::default();
        }

        let q = quantile(data, frac);
        let mut lower: Vec<f64> = data.iter().copied().filter(|&v| v <= q).collect();
        let mut upper: Vec<f64> = data.iter().copied().filter(|&v| v > q).collect();
        let half = (data.len() / 2).max(1);
        if lower.is_empty() {
            lower = data[..half].to_vec();
        }
        if upper.is_empty() {
            upper = data[half.min(data.len() - 1)..].to_vec();
        }

        let pi_n = lower.len() as f64 / data.len() as f64;
        Self {
            mu_n: mean(&lower),
            sigma_n: sample_sd(&lower).max(1.0),
            pi_n,
            mu_c: mean(&upper),
            sigma_c: sample_sd(&upper).max(1.0),
            pi_c: 1.0 - pi_n,
            iterations: 0,
            converged: false,
        }
    }

    /// Fits the mixture by expectation-maximization.
    ///
    /// ```
    /// use hicbin::libs::insert::{EmOptions, Mixture};
    /// let mut data: Vec<f64> = (0..80).map(|i| 300.0 + (i % 9) as f64 * 10.0).collect();
    /// data.extend((0..20).map(|i| 3000.0 + (i % 7) as f64 * 100.0));
    /// let fit = Mixture::fit(&data, &EmOptions::default());
    /// assert!((fit.pi_c - 0.2).abs() < 1e-3);
    /// assert!(fit.mu_n < 400.0 && fit.mu_c > 3000.0);
    /// ```
    pub fn fit(data: &[f64], opts: &EmOptions) -> Self {
        let mut m = Self::init(data, opts.init_frac);
        if data.is_empty() {
            log::warn!("No insert sizes sampled, keeping default mixture parameters");
            return m;
        }

        let mut log_lik: Option<f64> = None;
        for iter in 0..opts.max_iter {
            // E-step
            let gamma_c: Vec<f64> = data
                .iter()
                .map(|&x| {
                    let wc = m.pi_c * normal_pdf(x, m.mu_c, m.sigma_c);
                    let wn = m.pi_n * normal_pdf(x, m.mu_n, m.sigma_n);
                    wc / (wc + wn).max(1e-10)
                })
                .collect();
            let gamma_n: Vec<f64> = data
                .iter()
                .map(|&x| {
                    let wc = m.pi_c * normal_pdf(x, m.mu_c, m.sigma_c);
                    let wn = m.pi_n * normal_pdf(x, m.mu_n, m.sigma_n);
                    wn / (wc + wn).max(1e-10)
                })
                .collect();

            // M-step
            let sum_c: f64 = gamma_c.iter().sum();
            let sum_n: f64 = gamma_n.iter().sum();
            if sum_c > 0.0 {
                (m.mu_c, m.sigma_c) = weighted_moments(data, &gamma_c, sum_c);
            }
            if sum_n > 0.0 {
                (m.mu_n, m.sigma_n) = weighted_moments(data, &gamma_n, sum_n);
            }
            m.pi_c = sum_c / data.len() as f64;
            m.pi_n = sum_n / data.len() as f64;
            m.iterations = iter + 1;

            let new_log_lik: f64 = data
                .iter()
                .map(|&x| {
                    (m.pi_c * normal_pdf(x, m.mu_c, m.sigma_c)
                        + m.pi_n * normal_pdf(x, m.mu_n, m.sigma_n))
                    .max(f64::MIN_POSITIVE)
                    .ln()
                })
                .sum();
            log::debug!(
                "EM iter {}: logL={:.2}, pi_c={:.2}, mu_c={:.1}, mu_n={:.1}",
                m.iterations,
                new_log_lik,
                m.pi_c,
                m.mu_c,
                m.mu_n
            );

            if let Some(prev) = log_lik {
                if (new_log_lik - prev).abs() < opts.tol {
                    m.converged = true;
                    break;
                }
            }
            log_lik = Some(new_log_lik);
        }

        if m.converged {
            log::info!("Insert-size EM converged after {} iterations", m.iterations);
        } else {
            log::warn!("Insert-size EM stopped after {} iterations", m.iterations);
        }
        m
    }

    /// Insert size below which a pair looks shotgun-like.
    ///
    /// The smaller of the chimeric 5% and the normal 95% quantiles, ignoring a
    /// non-positive one, and never below [`MIN_CUTOFF`].
    pub fn cutoff(&self) -> f64 {
        let th_c = self.mu_c - Z95 * self.sigma_c;
        let th_n = self.mu_n + Z95 * self.sigma_n;
        let cutoff = if th_n <= 0.0 {
            th_c.max(MIN_CUTOFF)
        } else if th_c <= 0.0 {
            th_n.max(MIN_CUTOFF)
        } else {
            th_c.min(th_n).max(MIN_CUTOFF)
        };
        if cutoff.is_finite() {
            cutoff
        } else {
            DEFAULT_CUTOFF
        }
    }

    /// Long-range ratio from the mixture: chimeric intra-contig pairs plus
    /// all inter-contig pairs over every mapped pair. `NaN` without pairs.
    pub fn long_range_ratio(&self, intra: u64, inter: u64) -> f64 {
        let total = intra + inter;
        if total == 0 {
            f64::NAN
        } else {
            (intra as f64 * self.pi_c + inter as f64) / total as f64
        }
    }
}

fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

fn weighted_moments(data: &[f64], weights: &[f64], total: f64) -> (f64, f64) {
    let mu = data.iter().zip(weights).map(|(x, w)| x * w).sum::<f64>() / total;
    let var = data
        .iter()
        .zip(weights)
        .map(|(x, w)| w * (x - mu) * (x - mu))
        .sum::<f64>()
        / total;
    (mu, var.sqrt().max(1e-6))
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Standard deviation with one degree of freedom removed, `NaN` below two values
fn sample_sd(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return f64::NAN;
    }
    let mu = mean(data);
    let ss: f64 = data.iter().map(|x| (x - mu) * (x - mu)).sum();
    (ss / (data.len() - 1) as f64).sqrt()
}

/// Linearly interpolated quantile, `frac` in `[0, 1]`
fn quantile(data: &[f64], frac: f64) -> f64 {
    let sorted: Vec<f64> = data.iter().copied().sorted_by(f64::total_cmp).collect();
    let rank = frac.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
