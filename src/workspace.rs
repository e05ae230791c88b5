//! In-memory spectra and the per-run store algorithms exchange them through.
//!
//! Algorithms never hand workspaces to each other directly. A property holds a
//! workspace *name* and the [`WorkspaceStore`] of the current execution context
//! resolves it. The histogram helpers at the bottom of this module are simple
//! stand-ins for the real reduction maths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkspaceError {
    #[error("Workspace '{0}' does not exist")]
    NotFound(String),

    #[error("Invalid spectrum: {0}")]
    InvalidSpectrum(String),

    #[error("Spectrum index {index} out of range (workspace has {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid binning: {0}")]
    InvalidBinning(String),

    #[error("Incompatible workspaces: {0}")]
    Incompatible(String),
}

/// One spectrum: x values (bin edges or points), counts and their errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    x: Vec<f64>,
    y: Vec<f64>,
    e: Vec<f64>,
}

impl Spectrum {
    /// Histogram or point data, depending on whether `x` has one more element than `y`.
    pub fn new(x: Vec<f64>, y: Vec<f64>, e: Vec<f64>) -> Result<Self, WorkspaceError> {
        if y.len() != e.len() {
            return Err(WorkspaceError::InvalidSpectrum(format!(
                "{} counts but {} errors",
                y.len(),
                e.len()
            )));
        }
        if x.len() != y.len() && x.len() != y.len() + 1 {
            return Err(WorkspaceError::InvalidSpectrum(format!(
                "{} x values do not match {} counts",
                x.len(),
                y.len()
            )));
        }

        let histogram = x.len() == y.len() + 1;
        let ordered = x.windows(2).all(|w| if histogram { w[0] < w[1] } else { w[0] <= w[1] });
        if !ordered {
            return Err(WorkspaceError::InvalidSpectrum(
                "x values must be increasing".to_string(),
            ));
        }
        Ok(Self { x, y, e })
    }

    /// Like [`new`](Self::new) but insists on bin edges.
    pub fn histogram(x: Vec<f64>, y: Vec<f64>, e: Vec<f64>) -> Result<Self, WorkspaceError> {
        if x.len() != y.len() + 1 {
            return Err(WorkspaceError::InvalidSpectrum(format!(
                "histogram needs {} bin edges, got {}",
                y.len() + 1,
                x.len()
            )));
        }
        Self::new(x, y, e)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn e(&self) -> &[f64] {
        &self.e
    }

    pub fn is_histogram(&self) -> bool {
        self.x.len() == self.y.len() + 1
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// First and last x value, `None` for an empty point spectrum.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        Some((*self.x.first()?, *self.x.last()?))
    }

    /// Counts and errors multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x.clone(),
            y: self.y.iter().map(|v| v * factor).collect(),
            e: self.e.iter().map(|v| v * factor.abs()).collect(),
        }
    }

    /// `offset` added to every count; errors are unchanged.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            x: self.x.clone(),
            y: self.y.iter().map(|v| v + offset).collect(),
            e: self.e.clone(),
        }
    }
}

/// A named collection of spectra sharing one x unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    spectra: Vec<Spectrum>,
    unit: String,
}

impl Workspace {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        Self {
            spectra,
            unit: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn spectrum_count(&self) -> usize {
        self.spectra.len()
    }

    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    pub fn spectrum(&self, index: usize) -> Result<&Spectrum, WorkspaceError> {
        self.spectra.get(index).ok_or(WorkspaceError::IndexOutOfRange {
            index,
            count: self.spectra.len(),
        })
    }

    pub fn x_range(&self, index: usize) -> Result<Option<(f64, f64)>, WorkspaceError> {
        Ok(self.spectrum(index)?.x_range())
    }

    /// Every spectrum of `parts`, in order. The unit is taken from the first part.
    pub fn conjoin<'a>(parts: impl IntoIterator<Item = &'a Workspace>) -> Self {
        let mut unit = None;
        let mut spectra = Vec::new();
        for part in parts {
            unit.get_or_insert_with(|| part.unit.clone());
            spectra.extend(part.spectra.iter().cloned());
        }
        Self {
            spectra,
            unit: unit.unwrap_or_default(),
        }
    }

    /// Applies `f` to every spectrum.
    pub fn map_spectra<F>(&self, f: F) -> Result<Self, WorkspaceError>
    where
        F: FnMut(&Spectrum) -> Result<Spectrum, WorkspaceError>,
    {
        Ok(Self {
            spectra: self.spectra.iter().map(f).collect::<Result<_, _>>()?,
            unit: self.unit.clone(),
        })
    }
}

/// Named workspaces visible to one execution context.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceStore {
    entries: Arc<RwLock<HashMap<String, Arc<Workspace>>>>,
}

impl WorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Workspace>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Workspace>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `workspace` under `name`, replacing any previous entry.
    pub fn add(&self, name: &str, workspace: Workspace) -> Arc<Workspace> {
        let workspace = Arc::new(workspace);
        self.add_shared(name, Arc::clone(&workspace));
        workspace
    }

    pub fn add_shared(&self, name: &str, workspace: Arc<Workspace>) {
        if self.write().insert(name.to_string(), workspace).is_some() {
            log::warn!("Overwriting workspace '{name}'");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<Workspace>, WorkspaceError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotFound(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Workspace>, WorkspaceError> {
        self.write()
            .remove(name)
            .ok_or_else(|| WorkspaceError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Sorted workspace names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// ============================================================================
// Histogram operations
// ============================================================================

/// Upper limit on the number of bins [`rebin_params`] will generate.
pub const MAX_BINS: usize = 10_000_000;

/// Builds bin edges from `x1, dx1, x2, dx2, x3, ...`.
///
/// A negative width means logarithmic steps: each edge is the previous one times
/// `1 + |dx|`. A final bin narrower than a quarter of its step is merged into
/// its neighbour. Every value must be finite, every step must move the edge and
/// at most [`MAX_BINS`] bins are produced.
pub fn rebin_params(params: &[f64]) -> Result<Vec<f64>, WorkspaceError> {
    if params.len() < 3 || params.len() % 2 == 0 {
        return Err(WorkspaceError::InvalidBinning(format!(
            "expected x1, dx1, x2[, dx2, x3 ...], got {} values",
            params.len()
        )));
    }
    if let Some(bad) = params.iter().find(|v| !v.is_finite()) {
        return Err(WorkspaceError::InvalidBinning(format!("{bad} is not a finite value")));
    }

    let mut edges = vec![params[0]];
    for segment in params[1..].chunks(2) {
        let (dx, end) = (segment[0], segment[1]);
        let mut current = *edges.last().unwrap_or(&params[0]);
        if end <= current {
            return Err(WorkspaceError::InvalidBinning(format!(
                "boundary {end} is not above {current}"
            )));
        }
        if dx == 0.0 {
            return Err(WorkspaceError::InvalidBinning("bin width must be nonzero".to_string()));
        }
        if dx < 0.0 && current <= 0.0 {
            return Err(WorkspaceError::InvalidBinning(
                "logarithmic binning needs positive x".to_string(),
            ));
        }
        if dx > 0.0 && (end - current) / dx > MAX_BINS as f64 {
            return Err(WorkspaceError::InvalidBinning(format!(
                "more than {MAX_BINS} bins requested"
            )));
        }

        loop {
            let step = if dx > 0.0 { dx } else { current * dx.abs() };
            let next = current + step;
            if next <= current {
                return Err(WorkspaceError::InvalidBinning(format!(
                    "bin width {dx} is too small to advance past {current}"
                )));
            }
            if next >= end || end - next < 0.25 * step {
                edges.push(end);
                break;
            }
            edges.push(next);
            if edges.len() > MAX_BINS {
                return Err(WorkspaceError::InvalidBinning(format!(
                    "more than {MAX_BINS} bins requested"
                )));
            }
            current = next;
        }
    }
    Ok(edges)
}

/// Redistributes the counts of a histogram onto `edges` by fractional overlap.
///
/// Errors combine in quadrature. Parts of the new range outside the old one get zero counts.
pub fn rebin(spectrum: &Spectrum, edges: &[f64]) -> Result<Spectrum, WorkspaceError> {
    if !spectrum.is_histogram() {
        return Err(WorkspaceError::InvalidBinning(
            "only histogram data can be rebinned".to_string(),
        ));
    }
    if edges.len() < 2 {
        return Err(WorkspaceError::InvalidBinning("at least two bin edges are needed".to_string()));
    }

    let bins = edges.len() - 1;
    let mut y = vec![0.0; bins];
    let mut variance = vec![0.0; bins];

    let old = spectrum.x();
    let mut j = 0;
    for i in 0..spectrum.len() {
        let (lo, hi) = (old[i], old[i + 1]);
        let width = hi - lo;
        while j < bins && edges[j + 1] <= lo {
            j += 1;
        }
        let mut k = j;
        while k < bins && edges[k] < hi {
            let overlap = hi.min(edges[k + 1]) - lo.max(edges[k]);
            if overlap > 0.0 {
                let fraction = overlap / width;
                y[k] += spectrum.y()[i] * fraction;
                variance[k] += (spectrum.e()[i] * fraction).powi(2);
            }
            k += 1;
        }
    }

    Spectrum::histogram(edges.to_vec(), y, variance.into_iter().map(f64::sqrt).collect())
}

/// Sum of counts in `[lo, hi]` and its error. Histogram bins cut by the range
/// contribute their overlapping fraction; points count if they fall inside.
pub fn integrate(spectrum: &Spectrum, lo: f64, hi: f64) -> (f64, f64) {
    let mut sum = 0.0;
    let mut variance = 0.0;
    for i in 0..spectrum.len() {
        let fraction = if spectrum.is_histogram() {
            let (a, b) = (spectrum.x()[i], spectrum.x()[i + 1]);
            ((hi.min(b) - lo.max(a)) / (b - a)).max(0.0)
        } else if (lo..=hi).contains(&spectrum.x()[i]) {
            1.0
        } else {
            0.0
        };
        sum += spectrum.y()[i] * fraction;
        variance += (spectrum.e()[i] * fraction).powi(2);
    }
    (sum, variance.sqrt())
}

/// Bin-by-bin sum of two spectra with identical x values.
pub fn add(a: &Spectrum, b: &Spectrum) -> Result<Spectrum, WorkspaceError> {
    let same_x = a.x().len() == b.x().len()
        && a.x().iter().zip(b.x()).all(|(p, q)| (p - q).abs() <= 1e-9 * p.abs().max(1.0));
    if !same_x {
        return Err(WorkspaceError::Incompatible("x values differ".to_string()));
    }

    Spectrum::new(
        a.x().to_vec(),
        a.y().iter().zip(b.y()).map(|(p, q)| p + q).collect(),
        a.e().iter().zip(b.e()).map(|(p, q)| p.hypot(*q)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(edges: Vec<f64>, count: f64) -> Spectrum {
        let n = edges.len() - 1;
        Spectrum::histogram(edges, vec![count; n], vec![count.sqrt(); n]).unwrap()
    }

    #[test]
    fn test_spectrum_shape_checks() {
        assert!(Spectrum::new(vec![1.0, 2.0], vec![1.0, 1.0], vec![1.0, 1.0]).is_ok());
        assert!(Spectrum::new(vec![1.0], vec![1.0, 1.0], vec![1.0, 1.0]).is_err());
        assert!(Spectrum::new(vec![0.0, 1.0], vec![1.0], vec![]).is_err());
        assert!(Spectrum::histogram(vec![1.0, 2.0], vec![1.0, 1.0], vec![1.0, 1.0]).is_err());
        // Bin edges must increase strictly
        assert!(Spectrum::histogram(vec![0.0, 0.0], vec![1.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_store_add_get_remove() {
        let store = WorkspaceStore::new();
        let view = store.clone();
        store.add("a", Workspace::new(vec![flat(vec![0.0, 1.0], 1.0)]));

        assert!(view.contains("a"));
        assert_eq!(view.get("a").unwrap().spectrum_count(), 1);
        assert_eq!(view.names(), vec!["a".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(view.get("a").unwrap_err(), WorkspaceError::NotFound("a".into()));
        assert!(store.remove("a").is_err());
    }

    #[test]
    fn test_rebin_params_linear_and_log() {
        assert_eq!(rebin_params(&[0.0, 1.0, 3.0]).unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        // Last bin of width 0.1 merged into its neighbour
        assert_eq!(rebin_params(&[0.0, 1.0, 2.1]).unwrap(), vec![0.0, 1.0, 2.1]);
        assert_eq!(rebin_params(&[1.0, -1.0, 8.0]).unwrap(), vec![1.0, 2.0, 4.0, 8.0]);

        assert!(rebin_params(&[0.0, 1.0]).is_err());
        assert!(rebin_params(&[0.0, 0.0, 1.0]).is_err());
        assert!(rebin_params(&[2.0, 1.0, 1.0]).is_err());
        assert!(rebin_params(&[0.0, -1.0, 1.0]).is_err());
    }

    #[test]
    fn test_rebin_params_rejects_degenerate_steps() {
        for params in [
            vec![0.0, f64::NAN, 10.0],
            vec![0.0, 1.0, f64::INFINITY],
            vec![f64::NEG_INFINITY, 1.0, 10.0],
            vec![1e17, 1.0, 1e17 + 1024.0],
            vec![0.0, 1e-9, 1e9],
        ] {
            assert!(
                matches!(rebin_params(&params), Err(WorkspaceError::InvalidBinning(_))),
                "accepted {params:?}"
            );
        }
    }

    #[test]
    fn test_rebin_conserves_counts() {
        let spectrum = flat(vec![0.0, 1.0, 2.0, 3.0, 4.0], 2.0);
        let coarse = rebin(&spectrum, &[0.0, 2.0, 4.0]).unwrap();
        assert_eq!(coarse.y(), &[4.0, 4.0]);

        let fine = rebin(&spectrum, &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(fine.y(), &[1.0, 1.0]);

        let points = Spectrum::new(vec![1.0], vec![1.0], vec![1.0]).unwrap();
        assert!(rebin(&points, &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_integrate_fractional_edges() {
        let spectrum = flat(vec![0.0, 1.0, 2.0, 3.0], 1.0);
        let (sum, _) = integrate(&spectrum, 0.5, 2.0);
        assert!((sum - 1.5).abs() < 1e-12);
        let (sum, _) = integrate(&spectrum, 10.0, 20.0);
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_add_and_scale() {
        let a = flat(vec![0.0, 1.0], 4.0);
        let sum = add(&a, &a.scaled(0.5)).unwrap();
        assert_eq!(sum.y(), &[6.0]);
        assert!(add(&a, &flat(vec![0.0, 2.0], 1.0)).is_err());
        assert_eq!(a.shifted(1.0).y(), &[5.0]);
    }

    #[test]
    fn test_conjoin_keeps_order() {
        let first = Workspace::new(vec![flat(vec![0.0, 1.0], 1.0)]).with_unit("TOF");
        let second = Workspace::new(vec![flat(vec![0.0, 1.0], 2.0), flat(vec![0.0, 1.0], 3.0)]);
        let joined = Workspace::conjoin([&first, &second]);
        assert_eq!(joined.spectrum_count(), 3);
        assert_eq!(joined.spectrum(2).unwrap().y(), &[3.0]);
        assert_eq!(joined.unit(), "TOF");
        assert!(joined.spectrum(3).is_err());
    }
}
