use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::{argmax, softmax};
use super::vectorizer::SparseVector;

/// Multinomial Naive Bayes over non-negative sparse features.
///
/// The set of classes is fixed when the model is created; `partial_fit` only
/// accumulates counts, so fitting on two halves of a dataset gives the same
/// model as fitting on the whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialNb {
    alpha: f64,
    /// Documents seen per class
    class_count: Array1<f64>,
    /// Summed feature values per class, shape (classes, features)
    feature_count: Array2<f64>,
}

impl MultinomialNb {
    pub fn new(n_classes: usize, n_features: usize, alpha: f64) -> Result<Self, ClassifierError> {
        if n_classes == 0 || n_features == 0 {
            return Err(ClassifierError::ValidationError(format!(
                "Naive Bayes needs at least one class and one feature (got {} classes, {} features)",
                n_classes, n_features
            )));
        }
        if !(alpha > 0.0) {
            return Err(ClassifierError::ValidationError(format!("alpha must be positive, got {}", alpha)));
        }
        Ok(Self {
            alpha,
            class_count: Array1::zeros(n_classes),
            feature_count: Array2::zeros((n_classes, n_features)),
        })
    }

    pub fn n_classes(&self) -> usize {
        self.class_count.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_count.ncols()
    }

    /// Number of training documents observed so far.
    pub fn n_samples(&self) -> f64 {
        self.class_count.sum()
    }

    /// Resets all counts, then accumulates the given samples.
    pub fn fit(&mut self, x: &[SparseVector], y: &[usize]) -> Result<(), ClassifierError> {
        self.class_count.fill(0.0);
        self.feature_count.fill(0.0);
        self.partial_fit(x, y)
    }

    pub fn partial_fit(&mut self, x: &[SparseVector], y: &[usize]) -> Result<(), ClassifierError> {
        if x.is_empty() {
            return Err(ClassifierError::ValidationError("Cannot fit on an empty batch".into()));
        }
        if x.len() != y.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Got {} samples but {} labels", x.len(), y.len()
            )));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= self.n_classes()) {
            return Err(ClassifierError::ValidationError(format!(
                "Label {} is out of range for {} classes", bad, self.n_classes()
            )));
        }
        for row in x {
            if let Some((j, v)) = row.iter().find(|&(j, v)| j >= self.n_features() || v < 0.0) {
                return Err(ClassifierError::ValidationError(format!(
                    "Invalid feature {} with value {} (features: {}, values must be non-negative)",
                    j, v, self.n_features()
                )));
            }
        }

        for (row, &class) in x.iter().zip(y) {
            self.class_count[class] += 1.0;
            for (j, v) in row.iter() {
                self.feature_count[[class, j]] += v;
            }
        }
        Ok(())
    }

    fn class_log_prior(&self) -> Array1<f64> {
        let total = self.n_samples();
        self.class_count.mapv(|c| {
            if c > 0.0 { (c / total).ln() } else { f64::NEG_INFINITY }
        })
    }

    /// Unnormalised joint log likelihood of each class.
    pub fn joint_log_likelihood(&self, x: &SparseVector) -> Result<Array1<f64>, ClassifierError> {
        if self.n_samples() == 0.0 {
            return Err(ClassifierError::PredictionError("Naive Bayes model has not been fitted".into()));
        }
        let n_features = self.n_features() as f64;
        let mut jll = self.class_log_prior();
        for (c, score) in jll.iter_mut().enumerate() {
            if !score.is_finite() {
                continue;
            }
            let row = self.feature_count.row(c);
            let log_denominator = (row.sum() + self.alpha * n_features).ln();
            for (j, v) in x.iter() {
                if j < self.feature_count.ncols() {
                    *score += v * ((row[j] + self.alpha).ln() - log_denominator);
                }
            }
        }
        Ok(jll)
    }

    /// Log posterior of each class; `-inf` for classes never observed.
    pub fn predict_log_proba(&self, x: &SparseVector) -> Result<Array1<f64>, ClassifierError> {
        let jll = self.joint_log_likelihood(x)?;
        let max = jll.iter().cloned().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(ClassifierError::PredictionError("No class could be scored".into()));
        }
        let log_norm = max + jll.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
        Ok(jll.mapv(|v| v - log_norm))
    }

    pub fn predict_proba(&self, x: &SparseVector) -> Result<Array1<f64>, ClassifierError> {
        Ok(softmax(&self.joint_log_likelihood(x)?))
    }

    pub fn predict(&self, x: &SparseVector) -> Result<usize, ClassifierError> {
        let jll = self.joint_log_likelihood(x)?;
        argmax(&jll).ok_or_else(|| ClassifierError::PredictionError("No class could be scored".into()))
    }
}
