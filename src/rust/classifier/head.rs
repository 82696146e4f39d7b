use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::{argmax, softmax};
use crate::config::TrainingConfig;

/// Linear softmax classifier trained on top of frozen sentence embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxHead {
    /// Shape (classes, embedding size)
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl SoftmaxHead {
    pub fn new(n_classes: usize, embedding_size: usize) -> Result<Self, ClassifierError> {
        if n_classes == 0 || embedding_size == 0 {
            return Err(ClassifierError::ValidationError(format!(
                "Head needs at least one class and one input dimension (got {} classes, {} dims)",
                n_classes, embedding_size
            )));
        }
        Ok(Self {
            weights: Array2::zeros((n_classes, embedding_size)),
            bias: Array1::zeros(n_classes),
        })
    }

    pub fn n_classes(&self) -> usize {
        self.bias.len()
    }

    pub fn embedding_size(&self) -> usize {
        self.weights.ncols()
    }

    fn logits(&self, x: &Array1<f64>) -> Array1<f64> {
        self.weights.dot(x) + &self.bias
    }

    fn check_input(&self, x: &Array1<f32>) -> Result<Array1<f64>, ClassifierError> {
        if x.len() != self.embedding_size() {
            return Err(ClassifierError::ValidationError(format!(
                "Embedding has {} dimensions, head expects {}", x.len(), self.embedding_size()
            )));
        }
        Ok(x.mapv(f64::from))
    }

    pub fn predict_proba(&self, x: &Array1<f32>) -> Result<Array1<f64>, ClassifierError> {
        let x = self.check_input(x)?;
        Ok(softmax(&self.logits(&x)))
    }

    pub fn predict(&self, x: &Array1<f32>) -> Result<usize, ClassifierError> {
        let x = self.check_input(x)?;
        argmax(&self.logits(&x)).ok_or_else(|| ClassifierError::PredictionError("No class could be scored".into()))
    }

    /// Resets the weights and trains for `config.epochs` passes.
    pub fn fit(&mut self, x: &[Array1<f32>], y: &[usize], config: &TrainingConfig) -> Result<Vec<f64>, ClassifierError> {
        self.weights.fill(0.0);
        self.bias.fill(0.0);
        self.train(x, y, config.epochs, config)
    }

    /// Short additional pass of `config.update_epochs` over a new batch.
    pub fn update(&mut self, x: &[Array1<f32>], y: &[usize], config: &TrainingConfig) -> Result<Vec<f64>, ClassifierError> {
        self.train(x, y, config.update_epochs, config)
    }

    /// Runs `epochs` passes of mini-batch gradient descent starting from the
    /// current weights and returns the mean cross-entropy of each pass.
    pub fn train(
        &mut self,
        x: &[Array1<f32>],
        y: &[usize],
        epochs: usize,
        config: &TrainingConfig,
    ) -> Result<Vec<f64>, ClassifierError> {
        if x.is_empty() {
            return Err(ClassifierError::ValidationError("Cannot train on an empty batch".into()));
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
        let inputs = x.iter()
            .map(|row| self.check_input(row))
            .collect::<Result<Vec<_>, _>>()?;
        let batch_size = config.batch_size.max(1);
        let lr = config.learning_rate;

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut losses = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;

            for batch in order.chunks(batch_size) {
                let mut grad_w = Array2::<f64>::zeros(self.weights.raw_dim());
                let mut grad_b = Array1::<f64>::zeros(self.bias.raw_dim());

                for &i in batch {
                    let input = &inputs[i];
                    let mut g = softmax(&self.logits(input));
                    loss_sum -= g[y[i]].max(1e-12).ln();
                    g[y[i]] -= 1.0;
                    for (c, &gc) in g.iter().enumerate() {
                        grad_w.row_mut(c).scaled_add(gc, input);
                    }
                    grad_b += &g;
                }

                let scale = 1.0 / batch.len() as f64;
                grad_w.scaled_add(config.weight_decay / scale, &self.weights);
                self.weights.scaled_add(-lr * scale, &grad_w);
                self.bias.scaled_add(-lr * scale, &grad_b);
            }

            let mean_loss = loss_sum / inputs.len() as f64;
            debug!("Head epoch {:>3}/{} | loss={:.4}", epoch, epochs, mean_loss);
            losses.push(mean_loss);
        }

        if let Some(last) = losses.last() {
            info!("Trained head for {} epochs on {} samples, final loss {:.4}", epochs, inputs.len(), last);
        }
        Ok(losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_embeddings() -> (Vec<Array1<f32>>, Vec<usize>) {
        let x = vec![
            array![1.0, 0.1, 0.0],
            array![0.9, 0.0, 0.1],
            array![0.0, 1.0, 0.1],
            array![0.1, 0.9, 0.0],
            array![0.0, 0.1, 1.0],
            array![0.1, 0.0, 0.9],
        ];
        (x, vec![0, 0, 1, 1, 2, 2])
    }

    fn config() -> TrainingConfig {
        TrainingConfig { batch_size: 2, ..Default::default() }
    }

    #[test]
    fn test_training_separates_classes() {
        let (x, y) = toy_embeddings();
        let mut head = SoftmaxHead::new(3, 3).unwrap();
        let losses = head.train(&x, &y, 50, &config()).unwrap();
        assert_eq!(losses.len(), 50);
        assert!(losses[49] < losses[0]);
        for (row, &label) in x.iter().zip(&y) {
            assert_eq!(head.predict(row).unwrap(), label);
        }
    }

    #[test]
    fn test_update_continues_from_current_weights() {
        let (x, y) = toy_embeddings();
        let mut head = SoftmaxHead::new(3, 3).unwrap();
        head.train(&x, &y, 20, &config()).unwrap();
        let before = head.clone();
        head.train(&x[..2], &y[..2], 2, &config()).unwrap();
        assert_ne!(head, before);
        // a short pass on one class should raise its probability
        let p_before = before.predict_proba(&x[0]).unwrap()[0];
        let p_after = head.predict_proba(&x[0]).unwrap()[0];
        assert!(p_after > p_before);
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = toy_embeddings();
        let mut a = SoftmaxHead::new(3, 3).unwrap();
        let mut b = SoftmaxHead::new(3, 3).unwrap();
        a.train(&x, &y, 5, &config()).unwrap();
        b.train(&x, &y, 5, &config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_resets_weights() {
        let (x, y) = toy_embeddings();
        let config = TrainingConfig { epochs: 5, ..config() };
        let mut fresh = SoftmaxHead::new(3, 3).unwrap();
        fresh.fit(&x, &y, &config).unwrap();

        let mut reused = SoftmaxHead::new(3, 3).unwrap();
        reused.train(&x[..2], &y[..2], 3, &config).unwrap();
        reused.fit(&x, &y, &config).unwrap();
        assert_eq!(fresh, reused);

        let losses = reused.update(&x[..2], &y[..2], &config).unwrap();
        assert_eq!(losses.len(), config.update_epochs);
    }

    #[test]
    fn test_validation() {
        let (x, y) = toy_embeddings();
        let mut head = SoftmaxHead::new(3, 3).unwrap();
        assert!(head.train(&[], &[], 1, &config()).is_err());
        assert!(head.train(&x, &y[..3], 1, &config()).is_err());
        assert!(head.train(&x[..1], &[3], 1, &config()).is_err());
        assert!(head.predict(&array![1.0, 0.0]).is_err());
        assert!(SoftmaxHead::new(0, 3).is_err());
    }
}
