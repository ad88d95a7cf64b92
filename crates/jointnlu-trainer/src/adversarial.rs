//! Fast Gradient Method perturbation of the word-embedding matrix.
//!
//! One adversarial step is: [`Fgm::attack`] after the clean backward pass,
//! a second forward/backward inside [`Fgm::perturbed`], which restores the
//! embeddings, then [`merge_grads`] so the optimizer sees the sum of both
//! gradients.

use candle_core::Var;
use candle_core::backprop::GradStore;
use tracing::debug;

pub struct Fgm {
    epsilon: f64,
    backup: Option<candle_core::Tensor>,
}

impl Fgm {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            backup: None,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Add `epsilon * g / ||g||` to `embeddings` in place.
    ///
    /// Returns `false`, leaving the embeddings untouched, when there is no
    /// usable gradient for them.
    pub fn attack(&mut self, embeddings: &Var, grads: &GradStore) -> candle_core::Result<bool> {
        let Some(grad) = grads.get(embeddings.as_tensor()) else {
            return Ok(false);
        };
        let norm: f32 = grad.sqr()?.sum_all()?.sqrt()?.to_scalar()?;
        if norm == 0.0 || !norm.is_finite() {
            debug!(norm, "skipping adversarial step");
            return Ok(false);
        }

        self.backup = Some(embeddings.as_tensor().copy()?);
        let r_adv = (grad * (self.epsilon / norm as f64))?;
        let perturbed = (embeddings.as_tensor().detach() + r_adv.detach())?;
        embeddings.set(&perturbed)?;
        Ok(true)
    }

    /// Put back the embeddings saved by the last successful [`Fgm::attack`].
    pub fn restore(&mut self, embeddings: &Var) -> candle_core::Result<()> {
        if let Some(backup) = self.backup.take() {
            embeddings.set(&backup)?;
        }
        Ok(())
    }

    /// Run `f` against the perturbed embeddings, then restore them whether or
    /// not `f` succeeded.
    pub fn perturbed<T, E>(&mut self, embeddings: &Var, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<candle_core::Error>,
    {
        let result = f();
        self.restore(embeddings)?;
        result
    }
}

/// Add every gradient in `other` for `vars` into `into`.
pub fn merge_grads(into: &mut GradStore, other: &GradStore, vars: &[Var]) -> candle_core::Result<()> {
    for var in vars {
        let Some(extra) = other.get(var.as_tensor()) else {
            continue;
        };
        let merged = match into.get(var.as_tensor()) {
            Some(existing) => (existing + extra)?,
            None => extra.clone(),
        };
        into.insert(var.as_tensor(), merged);
    }
    Ok(())
}
