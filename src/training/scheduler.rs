//! Step learning-rate schedule
//!
//! The rate starts at `base_lr` and is multiplied by `gamma` every `step_size` epochs:
//! `lr(epoch) = base_lr * gamma^(epoch / step_size)`.

use serde::{Deserialize, Serialize};

/// Step decay scheduler, stepped once per epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLR {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    current_lr: f64,
    current_epoch: usize,
}

impl StepLR {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            current_lr: base_lr,
            current_epoch: 0,
        }
    }

    /// Learning rate for the current epoch
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    /// Number of completed epochs
    pub fn epoch(&self) -> usize {
        self.current_epoch
    }

    /// Step the scheduler (call at the end of each epoch)
    pub fn step(&mut self) {
        self.current_epoch += 1;
        if self.current_epoch % self.step_size == 0 {
            self.current_lr *= self.gamma;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decay() {
        let mut scheduler = StepLR::new(0.1, 3, 0.1);
        let mut lrs = Vec::new();
        for _ in 0..7 {
            lrs.push(scheduler.get_lr());
            scheduler.step();
        }

        assert!((lrs[0] - 0.1).abs() < 1e-12);
        assert!((lrs[2] - 0.1).abs() < 1e-12);
        assert!((lrs[3] - 0.01).abs() < 1e-12);
        assert!((lrs[6] - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_incremental_matches_closed_form() {
        let mut scheduler = StepLR::new(1e-3, 20, 0.1);
        for epoch in 0..45 {
            let expected = 1e-3 * 0.1f64.powi((epoch / 20) as i32);
            assert!((scheduler.get_lr() - expected).abs() < 1e-15);
            scheduler.step();
        }
        assert_eq!(scheduler.epoch(), 45);
    }
}
