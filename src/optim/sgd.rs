use serde::{Serialize, Deserialize};

use crate::error::{TrainError, TrainResult};
use crate::layers::parameter::Parameter;
use crate::optim::schedule::LrSchedule;
use crate::optim::{Optimizer, OptimizerState};

/// Hyperparameters for `Sgd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgdConfig {
    pub learning_rate: f64,
    #[serde(default)]
    pub momentum: f64,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default)]
    pub schedule: LrSchedule,
}

/// Stochastic gradient descent with optional momentum and L2 weight decay.
///
///   v ← μ·v + (g + λ·w)
///   w ← w − lr·v
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub schedule: LrSchedule,
    velocity: Vec<Vec<f64>>,
    steps: u64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            schedule: LrSchedule::Constant,
            velocity: Vec::new(),
            steps: 0,
        }
    }

    pub fn from_config(config: &SgdConfig) -> TrainResult<Sgd> {
        if !(config.learning_rate > 0.0) || !(0.0..1.0).contains(&config.momentum) || config.weight_decay < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "sgd needs lr > 0, 0 <= momentum < 1, weight_decay >= 0 (got {}, {}, {})",
                config.learning_rate, config.momentum, config.weight_decay
            )));
        }
        Ok(Sgd {
            momentum: config.momentum,
            weight_decay: config.weight_decay,
            schedule: config.schedule,
            ..Sgd::new(config.learning_rate)
        })
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Parameter]) -> TrainResult<()> {
        if self.velocity.is_empty() {
            self.velocity = params.iter().map(|p| vec![0.0; p.numel()]).collect();
        }
        if self.velocity.len() != params.len()
            || self.velocity.iter().zip(params.iter()).any(|(v, p)| v.len() != p.numel())
        {
            return Err(TrainError::shape("optimizer state does not match the parameter list"));
        }

        let lr = self.learning_rate();
        for (p, v) in params.iter_mut().zip(self.velocity.iter_mut()) {
            let Parameter { value, grad } = &mut **p;
            for ((w, g), v) in value.data.iter_mut().zip(&grad.data).zip(v.iter_mut()) {
                *v = self.momentum * *v + g + self.weight_decay * *w;
                *w -= lr * *v;
            }
        }
        self.steps += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.schedule.rate(self.learning_rate, self.steps)
    }

    fn steps_taken(&self) -> u64 {
        self.steps
    }

    fn state(&self) -> OptimizerState {
        OptimizerState { steps: self.steps, buffers: self.velocity.clone() }
    }

    fn load_state(&mut self, state: OptimizerState) -> TrainResult<()> {
        // buffer shapes are checked against the parameters on the next step
        self.steps = state.steps;
        self.velocity = state.buffers;
        Ok(())
    }
}
