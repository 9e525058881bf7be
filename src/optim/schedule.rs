use serde::{Serialize, Deserialize};

/// Learning-rate schedule, evaluated from the number of optimizer steps
/// already taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrSchedule {
    #[default]
    Constant,
    /// Multiply by `gamma` every `step_size` steps.
    StepDecay { step_size: u64, gamma: f64 },
}

impl LrSchedule {
    pub fn rate(&self, base: f64, steps: u64) -> f64 {
        match *self {
            LrSchedule::Constant => base,
            LrSchedule::StepDecay { step_size, gamma } => {
                let decays = steps / step_size.max(1);
                base * gamma.powi(decays.min(i32::MAX as u64) as i32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_drops_at_boundaries() {
        let s = LrSchedule::StepDecay { step_size: 10, gamma: 0.5 };
        assert_eq!(s.rate(1.0, 9), 1.0);
        assert_eq!(s.rate(1.0, 10), 0.5);
        assert_eq!(s.rate(1.0, 25), 0.25);
    }

    #[test]
    fn parses_tagged_json() {
        let s: LrSchedule = serde_json::from_str(r#"{"type":"step_decay","step_size":5,"gamma":0.1}"#).unwrap();
        assert_eq!(s, LrSchedule::StepDecay { step_size: 5, gamma: 0.1 });
    }
}
