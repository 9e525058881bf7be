use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::train::epoch_result::{EpochResult, ValidationSummary};

/// Metrics of the best epoch seen so far in a run.
///
/// Starts at a sentinel that every real epoch beats: accuracies at `-inf`,
/// loss at `+inf`, no path, epoch 0. Only `select_best` produces new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMetrics {
    #[serde(with = "non_finite")]
    pub val_acc: f64,
    #[serde(with = "non_finite")]
    pub train_loss: f64,
    #[serde(with = "non_finite")]
    pub train_acc: f64,
    pub best_model_path: String,
    pub best_model_epoch: usize,
}

impl Default for BestMetrics {
    fn default() -> Self {
        BestMetrics {
            val_acc: f64::NEG_INFINITY,
            train_loss: f64::INFINITY,
            train_acc: f64::NEG_INFINITY,
            best_model_path: String::new(),
            best_model_epoch: 0,
        }
    }
}

impl BestMetrics {
    pub fn sentinel() -> BestMetrics {
        BestMetrics::default()
    }

    /// `true` until some epoch has been selected.
    pub fn is_sentinel(&self) -> bool {
        self.best_model_epoch == 0
    }
}

/// Outcome of comparing one epoch against the running best.
#[derive(Debug, Clone, PartialEq)]
pub enum BestDecision {
    Improved(BestMetrics),
    Unchanged,
}

impl BestDecision {
    pub fn is_best(&self) -> bool {
        matches!(self, BestDecision::Improved(_))
    }
}

/// Decides whether the epoch just trained is the new best.
///
/// With a validation summary the epoch wins when `val_acc` is at least the
/// stored best, so a tie moves the best to the newer epoch. Without one it
/// must strictly beat the stored `train_acc`.
pub fn select_best(
    current: &BestMetrics,
    epoch: &EpochResult,
    validation: Option<&ValidationSummary>,
    checkpoint_path: &Path,
) -> BestDecision {
    let improved = match validation {
        Some(v) => v.val_acc >= current.val_acc,
        None => epoch.train_acc > current.train_acc,
    };
    if !improved {
        return BestDecision::Unchanged;
    }
    BestDecision::Improved(BestMetrics {
        val_acc: validation.map_or(current.val_acc, |v| v.val_acc),
        train_loss: epoch.train_loss,
        train_acc: epoch.train_acc,
        best_model_path: checkpoint_path.display().to_string(),
        best_model_epoch: epoch.epoch,
    })
}

/// JSON has no infinities; write them as `"inf"` / `"-inf"` (and NaN as
/// `"nan"`) and accept either form back.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Label(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Label(s) => match s.as_str() {
                "inf" | "+inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!("expected a number or inf/-inf, got '{other}'"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(n: usize, train_acc: f64) -> EpochResult {
        EpochResult { epoch: n, train_loss: 1.0 / n as f64, train_acc, lr: 0.1, time: 0.0 }
    }

    fn run(val: Option<&[f64]>, train: &[f64]) -> (Vec<bool>, BestMetrics) {
        let mut best = BestMetrics::sentinel();
        let mut flags = Vec::new();
        for (i, &acc) in train.iter().enumerate() {
            let summary = val.map(|v| ValidationSummary { val_acc: v[i], edit_distance: 0.0 });
            let path = format!("ckpt/model_latest_{}.json", i + 1);
            let decision = select_best(&best, &epoch(i + 1, acc), summary.as_ref(), Path::new(&path));
            flags.push(decision.is_best());
            if let BestDecision::Improved(next) = decision {
                best = next;
            }
        }
        (flags, best)
    }

    #[test]
    fn validation_ties_prefer_the_latest_epoch() {
        let (flags, best) = run(Some(&[0.10, 0.55, 0.55, 0.40]), &[0.0; 4]);
        assert_eq!(flags, vec![true, true, true, false]);
        assert_eq!(best.best_model_epoch, 3);
        assert_eq!(best.val_acc, 0.55);
        assert_eq!(best.best_model_path, "ckpt/model_latest_3.json");
    }

    #[test]
    fn without_validation_train_acc_must_strictly_improve() {
        let (flags, best) = run(None, &[0.2, 0.2, 0.3]);
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(best.best_model_epoch, 3);
        assert_eq!(best.train_acc, 0.3);
        assert_eq!(best.val_acc, f64::NEG_INFINITY);
    }

    #[test]
    fn best_val_acc_never_decreases() {
        let (_, best) = run(Some(&[0.9, 0.1, 0.5]), &[0.0; 3]);
        assert_eq!(best.val_acc, 0.9);
        assert_eq!(best.best_model_epoch, 1);
    }

    #[test]
    fn sentinel_survives_json() {
        let json = serde_json::to_string(&BestMetrics::sentinel()).unwrap();
        assert!(json.contains("\"-inf\"") && json.contains("\"inf\""));
        let back: BestMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BestMetrics::sentinel());
        assert!(back.is_sentinel());
    }
}
