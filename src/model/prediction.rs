use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::TrainError;

/// How a model turns its output sequence into text.
///
/// - `SequenceAlignmentFree`   - per-column class scores trained with CTC
///   loss; written `"CTC"` in configs.
/// - `AutoregressiveAttention` - step-by-step decoder trained with teacher
///   forcing and token-wise cross-entropy; written `"Attn"`.
///
/// Fixed when the model is built. Any other label fails to parse with
/// `TrainError::UnsupportedMode`, so an unknown mode never reaches training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PredictionMode {
    SequenceAlignmentFree,
    AutoregressiveAttention,
}

impl PredictionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionMode::SequenceAlignmentFree => "CTC",
            PredictionMode::AutoregressiveAttention => "Attn",
        }
    }
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionMode {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ctc" | "sequence_alignment_free" => Ok(PredictionMode::SequenceAlignmentFree),
            "attn" | "attention" | "autoregressive_attention" => Ok(PredictionMode::AutoregressiveAttention),
            _ => Err(TrainError::UnsupportedMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for PredictionMode {
    type Error = TrainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PredictionMode> for String {
    fn from(mode: PredictionMode) -> String {
        mode.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_labels() {
        assert_eq!("CTC".parse::<PredictionMode>().unwrap(), PredictionMode::SequenceAlignmentFree);
        assert_eq!("Attn".parse::<PredictionMode>().unwrap(), PredictionMode::AutoregressiveAttention);
    }

    #[test]
    fn unknown_label_is_unsupported() {
        let err = "Rosetta".parse::<PredictionMode>().unwrap_err();
        assert!(matches!(err, TrainError::UnsupportedMode(ref m) if m == "Rosetta"));
    }

    #[test]
    fn serde_goes_through_the_same_validation() {
        let mode: PredictionMode = serde_json::from_str("\"Attn\"").unwrap();
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"Attn\"");
        assert!(serde_json::from_str::<PredictionMode>("\"SRN\"").is_err());
    }
}
