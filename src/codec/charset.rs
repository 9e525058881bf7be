use std::collections::HashMap;

use crate::error::{TrainError, TrainResult};

/// Ordered set of recognisable characters.
///
/// Codecs reserve their special tokens first and place character `i` of the
/// set at class `offset + i`.
#[derive(Debug, Clone)]
pub struct Charset {
    chars: Vec<char>,
    index: HashMap<char, usize>,
}

impl Charset {
    pub fn new(alphabet: &str) -> TrainResult<Charset> {
        let mut chars = Vec::new();
        let mut index = HashMap::new();
        for c in alphabet.chars() {
            if index.insert(c, chars.len()).is_some() {
                return Err(TrainError::Codec(format!("character '{c}' appears twice in the charset")));
            }
            chars.push(c);
        }
        if chars.is_empty() {
            return Err(TrainError::Codec("charset is empty".into()));
        }
        Ok(Charset { chars, index })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn position(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    pub fn char_at(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    /// Maps `label` to class indices shifted by `offset`.
    pub fn indices(&self, label: &str, offset: usize) -> TrainResult<Vec<usize>> {
        label
            .chars()
            .map(|c| {
                self.position(c)
                    .map(|i| i + offset)
                    .ok_or_else(|| TrainError::Codec(format!("character '{c}' in '{label}' is not in the charset")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_rejected() {
        assert!(Charset::new("abca").is_err());
        assert!(Charset::new("").is_err());
    }

    #[test]
    fn indices_apply_offset() {
        let cs = Charset::new("xyz").unwrap();
        assert_eq!(cs.indices("zx", 2).unwrap(), vec![4, 2]);
        assert!(matches!(cs.indices("q", 0), Err(TrainError::Codec(_))));
    }
}
