use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

/// Code reserved for padding. No character ever maps to it.
pub const PAD_CODE: u32 = 0;

/// A frozen character → code mapping.
///
/// Codes are dense in `1..=len()`; the serialized form is a JSON object from
/// single-character strings to codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct Vocabulary {
    codes: HashMap<char, u32>,
    symbols: Vec<char>,
}

impl Vocabulary {
    /// Builds the vocabulary from every character of `corpus`.
    ///
    /// Characters are numbered in sorted order starting at 1.
    pub fn build<'a, I>(corpus: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<char> = corpus.into_iter().flat_map(str::chars).collect();
        let symbols: Vec<char> = distinct.into_iter().collect();
        let codes = symbols
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32 + 1))
            .collect();
        Self { codes, symbols }
    }

    /// Number of distinct characters, `K`.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Size of the embedding table: `K` codes plus padding.
    pub fn input_size(&self) -> usize {
        self.len() + 1
    }

    pub fn code(&self, symbol: char) -> Option<u32> {
        self.codes.get(&symbol).copied()
    }

    pub fn symbol(&self, code: u32) -> Option<char> {
        if code == PAD_CODE {
            return None;
        }
        self.symbols.get(code as usize - 1).copied()
    }

    /// Maps every character of `text` to its code.
    ///
    /// # Errors
    /// - `UnknownSymbol` for the first character not in the vocabulary
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, ClassifierError> {
        text.chars()
            .enumerate()
            .map(|(position, symbol)| {
                self.code(symbol)
                    .ok_or(ClassifierError::UnknownSymbol { symbol, position })
            })
            .collect()
    }

    /// Encodes `text` to exactly `length` codes, truncating or padding with `PAD_CODE`.
    pub fn encode_padded(&self, text: &str, length: usize) -> Result<Vec<u32>, ClassifierError> {
        let mut codes = self.encode(text)?;
        codes.resize(length, PAD_CODE);
        Ok(codes)
    }

    /// Maps codes back to text, stopping at the first padding code.
    pub fn decode(&self, codes: &[u32]) -> Result<String, ClassifierError> {
        codes
            .iter()
            .take_while(|&&code| code != PAD_CODE)
            .map(|&code| {
                self.symbol(code).ok_or_else(|| {
                    ClassifierError::ValidationError(format!("Code {} is outside the vocabulary", code))
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.symbols.iter().enumerate().map(|(i, &c)| (c, i as u32 + 1))
    }
}

impl From<Vocabulary> for BTreeMap<String, u32> {
    fn from(vocabulary: Vocabulary) -> Self {
        vocabulary.iter().map(|(c, code)| (c.to_string(), code)).collect()
    }
}

impl TryFrom<BTreeMap<String, u32>> for Vocabulary {
    type Error = String;

    fn try_from(map: BTreeMap<String, u32>) -> Result<Self, Self::Error> {
        let mut symbols = vec![None; map.len()];
        for (key, code) in &map {
            let mut chars = key.chars();
            let symbol = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("vocabulary key {:?} is not a single character", key)),
            };
            let slot = (*code as usize)
                .checked_sub(1)
                .and_then(|i| symbols.get_mut(i))
                .ok_or_else(|| format!("code {} for {:?} is outside 1..={}", code, key, map.len()))?;
            if slot.replace(symbol).is_some() {
                return Err(format!("code {} is assigned twice", code));
            }
        }
        // Every slot is filled: `map.len()` distinct codes landed in `map.len()` slots.
        let symbols: Vec<char> = symbols.into_iter().flatten().collect();
        let codes = symbols
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32 + 1))
            .collect();
        Ok(Self { codes, symbols })
    }
}
