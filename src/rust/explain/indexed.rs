//! Word indexing of a text for bag-of-words perturbation.

use std::collections::HashMap;

/// A text split into alternating word and separator pieces.
///
/// Words are maximal runs of alphanumeric characters or `_`. Each distinct word
/// is one feature; removing a feature removes every occurrence of the word and
/// keeps all separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedString {
    raw: String,
    pieces: Vec<String>,
    vocab: Vec<String>,
    positions: Vec<Vec<usize>>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl IndexedString {
    pub fn new(raw: &str) -> Self {
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_is_word = None;
        for c in raw.chars() {
            let word = is_word_char(c);
            if current_is_word.is_some_and(|w| w != word) {
                pieces.push(std::mem::take(&mut current));
            }
            current.push(c);
            current_is_word = Some(word);
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut vocab: Vec<String> = Vec::new();
        let mut positions: Vec<Vec<usize>> = Vec::new();
        for (i, piece) in pieces.iter().enumerate() {
            if !piece.starts_with(is_word_char) {
                continue;
            }
            match index.get(piece.as_str()) {
                Some(&idx) => positions[idx].push(i),
                None => {
                    index.insert(piece.as_str(), vocab.len());
                    vocab.push(piece.clone());
                    positions.push(vec![i]);
                }
            }
        }

        Self { raw: raw.to_string(), pieces, vocab, positions }
    }

    pub fn raw_string(&self) -> &str {
        &self.raw
    }

    /// Number of distinct words (features).
    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    pub fn word(&self, feature: usize) -> &str {
        &self.vocab[feature]
    }

    /// All pieces in order, each tagged with its feature id when it is a word.
    pub fn pieces(&self) -> impl Iterator<Item = (&str, Option<usize>)> + '_ {
        let mut owner = vec![None; self.pieces.len()];
        for (feature, positions) in self.positions.iter().enumerate() {
            for &pos in positions {
                owner[pos] = Some(feature);
            }
        }
        self.pieces.iter().map(String::as_str).zip(owner)
    }

    /// The text with every occurrence of the given features removed.
    pub fn inverse_removing(&self, features: &[usize]) -> String {
        let mut keep = vec![true; self.pieces.len()];
        for &feature in features {
            for &pos in &self.positions[feature] {
                keep[pos] = false;
            }
        }
        self.pieces.iter()
            .zip(keep)
            .filter(|(_, keep)| *keep)
            .map(|(piece, _)| piece.as_str())
            .collect()
    }
}
