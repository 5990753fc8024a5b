//! Word tokenization applied to user text before it is explained.

use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

#[derive(Debug, thiserror::Error)]
#[error("Tokenization failed: {0}")]
pub struct TokenizeError(String);

/// Splits text on whitespace and punctuation and joins the tokens with single spaces.
///
/// ```
/// let tokens = lime_dashboard::text::tokenize("Great movie, really!").unwrap();
/// assert_eq!(tokens, "Great movie , really !");
/// ```
pub fn tokenize(raw: &str) -> Result<String, TokenizeError> {
    let mut pretokenized = PreTokenizedString::from(raw);
    BertPreTokenizer
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| TokenizeError(e.to_string()))?;

    let tokens: Vec<&str> = pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(token, _, _)| token)
        .collect();
    Ok(tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_punctuation() {
        assert_eq!(tokenize("This movie was great!").unwrap(), "This movie was great !");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(tokenize("  two\t\nwords  ").unwrap(), "two words");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize("").unwrap(), "");
    }

    #[test]
    fn test_deterministic() {
        let text = "It's not bad... it's (mostly) fine.";
        assert_eq!(tokenize(text).unwrap(), tokenize(text).unwrap());
    }
}
