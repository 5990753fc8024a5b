//! Reader and inference for fastText supervised models (`.bin`).
//!
//! Only dense (non-quantized) models are supported. Prediction reproduces the
//! fastText line encoding: in-vocabulary word ids, character n-gram buckets for
//! subword models, word n-gram buckets, and the trailing end-of-sentence token.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, info};
use ndarray::{Array1, Array2};

use super::error::ClassifierError;
use super::utils::{sigmoid, softmax, uniform};
use super::TextClassifier;

const FILEFORMAT_MAGIC: i32 = 793712314;
const MIN_SUPPORTED_VERSION: i32 = 11;
const FILEFORMAT_VERSION: i32 = 12;

const EOS: &str = "</s>";
const BOW: &str = "<";
const EOW: &str = ">";
const LABEL_PREFIX: &str = "__label__";

const WORD_NGRAM_MULTIPLIER: u64 = 116_049_371;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loss {
    HierarchicalSoftmax,
    NegativeSampling,
    Softmax,
    OneVsAll,
}

impl Loss {
    fn from_code(code: i32) -> Result<Self, ClassifierError> {
        match code {
            1 => Ok(Self::HierarchicalSoftmax),
            2 => Ok(Self::NegativeSampling),
            3 => Ok(Self::Softmax),
            4 => Ok(Self::OneVsAll),
            other => Err(ClassifierError::FormatError(format!("unknown loss code {}", other))),
        }
    }
}

/// Header fields that affect prediction. Training-only settings are skipped.
#[derive(Debug, Clone)]
struct Args {
    dim: i32,
    word_ngrams: i32,
    loss: Loss,
    model: i32,
    bucket: i32,
    minn: i32,
    maxn: i32,
}

const MODEL_SUPERVISED: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryType {
    Word,
    Label,
}

#[derive(Debug, Clone)]
struct Entry {
    word: String,
    kind: EntryType,
    subwords: Vec<i32>,
}

#[derive(Debug)]
struct Dictionary {
    entries: Vec<Entry>,
    word2int: HashMap<String, i32>,
    nwords: i32,
    nlabels: i32,
    pruneidx_size: i64,
    pruneidx: HashMap<i32, i32>,
}

/// FNV-1a over bytes, sign-extending each byte the way fastText does.
fn hash(token: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for &byte in token.as_bytes() {
        h ^= (byte as i8) as i32 as u32;
        h = h.wrapping_mul(16_777_619);
    }
    h
}

fn is_continuation_byte(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

impl Dictionary {
    fn read<R: Read>(reader: &mut R, args: &Args) -> Result<Self, ClassifierError> {
        let size = read_i32(reader)?;
        let nwords = read_i32(reader)?;
        let nlabels = read_i32(reader)?;
        let _ntokens = read_i64(reader)?;
        let pruneidx_size = read_i64(reader)?;

        if size < 0 || nwords < 0 || nlabels < 0 || nwords + nlabels != size {
            return Err(ClassifierError::FormatError(format!(
                "inconsistent dictionary sizes: size={} nwords={} nlabels={}", size, nwords, nlabels
            )));
        }

        let mut entries = Vec::with_capacity(size as usize);
        let mut word2int = HashMap::with_capacity(size as usize);
        for i in 0..size {
            let word = read_cstring(reader)?;
            let _count = read_i64(reader)?;
            let kind = match read_u8(reader)? {
                0 => EntryType::Word,
                1 => EntryType::Label,
                other => {
                    return Err(ClassifierError::FormatError(format!("unknown entry type {}", other)));
                }
            };
            word2int.insert(word.clone(), i);
            entries.push(Entry { word, kind, subwords: Vec::new() });
        }

        let mut pruneidx = HashMap::new();
        for _ in 0..pruneidx_size.max(0) {
            let first = read_i32(reader)?;
            let second = read_i32(reader)?;
            pruneidx.insert(first, second);
        }

        let mut dict = Self { entries, word2int, nwords, nlabels, pruneidx_size, pruneidx };
        dict.init_ngrams(args);
        Ok(dict)
    }

    fn init_ngrams(&mut self, args: &Args) {
        for i in 0..self.entries.len() {
            let mut subwords = vec![i as i32];
            if self.entries[i].word != EOS {
                let word = format!("{}{}{}", BOW, self.entries[i].word, EOW);
                self.compute_subwords(&word, &mut subwords, args);
            }
            self.entries[i].subwords = subwords;
        }
    }

    fn compute_subwords(&self, word: &str, ngrams: &mut Vec<i32>, args: &Args) {
        let bytes = word.as_bytes();
        for i in 0..bytes.len() {
            if is_continuation_byte(bytes[i]) {
                continue;
            }
            let mut j = i;
            let mut n = 1;
            while j < bytes.len() && n <= args.maxn {
                j += 1;
                while j < bytes.len() && is_continuation_byte(bytes[j]) {
                    j += 1;
                }
                if n >= args.minn && !(n == 1 && (i == 0 || j == bytes.len())) {
                    let ngram = String::from_utf8_lossy(&bytes[i..j]);
                    if args.bucket > 0 {
                        let id = (hash(&ngram) % args.bucket as u32) as i32;
                        self.push_hash(ngrams, id);
                    }
                }
                n += 1;
            }
        }
    }

    fn push_hash(&self, hashes: &mut Vec<i32>, id: i32) {
        if self.pruneidx_size == 0 || id < 0 {
            return;
        }
        let id = if self.pruneidx_size > 0 {
            match self.pruneidx.get(&id) {
                Some(&mapped) => mapped,
                None => return,
            }
        } else {
            id
        };
        hashes.push(self.nwords + id);
    }

    fn is_label_token(token: &str) -> bool {
        token.starts_with(LABEL_PREFIX)
    }

    /// Encodes one line into input-matrix row ids.
    fn line_ids(&self, text: &str, args: &Args) -> Vec<i32> {
        let mut ids = Vec::new();
        let mut word_hashes: Vec<i32> = Vec::new();

        let tokens = text
            .split(|c: char| matches!(c, ' ' | '\t' | '\x0B' | '\x0C' | '\0' | '\n' | '\r'))
            .filter(|t| !t.is_empty())
            .chain(std::iter::once(EOS));

        for token in tokens {
            let h = hash(token);
            let wid = self.word2int.get(token).copied();
            let kind = match wid {
                Some(id) => self.entries[id as usize].kind,
                None if Self::is_label_token(token) => EntryType::Label,
                None => EntryType::Word,
            };
            if kind != EntryType::Word {
                continue;
            }
            match wid {
                None => {
                    if token != EOS && args.maxn > 0 {
                        let word = format!("{}{}{}", BOW, token, EOW);
                        self.compute_subwords(&word, &mut ids, args);
                    }
                }
                Some(id) => {
                    if args.maxn <= 0 {
                        ids.push(id);
                    } else {
                        ids.extend_from_slice(&self.entries[id as usize].subwords);
                    }
                }
            }
            word_hashes.push(h as i32);
        }

        self.add_word_ngrams(&mut ids, &word_hashes, args);
        ids
    }

    fn add_word_ngrams(&self, ids: &mut Vec<i32>, hashes: &[i32], args: &Args) {
        if args.bucket <= 0 {
            return;
        }
        let n = args.word_ngrams.max(1) as usize;
        for i in 0..hashes.len() {
            // fastText widens the signed 32-bit hashes before mixing
            let mut h = hashes[i] as i64 as u64;
            for &next in hashes.iter().take(i + n).skip(i + 1) {
                h = h.wrapping_mul(WORD_NGRAM_MULTIPLIER).wrapping_add(next as i64 as u64);
                self.push_hash(ids, (h % args.bucket as u64) as i32);
            }
        }
    }
}

/// A fastText supervised classifier loaded from a `.bin` file.
#[derive(Debug)]
pub struct FastTextClassifier {
    args: Args,
    dict: Dictionary,
    input: Array2<f32>,
    output: Array2<f32>,
    labels: Vec<String>,
}

impl FastTextClassifier {
    /// Loads a model file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ClassifierError::BuildError(format!("Failed to open fastText model {}: {}", path.display(), e))
        })?;
        let model = Self::from_reader(BufReader::new(file))?;
        info!(
            "Loaded fastText model {} ({} words, {} labels, dim {})",
            path.display(), model.dict.nwords, model.dict.nlabels, model.args.dim
        );
        Ok(model)
    }

    /// Reads a model from any byte source.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ClassifierError> {
        let magic = read_i32(&mut reader)?;
        if magic != FILEFORMAT_MAGIC {
            return Err(ClassifierError::FormatError("not a fastText model (bad magic number)".into()));
        }
        let version = read_i32(&mut reader)?;
        if !(MIN_SUPPORTED_VERSION..=FILEFORMAT_VERSION).contains(&version) {
            return Err(ClassifierError::FormatError(format!("unsupported fastText version {}", version)));
        }

        let mut args = read_args(&mut reader)?;
        if args.model != MODEL_SUPERVISED {
            return Err(ClassifierError::FormatError(
                "only supervised fastText models can be used as classifiers".into()
            ));
        }
        if version == 11 {
            // Version 11 supervised models were trained without character n-grams
            args.maxn = 0;
        }
        if args.loss == Loss::HierarchicalSoftmax {
            return Err(ClassifierError::FormatError(
                "hierarchical softmax models are not supported".into()
            ));
        }

        let dict = Dictionary::read(&mut reader, &args)?;
        debug!("fastText dictionary: {} words, {} labels", dict.nwords, dict.nlabels);

        if read_u8(&mut reader)? != 0 {
            return Err(ClassifierError::FormatError("quantized fastText models are not supported".into()));
        }
        let input = read_matrix(&mut reader)?;
        if read_u8(&mut reader)? != 0 {
            return Err(ClassifierError::FormatError("quantized fastText models are not supported".into()));
        }
        let output = read_matrix(&mut reader)?;

        if input.ncols() != args.dim as usize || output.ncols() != args.dim as usize {
            return Err(ClassifierError::FormatError(format!(
                "matrix width does not match dimension {}", args.dim
            )));
        }
        if output.nrows() != dict.nlabels as usize {
            return Err(ClassifierError::FormatError(format!(
                "output matrix has {} rows for {} labels", output.nrows(), dict.nlabels
            )));
        }

        let labels = dict.entries.iter()
            .filter(|e| e.kind == EntryType::Label)
            .map(|e| e.word.strip_prefix(LABEL_PREFIX).unwrap_or(&e.word).to_string())
            .collect();

        Ok(Self { args, dict, input, output, labels })
    }

    /// Probability of every label for a single line.
    pub fn predict_line(&self, text: &str) -> Array1<f32> {
        let ids = self.dict.line_ids(text, &self.args);
        let rows: Vec<usize> = ids.iter()
            .filter(|&&id| id >= 0 && (id as usize) < self.input.nrows())
            .map(|&id| id as usize)
            .collect();
        if rows.is_empty() {
            return uniform(self.labels.len());
        }

        let mut hidden = Array1::<f32>::zeros(self.input.ncols());
        for &row in &rows {
            hidden += &self.input.row(row);
        }
        hidden /= rows.len() as f32;

        let logits = self.output.dot(&hidden);
        match self.args.loss {
            Loss::Softmax => softmax(logits.view(), 1.0),
            _ => logits.mapv(sigmoid),
        }
    }
}

impl TextClassifier for FastTextClassifier {
    fn class_names(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        let mut probs = Array2::zeros((texts.len(), self.labels.len()));
        for (row, text) in texts.iter().enumerate() {
            probs.row_mut(row).assign(&self.predict_line(text));
        }
        Ok(probs)
    }
}

fn read_args<R: Read>(reader: &mut R) -> Result<Args, ClassifierError> {
    let dim = read_i32(reader)?;
    // ws, epoch, minCount, neg
    for _ in 0..4 {
        read_i32(reader)?;
    }
    let word_ngrams = read_i32(reader)?;
    let loss = Loss::from_code(read_i32(reader)?)?;
    let model = read_i32(reader)?;
    let bucket = read_i32(reader)?;
    let minn = read_i32(reader)?;
    let maxn = read_i32(reader)?;
    // lrUpdateRate, t
    read_i32(reader)?;
    read_f64(reader)?;
    Ok(Args { dim, word_ngrams, loss, model, bucket, minn, maxn })
}

fn read_matrix<R: Read>(reader: &mut R) -> Result<Array2<f32>, ClassifierError> {
    let m = read_i64(reader)?;
    let n = read_i64(reader)?;
    if m < 0 || n < 0 {
        return Err(ClassifierError::FormatError(format!("invalid matrix shape {}x{}", m, n)));
    }
    let (m, n) = (m as usize, n as usize);
    let len = m.checked_mul(n)
        .and_then(|cells| cells.checked_mul(4).map(|_| cells))
        .ok_or_else(|| ClassifierError::FormatError("matrix too large".into()))?;

    let mut bytes = vec![0u8; len * 4];
    reader.read_exact(&mut bytes)?;
    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Array2::from_shape_vec((m, n), data)
        .map_err(|e| ClassifierError::FormatError(format!("invalid matrix data: {}", e)))
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, ClassifierError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32, ClassifierError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> Result<i64, ClassifierError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, ClassifierError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_cstring<R: Read>(reader: &mut R) -> Result<String, ClassifierError> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_u8(reader)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|e| ClassifierError::FormatError(format!("invalid UTF-8 in dictionary: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serializes a tiny dense supervised model in the fastText layout.
    pub(crate) struct ModelSpec<'a> {
        pub words: &'a [&'a str],
        pub labels: &'a [&'a str],
        pub input: Vec<Vec<f32>>,
        pub output: Vec<Vec<f32>>,
        pub loss: i32,
        pub word_ngrams: i32,
        pub bucket: i32,
        pub minn: i32,
        pub maxn: i32,
        pub quantized: bool,
    }

    impl ModelSpec<'_> {
        pub(crate) fn to_bytes(&self) -> Vec<u8> {
            let dim = self.output.first().map(|r| r.len()).unwrap_or(0) as i32;
            let mut buf = Vec::new();
            buf.extend_from_slice(&FILEFORMAT_MAGIC.to_le_bytes());
            buf.extend_from_slice(&FILEFORMAT_VERSION.to_le_bytes());
            for value in [dim, 5, 5, 1, 5, self.word_ngrams, self.loss, MODEL_SUPERVISED,
                          self.bucket, self.minn, self.maxn, 100] {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            buf.extend_from_slice(&1e-4f64.to_le_bytes());

            let size = (self.words.len() + self.labels.len()) as i32;
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&(self.words.len() as i32).to_le_bytes());
            buf.extend_from_slice(&(self.labels.len() as i32).to_le_bytes());
            buf.extend_from_slice(&100i64.to_le_bytes());
            buf.extend_from_slice(&(-1i64).to_le_bytes());
            for (entries, kind) in [(self.words, 0u8), (self.labels, 1u8)] {
                for entry in entries {
                    buf.extend_from_slice(entry.as_bytes());
                    buf.push(0);
                    buf.extend_from_slice(&10i64.to_le_bytes());
                    buf.push(kind);
                }
            }

            for matrix in [&self.input, &self.output] {
                buf.push(u8::from(self.quantized));
                let cols = matrix.first().map(|r| r.len()).unwrap_or(0);
                buf.extend_from_slice(&(matrix.len() as i64).to_le_bytes());
                buf.extend_from_slice(&(cols as i64).to_le_bytes());
                for row in matrix {
                    for value in row {
                        buf.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
            buf
        }
    }

    pub(crate) fn sentiment_spec() -> ModelSpec<'static> {
        ModelSpec {
            words: &["good", "bad", EOS],
            labels: &["__label__pos", "__label__neg"],
            input: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]],
            output: vec![vec![4.0, -4.0], vec![-4.0, 4.0]],
            loss: 3,
            word_ngrams: 1,
            bucket: 0,
            minn: 0,
            maxn: 0,
            quantized: false,
        }
    }

    #[test]
    fn test_hash_matches_fnv1a() {
        assert_eq!(hash(""), 2_166_136_261);
        // FNV-1a 32-bit of "a"
        assert_eq!(hash("a"), 0xe40c292c);
    }

    #[test]
    fn test_hash_sign_extends_non_ascii_bytes() {
        let byte = 0xC3u8;
        let expected = (2_166_136_261u32 ^ 0xFFFF_FFC3).wrapping_mul(16_777_619);
        assert_eq!(hash(std::str::from_utf8(&[byte, 0xA9]).unwrap()),
            (expected ^ 0xFFFF_FFA9).wrapping_mul(16_777_619));
    }

    #[test]
    fn test_load_and_predict() {
        let model = FastTextClassifier::from_reader(sentiment_spec().to_bytes().as_slice()).unwrap();
        assert_eq!(model.class_names(), vec!["pos", "neg"]);

        let probs = model.predict_line("good");
        // hidden = mean(good, </s>) = [0.5, 0]; logits = [2, -2]
        let expected = 1.0 / (1.0 + (-4.0f32).exp());
        assert!((probs[0] - expected).abs() < 1e-5);
        assert!((probs.sum() - 1.0).abs() < 1e-5);

        let probs = model.predict_line("bad");
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_out_of_vocabulary_words_are_ignored() {
        let model = FastTextClassifier::from_reader(sentiment_spec().to_bytes().as_slice()).unwrap();
        assert_eq!(model.predict_line("good"), model.predict_line("really good"));
    }

    #[test]
    fn test_label_tokens_in_input_are_skipped() {
        let model = FastTextClassifier::from_reader(sentiment_spec().to_bytes().as_slice()).unwrap();
        assert_eq!(model.predict_line("good __label__neg"), model.predict_line("good"));
    }

    #[test]
    fn test_predict_proba_shape() {
        let model = FastTextClassifier::from_reader(sentiment_spec().to_bytes().as_slice()).unwrap();
        let texts = vec!["good".to_string(), "bad".to_string(), "".to_string()];
        let probs = model.predict_proba(&texts).unwrap();
        assert_eq!(probs.dim(), (3, 2));
        // Only </s> remains, whose input row is zero
        assert!((probs[[2, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_one_vs_all_uses_sigmoid() {
        let mut spec = sentiment_spec();
        spec.loss = 4;
        let model = FastTextClassifier::from_reader(spec.to_bytes().as_slice()).unwrap();
        let probs = model.predict_line("good");
        assert!((probs[0] - sigmoid(2.0)).abs() < 1e-6);
        assert!((probs[1] - sigmoid(-2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_word_ngrams_use_bucket_rows() {
        let mut spec = sentiment_spec();
        spec.word_ngrams = 2;
        spec.bucket = 4;
        spec.input.extend(vec![vec![0.0, 0.0]; 4]);
        let model = FastTextClassifier::from_reader(spec.to_bytes().as_slice()).unwrap();
        let ids = model.dict.line_ids("good bad", &model.args);
        // good, bad, </s>, then bigrams (good bad) and (bad </s>)
        assert_eq!(ids.len(), 5);
        assert!(ids[3..].iter().all(|&id| (3..7).contains(&id)));
    }

    #[test]
    fn test_subwords_for_unknown_words() {
        let mut spec = sentiment_spec();
        spec.bucket = 8;
        spec.minn = 2;
        spec.maxn = 3;
        spec.input.extend(vec![vec![0.0, 0.0]; 8]);
        let model = FastTextClassifier::from_reader(spec.to_bytes().as_slice()).unwrap();
        let ids = model.dict.line_ids("goad", &model.args);
        // "<goad>" has 5 bigrams and 4 trigrams, then </s>
        assert_eq!(ids.len(), 10);
        assert_eq!(*ids.last().unwrap(), 2);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = sentiment_spec().to_bytes();
        bytes[0] ^= 0xFF;
        let err = FastTextClassifier::from_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ClassifierError::FormatError(_)));
    }

    #[test]
    fn test_rejects_quantized_model() {
        let mut spec = sentiment_spec();
        spec.quantized = true;
        let err = FastTextClassifier::from_reader(spec.to_bytes().as_slice()).unwrap_err();
        assert!(matches!(err, ClassifierError::FormatError(_)));
    }

    #[test]
    fn test_rejects_hierarchical_softmax() {
        let mut spec = sentiment_spec();
        spec.loss = 1;
        let err = FastTextClassifier::from_reader(spec.to_bytes().as_slice()).unwrap_err();
        assert!(matches!(err, ClassifierError::FormatError(_)));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = sentiment_spec().to_bytes();
        let err = FastTextClassifier::from_reader(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassifierError::FormatError(_)));
    }
}
