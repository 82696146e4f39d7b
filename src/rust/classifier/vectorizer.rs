use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use ndarray::Array1;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

lazy_static! {
    /// Words of two or more word characters.
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\b\w\w+\b").expect("token pattern is valid");
}

/// Lowercases and splits text into terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_PATTERN.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A feature vector that stores only its non-zero entries, indices ascending.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseVector {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseVector {
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

#[derive(Serialize, Deserialize)]
struct VectorizerState {
    vocabulary: Vec<String>,
    idf: Array1<f64>,
}

/// Term-frequency times inverse-document-frequency text vectorizer.
///
/// The vocabulary is the `max_features` most frequent terms of the fitted
/// corpus, indexed alphabetically. Rows are L2-normalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VectorizerState", into = "VectorizerState")]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    idf: Array1<f64>,
}

impl TryFrom<VectorizerState> for TfidfVectorizer {
    type Error = String;

    fn try_from(state: VectorizerState) -> Result<Self, Self::Error> {
        if state.vocabulary.len() != state.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but idf has {} weights",
                state.vocabulary.len(),
                state.idf.len()
            ));
        }
        Ok(Self::from_parts(state.vocabulary, state.idf))
    }
}

impl From<TfidfVectorizer> for VectorizerState {
    fn from(v: TfidfVectorizer) -> Self {
        Self { vocabulary: v.vocabulary, idf: v.idf }
    }
}

impl TfidfVectorizer {
    fn from_parts(vocabulary: Vec<String>, idf: Array1<f64>) -> Self {
        let index = vocabulary.iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { vocabulary, index, idf }
    }

    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Result<Self, ClassifierError> {
        if documents.is_empty() {
            return Err(ClassifierError::ValidationError("Cannot fit a vectorizer on an empty corpus".into()));
        }
        if max_features == 0 {
            return Err(ClassifierError::ValidationError("max_features must be positive".into()));
        }

        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut seen: HashSet<String> = HashSet::new();
            for term in tokenize(doc.as_ref()) {
                *term_freq.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }
        if term_freq.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Corpus contains no terms of two or more characters".into(),
            ));
        }

        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| (Reverse(a.1), &a.0).cmp(&(Reverse(b.1), &b.0)));
        ranked.truncate(max_features);
        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocabulary.sort();

        let n_docs = documents.len() as f64;
        let idf = vocabulary.iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect::<Array1<f64>>();

        Ok(Self::from_parts(vocabulary, idf))
    }

    /// Terms outside the fitted vocabulary are ignored, so the result may be empty.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in tokenize(text) {
            if let Some(&j) = self.index.get(&term) {
                *counts.entry(j).or_insert(0.0) += 1.0;
            }
        }
        let mut entries: Vec<(usize, f64)> = counts.into_iter()
            .map(|(j, tf)| (j, tf * self.idf[j]))
            .collect();
        entries.sort_by_key(|&(j, _)| j);

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        let (indices, values) = entries.into_iter()
            .map(|(j, v)| (j, if norm > 0.0 { v / norm } else { v }))
            .unzip();
        SparseVector { indices, values }
    }

    pub fn transform_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.transform(t.as_ref())).collect()
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_single_chars() {
        assert_eq!(tokenize("Bought a NEW jacket, 2 shirts!"), vec!["bought", "new", "jacket", "shirts"]);
    }

    #[test]
    fn test_tokenize_unicode() {
        assert_eq!(tokenize("Mua sắm tại cửa hàng"), vec!["mua", "sắm", "tại", "cửa", "hàng"]);
    }

    #[test]
    fn test_vocabulary_sorted_and_capped() {
        let docs = ["coffee coffee coffee tea", "coffee tea juice", "water"];
        let v = TfidfVectorizer::fit(&docs, 2).unwrap();
        assert_eq!(v.vocabulary(), &["coffee", "tea"]);
    }

    #[test]
    fn test_idf_weights() {
        let docs = ["paid bill", "paid rent"];
        let v = TfidfVectorizer::fit(&docs, 10).unwrap();
        // "paid" occurs in every document, "bill" in one
        let x = v.transform("paid bill");
        let paid = v.vocabulary().iter().position(|t| t == "paid").unwrap();
        let bill = v.vocabulary().iter().position(|t| t == "bill").unwrap();
        let value = |j| x.iter().find(|&(i, _)| i == j).map(|(_, v)| v).unwrap();
        assert!(value(bill) > value(paid));
        assert!((x.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_terms_ignored() {
        let v = TfidfVectorizer::fit(&["paid bill"], 10).unwrap();
        assert!(v.transform("zebra xylophone").is_empty());
    }

    #[test]
    fn test_empty_corpus() {
        let empty: [&str; 0] = [];
        assert!(TfidfVectorizer::fit(&empty, 10).is_err());
        assert!(TfidfVectorizer::fit(&["a b c"], 10).is_err());
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let v = TfidfVectorizer::fit(&["paid electric bill", "bought jacket"], 10).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        let restored: TfidfVectorizer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.transform("electric jacket"), v.transform("electric jacket"));
    }
}
