use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Bumped whenever the feature computation changes.  The model artifact
/// records the version it was fitted with, so a stale artifact can never be
/// queried through a different feature path (training/inference skew).
pub const FEATURE_VERSION: u32 = 1;

/// Lowercase alphanumeric terms from a statement description, as unigrams
/// plus adjacent bigrams.  Bigrams are what let multi-word merchant patterns
/// ("spotify premium", "tim hortons") count as one signal.
pub struct Tokenizer {
    term: Regex,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer {
            term: Regex::new(r"[a-z0-9]+").expect("valid token pattern"),
        }
    }
}

impl Tokenizer {
    pub fn terms(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let unigrams: Vec<String> = self
            .term
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut terms = unigrams.clone();
        terms.extend(
            unigrams.windows(2).map(|pair| pair.join(" ")),
        );
        terms
    }
}

/// The frozen vectorization state plus the numeric amount transform: the one
/// code path through which both training samples and queried transactions
/// become feature vectors.
///
/// Text features are tf-idf weights over a vocabulary frozen at fit time
/// (terms seen at inference but not at fit simply contribute nothing),
/// L2-normalized so descriptions of different lengths are comparable.  The
/// amount becomes two trailing features: a log-compressed magnitude, so a
/// single large transfer does not dominate every split, and its sign.
pub struct FeatureSpace {
    tokenizer: Tokenizer,
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl FeatureSpace {
    /// Freeze the vocabulary and document frequencies from the training
    /// texts.  Deterministic: the vocabulary is sorted, so identical inputs
    /// always produce the identical feature space.
    pub fn fit<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tokenizer = Tokenizer::default();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut num_docs = 0_usize;
        for text in texts {
            num_docs += 1;
            let mut terms = tokenizer.terms(text);
            terms.sort();
            terms.dedup();
            for t in terms {
                *doc_freq.entry(t).or_default() += 1;
            }
        }

        let mut vocabulary: Vec<String> = doc_freq.keys().cloned().collect();
        vocabulary.sort();

        let index: HashMap<String, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();

        // Smoothed idf, as if one extra document contained every term, so
        // a term present everywhere still gets a small positive weight.
        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0);
                ((1 + num_docs) as f64 / (1 + df) as f64).ln() + 1.0
            })
            .collect();

        FeatureSpace {
            tokenizer,
            vocabulary,
            index,
            idf,
        }
    }

    /// Text features plus the two amount features.
    pub fn num_features(&self) -> usize {
        self.vocabulary.len() + 2
    }

    /// Diagnostic name for a feature index (vocabulary term, or one of the
    /// amount features).
    pub fn feature_name(&self, idx: usize) -> String {
        match self.vocabulary.get(idx) {
            Some(term) => term.clone(),
            None if idx == self.vocabulary.len() => "amount magnitude".into(),
            None => "amount sign".into(),
        }
    }

    pub fn vector(&self, description: &str, amount: Decimal) -> Vec<f64> {
        let mut x = vec![0.0; self.num_features()];

        let mut total_terms = 0_usize;
        for term in self.tokenizer.terms(description) {
            total_terms += 1;
            if let Some(&idx) = self.index.get(&term) {
                if let Some(slot) = x.get_mut(idx) {
                    *slot += 1.0;
                }
            }
        }
        if total_terms > 0 {
            for (idx, idf) in self.idf.iter().enumerate() {
                if let Some(slot) = x.get_mut(idx) {
                    *slot = (*slot / total_terms as f64) * idf;
                }
            }
        }
        let norm: f64 = x
            .iter()
            .take(self.vocabulary.len())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();
        if norm > f64::EPSILON {
            for v in x.iter_mut().take(self.vocabulary.len()) {
                *v /= norm;
            }
        }

        let amount = amount.to_f64().unwrap_or(0.0);
        let magnitude = (1.0 + amount.abs()).ln();
        let sign = if amount > 0.0 {
            1.0
        } else if amount < 0.0 {
            -1.0
        } else {
            0.0
        };
        let vocab_len = self.vocabulary.len();
        if let Some(slot) = x.get_mut(vocab_len) {
            *slot = magnitude;
        }
        if let Some(slot) = x.get_mut(vocab_len + 1) {
            *slot = sign;
        }
        x
    }
}
