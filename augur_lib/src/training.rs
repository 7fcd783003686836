use crate::errors::{Error, Result};
use crate::events::CategorizationEvent;
use crate::transactions::TransactionId;
use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// One labeled example, projected from the event log.  Never persisted: the
/// set is rebuilt from scratch on every training run, so the log stays the
/// single source of truth.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub text: String,
    pub amount: Decimal,
    pub label: String,
}

/// The labeled dataset derived from the event history.
pub struct TrainingSet {
    pub samples: Vec<TrainingSample>,

    // Surviving samples per label, after supersession and filtering.
    pub label_counts: BTreeMap<String, usize>,
}

impl TrainingSet {
    /// Replay the event history into a labeled dataset.
    ///
    /// A transaction may have been categorized several times; only its most
    /// recent event counts (latest timestamp, later append winning a
    /// timestamp tie).  Labels with fewer than `min_samples` surviving
    /// events are dropped entirely, with their transactions: a category we
    /// have hardly seen would only teach the model noise.
    ///
    /// Deterministic: the same event log always yields the same set, in the
    /// same order.  There is no randomness here; sampling decisions belong
    /// to the classifier.
    pub fn build(
        events: &[CategorizationEvent],
        min_samples: usize,
    ) -> Result<TrainingSet> {
        // Supersession.  Events normally arrive (timestamp, append order)
        // sorted, but compare explicitly so an unsorted slice gives the
        // same answer.
        let mut latest: HashMap<&TransactionId, (usize, &CategorizationEvent)> =
            HashMap::new();
        for (pos, ev) in events.iter().enumerate() {
            match latest.get(&ev.transaction_id) {
                Some((prev_pos, prev))
                    if (prev.timestamp, *prev_pos) > (ev.timestamp, pos) => {}
                _ => {
                    latest.insert(&ev.transaction_id, (pos, ev));
                }
            }
        }

        let counts = latest.values().counts_by(|(_, ev)| ev.label());

        let mut samples: Vec<TrainingSample> = latest
            .values()
            .filter(|(_, ev)| {
                counts.get(&ev.label()).copied().unwrap_or(0) >= min_samples
            })
            .map(|(_, ev)| TrainingSample {
                text: ev.description.clone(),
                amount: ev.amount,
                label: ev.label(),
            })
            .collect();
        samples.sort_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then_with(|| a.text.cmp(&b.text))
                .then_with(|| a.amount.cmp(&b.amount))
        });

        let mut label_counts = BTreeMap::new();
        for s in &samples {
            *label_counts.entry(s.label.clone()).or_insert(0) += 1;
        }

        if label_counts.len() < 2 {
            return Err(Error::InsufficientData {
                categories: label_counts.len(),
                samples: samples.len(),
            });
        }

        Ok(TrainingSet {
            samples,
            label_counts,
        })
    }

    /// The surviving labels, sorted.
    pub fn labels(&self) -> Vec<String> {
        self.label_counts.keys().cloned().collect()
    }
}
