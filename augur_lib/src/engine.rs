use crate::classifier::{Classifier, Metrics, Prediction};
use crate::errors::Result;
use crate::events::{split_label, CategorizationEvent, EventFilter, Source};
use crate::store::EventStore;
use crate::training::TrainingSet;
use crate::transactions::{AccountId, Transaction};
use chrono::Utc;
use log::info;

pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Knobs for one auto-categorization run.  The default is the safe one:
/// dry-run, non-interactive, 0.7 confidence.
#[derive(Debug, Clone)]
pub struct Options {
    /// Minimum posterior probability before a suggestion is surfaced.
    pub confidence: f64,
    /// Only consider transactions from this account.
    pub account: Option<AccountId>,
    /// Cap on the number of transactions reviewed in this run.
    pub limit: Option<usize>,
    /// Labels need this many surviving events to join the training set.
    pub min_samples: usize,
    /// Actually append events.  Off means report-only.
    pub write: bool,
    /// Ask a human about every proposal instead of staging them all.
    pub interactive: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            confidence: DEFAULT_CONFIDENCE,
            account: None,
            limit: None,
            min_samples: DEFAULT_MIN_SAMPLES,
            write: false,
            interactive: false,
        }
    }
}

/// A model suggestion for one uncategorized transaction.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub transaction: Transaction,
    pub suggestion: Prediction,
}

/// Review progress of one proposal.  Pending is the only non-terminal
/// state; a quit leaves the rest of the batch Pending and untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Pending,
    /// The reviewer accepted the suggestion as-is.
    Approved,
    /// The reviewer declined; the transaction stays uncategorized.
    Rejected,
    /// The reviewer supplied their own label instead of the suggestion.
    Modified(String),
}

#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub proposal: Proposal,
    pub state: ReviewState,
}

impl ReviewItem {
    /// The label this item contributes to the commit, if any.
    pub fn staged_label(&self) -> Option<&str> {
        match &self.state {
            ReviewState::Pending | ReviewState::Rejected => None,
            ReviewState::Approved => Some(&self.proposal.suggestion.label),
            ReviewState::Modified(label) => Some(label),
        }
    }
}

/// What the reviewer answered for one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
    Modify(String),
    /// End the session; everything still Pending stays untouched.
    Quit,
}

/// Supplies review decisions.  The CLI implements this against a terminal;
/// tests script it.
pub trait ReviewPrompt {
    fn review(
        &mut self,
        index: usize,
        total: usize,
        proposal: &Proposal,
    ) -> Result<ReviewDecision>;
}

/// One batch of proposals moving toward a single commit.
///
/// The session holds per-item state so that "quit mid-batch, keep what was
/// already decided" is a property of the data, not of control flow: commit
/// looks only at terminal states, and runs exactly once, at the end.
pub struct ReviewSession {
    items: Vec<ReviewItem>,

    // Which source tag committed events carry: User when a human reviewed
    // them, Rule for unattended threshold commits.
    source: Source,
}

impl ReviewSession {
    fn new(proposals: Vec<Proposal>, source: Source) -> Self {
        ReviewSession {
            items: proposals
                .into_iter()
                .map(|proposal| ReviewItem {
                    proposal,
                    state: ReviewState::Pending,
                })
                .collect(),
            source,
        }
    }

    /// Stage every pending proposal (the unattended path).
    fn stage_all(&mut self) {
        for item in &mut self.items {
            if item.state == ReviewState::Pending {
                item.state = ReviewState::Approved;
            }
        }
    }

    /// Walk the batch through the prompt.  Stops early on Quit; items not
    /// yet shown remain Pending.
    fn review_with(&mut self, prompt: &mut dyn ReviewPrompt) -> Result<()> {
        let total = self.items.len();
        for (index, item) in self.items.iter_mut().enumerate() {
            match prompt.review(index, total, &item.proposal)? {
                ReviewDecision::Approve => {
                    item.state = ReviewState::Approved;
                }
                ReviewDecision::Reject => {
                    item.state = ReviewState::Rejected;
                }
                ReviewDecision::Modify(label) => {
                    item.state = ReviewState::Modified(label);
                }
                ReviewDecision::Quit => break,
            }
        }
        Ok(())
    }

    /// The single terminal commit step: append one event per staged item.
    /// Never called before the batch is finalized, so cancelling earlier
    /// (or never calling with write) leaves the log exactly as it was.
    fn commit(&self, store: &mut dyn EventStore) -> Result<usize> {
        let mut written = 0;
        for item in &self.items {
            let label = match item.staged_label() {
                None => continue,
                Some(label) => label,
            };
            let (category, subcategory) = split_label(label);
            let txn = &item.proposal.transaction;
            store.append(CategorizationEvent {
                transaction_id: txn.id.clone(),
                description: txn.description.clone(),
                amount: txn.amount,
                account: txn.account.clone(),
                category,
                subcategory,
                previous_category: txn.category.clone(),
                source: self.source,
                timestamp: Utc::now(),
            })?;
            written += 1;
        }
        Ok(written)
    }
}

/// Result of one auto-categorization run.
pub struct Outcome {
    /// Training summary for the model that produced the proposals.
    pub metrics: Metrics,
    /// Every proposal with its final review state.
    pub items: Vec<ReviewItem>,
    /// Transactions whose best prediction stayed below the threshold;
    /// these need manual categorization.
    pub below_threshold: usize,
    /// Events appended (always 0 in dry-run).
    pub written: usize,
}

/// Train on the event history, predict over the uncategorized transactions,
/// and either report or commit the accepted proposals.
///
/// `prompt` is consulted only when `options.interactive` is set.  The
/// transaction set comes from the surrounding ledger, already deduplicated
/// and currency-normalized.
pub fn auto_categorize(
    store: &mut dyn EventStore,
    classifier: &mut Classifier,
    transactions: &[Transaction],
    options: &Options,
    prompt: Option<&mut dyn ReviewPrompt>,
) -> Result<Outcome> {
    let history = store.query(&EventFilter::default())?;
    let set = TrainingSet::build(&history, options.min_samples)?;
    let metrics = classifier.train(&set)?;

    let candidates: Vec<Transaction> = transactions
        .iter()
        .filter(|txn| !txn.is_categorized())
        .filter(|txn| match &options.account {
            None => true,
            Some(account) => txn.account == *account,
        })
        .take(options.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    let predictions = classifier.predict(&candidates, options.confidence)?;
    let mut proposals = Vec::new();
    let mut below_threshold = 0;
    for (txn, prediction) in candidates.into_iter().zip(predictions) {
        match prediction {
            None => below_threshold += 1,
            Some(suggestion) => proposals.push(Proposal {
                transaction: txn,
                suggestion,
            }),
        }
    }

    let source = if options.interactive {
        Source::User
    } else {
        Source::Rule
    };
    let mut session = ReviewSession::new(proposals, source);
    match (options.interactive, prompt) {
        (true, Some(prompt)) => session.review_with(prompt)?,
        (true, None) => {
            return Err(crate::errors::Error::Str(
                "interactive review requires a prompt".into(),
            ))
        }
        (false, _) => session.stage_all(),
    }

    let written = if options.write {
        session.commit(store)?
    } else {
        0
    };
    info!(
        "auto-categorize: {} proposals, {} below threshold, {} written",
        session.items.len(),
        below_threshold,
        written
    );

    Ok(Outcome {
        metrics,
        items: session.items,
        below_threshold,
        written,
    })
}

#[cfg(test)]
mod test {
    use crate::classifier::Classifier;
    use crate::engine::{
        auto_categorize, Options, Proposal, ReviewDecision, ReviewPrompt,
        ReviewState,
    };
    use crate::errors::Result;
    use crate::events::{CategorizationEvent, EventFilter, Source};
    use crate::store::{EventStore, MemoryEventStore};
    use crate::transactions::{AccountId, Transaction, TransactionId};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn seeded_store() -> MemoryEventStore {
        let mut store = MemoryEventStore::default();
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut push = |prefix: &str,
                        desc: &str,
                        amount: Decimal,
                        category: &str,
                        n: usize| {
            for i in 0..n {
                store
                    .append(CategorizationEvent {
                        transaction_id: TransactionId(format!("{prefix}{i}")),
                        description: desc.into(),
                        amount,
                        account: AccountId("checking".into()),
                        category: category.into(),
                        subcategory: None,
                        previous_category: None,
                        source: Source::User,
                        timestamp: base + Duration::minutes(i as i64),
                    })
                    .unwrap();
            }
        };
        push("m", "SPOTIFY PREMIUM", dec!(-12.99), "Entertainment", 6);
        push("g", "LOBLAWS #4", dec!(-45.0), "Groceries", 6);
        store
    }

    fn txn(id: &str, desc: &str, amount: Decimal) -> Transaction {
        Transaction {
            id: TransactionId(id.into()),
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            amount,
            description: desc.into(),
            account: AccountId("checking".into()),
            category: None,
            subcategory: None,
        }
    }

    fn uncategorized() -> Vec<Transaction> {
        vec![
            txn("u1", "SPOTIFY FAMILY", dec!(-16.99)),
            txn("u2", "LOBLAWS #4", dec!(-61.30)),
        ]
    }

    struct Scripted(Vec<ReviewDecision>);

    impl ReviewPrompt for Scripted {
        fn review(
            &mut self,
            _index: usize,
            _total: usize,
            _proposal: &Proposal,
        ) -> Result<ReviewDecision> {
            Ok(if self.0.is_empty() {
                ReviewDecision::Quit
            } else {
                self.0.remove(0)
            })
        }
    }

    #[test]
    fn test_dry_run_is_idempotent() {
        let mut store = seeded_store();
        let before = store.len().unwrap();

        for _ in 0..3 {
            let mut classifier = Classifier::default();
            let outcome = auto_categorize(
                &mut store,
                &mut classifier,
                &uncategorized(),
                &Options {
                    confidence: 0.5,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
            assert!(!outcome.items.is_empty());
            assert_eq!(outcome.written, 0);
        }
        assert_eq!(store.len().unwrap(), before);
    }

    #[test]
    fn test_unattended_write_commits_as_rule() {
        let mut store = seeded_store();
        let before = store.len().unwrap();
        let mut classifier = Classifier::default();

        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options {
                confidence: 0.5,
                write: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.below_threshold, 0);
        assert_eq!(outcome.written, 2);
        assert_eq!(store.len().unwrap(), before + 2);

        let events = store.query(&EventFilter::default()).unwrap();
        let appended = &events[events.len() - 2..];
        assert!(appended.iter().all(|ev| ev.source == Source::Rule));
        assert!(appended.iter().any(|ev| ev.category == "Entertainment"));
        assert!(appended.iter().any(|ev| ev.category == "Groceries"));
        assert!(appended.iter().all(|ev| ev.previous_category.is_none()));
    }

    #[test]
    fn test_account_filter_and_limit() {
        let mut store = seeded_store();
        let mut classifier = Classifier::default();
        let mut txns = uncategorized();
        txns.push(Transaction {
            account: AccountId("visa".into()),
            ..txn("v1", "SPOTIFY PREMIUM", dec!(-12.99))
        });

        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &txns,
            &Options {
                confidence: 0.5,
                account: Some(AccountId("visa".into())),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(
            outcome.items[0].proposal.transaction.id,
            TransactionId("v1".into())
        );

        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &txns,
            &Options {
                confidence: 0.5,
                limit: Some(1),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome.items.len() + outcome.below_threshold, 1);
    }

    #[test]
    fn test_interactive_review_states() {
        let mut store = seeded_store();
        let mut classifier = Classifier::default();
        let mut prompt = Scripted(vec![
            ReviewDecision::Approve,
            ReviewDecision::Modify("Groceries:Organic".into()),
        ]);

        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options {
                confidence: 0.5,
                interactive: true,
                write: true,
                ..Default::default()
            },
            Some(&mut prompt),
        )
        .unwrap();

        assert_eq!(outcome.items[0].state, ReviewState::Approved);
        assert_eq!(
            outcome.items[1].state,
            ReviewState::Modified("Groceries:Organic".into())
        );
        assert_eq!(outcome.written, 2);

        let events = store.query(&EventFilter::default()).unwrap();
        let appended = &events[events.len() - 2..];
        assert!(appended.iter().all(|ev| ev.source == Source::User));
        assert!(appended
            .iter()
            .any(|ev| ev.category == "Groceries"
                && ev.subcategory.as_deref() == Some("Organic")));
    }

    #[test]
    fn test_quit_commits_only_finalized_items() {
        let mut store = seeded_store();
        let before = store.len().unwrap();
        let mut classifier = Classifier::default();

        // Approve the first proposal, then quit: the second stays Pending
        // and must not be committed.
        let mut prompt =
            Scripted(vec![ReviewDecision::Approve, ReviewDecision::Quit]);
        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options {
                confidence: 0.5,
                interactive: true,
                write: true,
                ..Default::default()
            },
            Some(&mut prompt),
        )
        .unwrap();

        assert_eq!(outcome.items[0].state, ReviewState::Approved);
        assert_eq!(outcome.items[1].state, ReviewState::Pending);
        assert_eq!(outcome.written, 1);
        assert_eq!(store.len().unwrap(), before + 1);
    }

    #[test]
    fn test_rejected_stays_uncategorized() {
        let mut store = seeded_store();
        let before = store.len().unwrap();
        let mut classifier = Classifier::default();
        let mut prompt = Scripted(vec![
            ReviewDecision::Reject,
            ReviewDecision::Reject,
        ]);

        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options {
                confidence: 0.5,
                interactive: true,
                write: true,
                ..Default::default()
            },
            Some(&mut prompt),
        )
        .unwrap();

        assert!(outcome
            .items
            .iter()
            .all(|item| item.state == ReviewState::Rejected));
        assert_eq!(outcome.written, 0);
        assert_eq!(store.len().unwrap(), before);
    }

    #[test]
    fn test_below_threshold_never_aborts_the_batch() {
        let mut store = seeded_store();
        let before = store.len().unwrap();
        let mut classifier = Classifier::default();

        // A bar nothing can clear: every transaction is reported as
        // needing manual categorization, and even with write set the log
        // stays untouched.
        let outcome = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options {
                confidence: 1.01,
                write: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.below_threshold, 2);
        assert_eq!(outcome.written, 0);
        assert_eq!(store.len().unwrap(), before);
    }

    #[test]
    fn test_insufficient_history_is_reported() {
        let mut store = MemoryEventStore::default();
        let mut classifier = Classifier::default();
        let result = auto_categorize(
            &mut store,
            &mut classifier,
            &uncategorized(),
            &Options::default(),
            None,
        );
        assert!(matches!(
            result.err(),
            Some(crate::errors::Error::InsufficientData { .. })
        ));
    }
}
