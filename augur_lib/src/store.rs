use crate::errors::{Error, Result};
use crate::events::{CategorizationEvent, EventFilter, EventId};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// The append-only log of categorization decisions.
///
/// This is the single source of truth for "what was decided and why", shared
/// by everything in the surrounding application that categorizes
/// transactions.  It is injected where needed rather than being a process
/// global, so tests can substitute an in-memory store.
///
/// `append` is the only mutation.  `query` never mutates and is repeatable:
/// two identical queries over an unchanged log return identical sequences,
/// which training relies on for determinism.
pub trait EventStore {
    /// Durably record one event.  When this returns Ok the event is on
    /// stable storage; on Err nothing was recorded.
    fn append(&mut self, event: CategorizationEvent) -> Result<EventId>;

    /// Events matching the filter, ordered by (timestamp, append order)
    /// ascending.  `filter.limit` keeps only the most recent N, still
    /// returned in ascending order.
    fn query(&self, filter: &EventFilter) -> Result<Vec<CategorizationEvent>>;

    /// Total number of events in the log.
    fn len(&self) -> Result<usize>;
}

fn matches(event: &CategorizationEvent, filter: &EventFilter) -> bool {
    if let Some(acc) = &filter.account {
        if event.account != *acc {
            return false;
        }
    }
    if let Some(since) = &filter.since {
        if event.timestamp < *since {
            return false;
        }
    }
    true
}

/// Sort by timestamp, then by append order for equal timestamps, and apply
/// the filter's limit.  Shared by both store implementations so they cannot
/// drift apart.
fn finish_query(
    mut events: Vec<(EventId, CategorizationEvent)>,
    filter: &EventFilter,
) -> Vec<CategorizationEvent> {
    events.sort_by(|(id_a, ev_a), (id_b, ev_b)| {
        ev_a.timestamp.cmp(&ev_b.timestamp).then(id_a.cmp(id_b))
    });
    if let Some(limit) = filter.limit {
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
    }
    events.into_iter().map(|(_, ev)| ev).collect()
}

/// Event log persisted as one JSON object per line.
///
/// The format is append-friendly: recording an event only ever adds a line,
/// and a crash can at worst leave a torn final line, which is skipped on
/// read (it was never acknowledged as appended).
pub struct JsonlEventStore {
    path: PathBuf,

    // Number of events currently in the file, so append can hand out the
    // next sequence number without re-reading the log.
    count: u64,
}

impl JsonlEventStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let count = if path.exists() {
            Self::read_all(path)?.len() as u64
        } else {
            0
        };
        Ok(JsonlEventStore {
            path: path.to_path_buf(),
            count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(path: &Path) -> Result<Vec<(EventId, CategorizationEvent)>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CategorizationEvent>(&line) {
                Ok(ev) => {
                    events.push((EventId(events.len() as u64 + 1), ev));
                }
                Err(err) => {
                    // Most likely a torn line from an interrupted write,
                    // which was never acknowledged.  Keep the valid prefix.
                    warn!(
                        "{}:{}: skipping unreadable event record ({})",
                        path.display(),
                        lineno + 1,
                        err
                    );
                }
            }
        }
        Ok(events)
    }
}

impl EventStore for JsonlEventStore {
    fn append(&mut self, event: CategorizationEvent) -> Result<EventId> {
        // Serialize before touching the file so a bad record cannot leave
        // a partial line behind.
        let json = serde_json::to_string(&event)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.flush()?;
        file.sync_all().map_err(Error::Storage)?;

        self.count += 1;
        Ok(EventId(self.count))
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<CategorizationEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let events = Self::read_all(&self.path)?
            .into_iter()
            .filter(|(_, ev)| matches(ev, filter))
            .collect();
        Ok(finish_query(events, filter))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.count as usize)
    }
}

/// Vec-backed store, for tests and for callers that replay an external log
/// themselves.
#[derive(Default)]
pub struct MemoryEventStore {
    events: Vec<CategorizationEvent>,
}

impl EventStore for MemoryEventStore {
    fn append(&mut self, event: CategorizationEvent) -> Result<EventId> {
        self.events.push(event);
        Ok(EventId(self.events.len() as u64))
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<CategorizationEvent>> {
        let events = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, ev)| matches(ev, filter))
            .map(|(idx, ev)| (EventId(idx as u64 + 1), ev.clone()))
            .collect();
        Ok(finish_query(events, filter))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.events.len())
    }
}
