use anyhow::{Context, Result};
use augur_lib::store::JsonlEventStore;
use augur_lib::transactions::Transaction;
use clap::{Arg, ArgMatches, arg};
use std::path::PathBuf;

pub struct GlobalSettings {
    // Where the categorization event log lives.
    pub store_path: PathBuf,

    // JSON export of the transactions to categorize.  This is the boundary
    // with the ledger: importing and normalizing bank data happens upstream.
    pub transactions_path: Option<PathBuf>,
}

impl GlobalSettings {
    /// Return the command line switches to configure the global settings
    pub fn cli() -> impl IntoIterator<Item = Arg> {
        [
            arg!(--store [FILE] "Path of the categorization event log")
                .default_value("events.jsonl")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
            arg!(--transactions [FILE]
                "JSON array of transactions to categorize")
            .value_parser(clap::value_parser!(PathBuf))
            .global(true),
        ]
    }

    /// Create the settings from the command line arguments.
    pub fn new(args: &ArgMatches) -> Self {
        GlobalSettings {
            store_path: args
                .get_one::<PathBuf>("store")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("events.jsonl")),
            transactions_path: args.get_one::<PathBuf>("transactions").cloned(),
        }
    }

    pub fn open_store(&self) -> Result<JsonlEventStore> {
        JsonlEventStore::open(&self.store_path).with_context(|| {
            format!("cannot open event log {}", self.store_path.display())
        })
    }

    pub fn load_transactions(&self) -> Result<Vec<Transaction>> {
        let path = self.transactions_path.as_ref().context(
            "no transactions given, pass --transactions FILE \
             (a JSON array exported by the ledger)",
        )?;
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("cannot parse {}", path.display()))
    }
}
