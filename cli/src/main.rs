mod args;
mod global_settings;
mod metrics_view;
mod proposals_view;
mod review;
mod tables;

use crate::global_settings::GlobalSettings;
use crate::metrics_view::{importance_view, metrics_view};
use crate::proposals_view::proposals_view;
use crate::review::ConsolePrompt;
use anyhow::Result;
use augur_lib::classifier::Classifier;
use augur_lib::engine::{self, ReviewPrompt};
use augur_lib::events::EventFilter;
use augur_lib::store::EventStore;
use augur_lib::training::TrainingSet;
use augur_lib::transactions::AccountId;
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

fn main() -> Result<()> {
    env_logger::init();

    let matches = args::build_cli().get_matches();
    let globals = GlobalSettings::new(&matches);

    match matches.subcommand() {
        Some(("train", sub)) => train(&globals, sub),
        Some(("auto-categorize", sub)) => auto_categorize(&globals, sub),
        Some(("events", sub)) => events(&globals, sub),
        Some(("completions", sub)) => {
            if let Some(shell) =
                sub.get_one::<clap_complete_command::Shell>("shell")
            {
                shell.generate(&mut args::build_cli(), &mut std::io::stdout());
            }
            Ok(())
        }
        _ => Ok(()), // subcommand_required
    }
}

fn training_progress() -> ProgressBar {
    ProgressBar::new_spinner()
        .with_style(
            ProgressStyle::with_template("{spinner} {msg} {elapsed_precise}")
                .unwrap(),
        )
        .with_message("training model")
}

fn train(globals: &GlobalSettings, args: &ArgMatches) -> Result<()> {
    let min_samples = args.get_one::<usize>("min-samples").copied().unwrap_or(5);
    let store = globals.open_store()?;
    let history = store.query(&EventFilter::default())?;

    let progress = training_progress();
    let set = TrainingSet::build(&history, min_samples)?;
    let mut classifier = Classifier::default();
    let metrics = classifier.train(&set)?;
    progress.finish_and_clear();

    println!("{}", metrics_view(&metrics));
    println!("{}", importance_view(&classifier.feature_importance(10)?));
    Ok(())
}

fn auto_categorize(globals: &GlobalSettings, args: &ArgMatches) -> Result<()> {
    let options = engine::Options {
        confidence: args
            .get_one::<f64>("confidence")
            .copied()
            .unwrap_or(engine::DEFAULT_CONFIDENCE),
        account: args
            .get_one::<String>("account")
            .map(|a| AccountId(a.clone())),
        limit: args.get_one::<usize>("limit").copied(),
        min_samples: args
            .get_one::<usize>("min-samples")
            .copied()
            .unwrap_or(engine::DEFAULT_MIN_SAMPLES),
        write: args.get_flag("write"),
        interactive: args.get_flag("interactive"),
    };

    let mut store = globals.open_store()?;
    let transactions = globals.load_transactions()?;
    debug!(
        "loaded {} transaction(s) from {:?}",
        transactions.len(),
        globals.transactions_path
    );
    let mut classifier = Classifier::default();

    let mut prompt = ConsolePrompt::new();
    let reviewer: Option<&mut dyn ReviewPrompt> = if options.interactive {
        Some(&mut prompt)
    } else {
        None
    };
    // No spinner in interactive mode, it would fight the prompt for the
    // terminal.
    let progress = if options.interactive {
        None
    } else {
        Some(training_progress())
    };
    let result = engine::auto_categorize(
        &mut store,
        &mut classifier,
        &transactions,
        &options,
        reviewer,
    );
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let outcome = result?;

    println!(
        "Model: {} categories from {} samples, test accuracy {:.0}%",
        outcome.metrics.num_categories,
        outcome.metrics.total_samples,
        outcome.metrics.test_accuracy * 100.0,
    );
    let width = terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80);
    println!("{}", proposals_view(&outcome, width));

    if outcome.below_threshold > 0 {
        println!(
            "{} transaction(s) below the confidence threshold need manual \
             categorization.",
            outcome.below_threshold
        );
    }
    if options.write {
        println!("Recorded {} categorization event(s).", outcome.written);
    } else {
        println!(
            "Dry-run: nothing recorded.  Pass --write to keep the staged \
             suggestions."
        );
    }
    Ok(())
}

fn events(globals: &GlobalSettings, args: &ArgMatches) -> Result<()> {
    use crate::tables::{Align, Column, Table};

    let store = globals.open_store()?;
    let filter = EventFilter {
        account: args
            .get_one::<String>("account")
            .map(|a| AccountId(a.clone())),
        since: None,
        limit: args.get_one::<usize>("limit").copied(),
    };

    let mut table = Table::new(vec![
        Column::new("When", Align::Left),
        Column::new("Source", Align::Left),
        Column::new("Description", Align::Left).elastic(),
        Column::new("Amount", Align::Right),
        Column::new("Category", Align::Left),
    ]);
    for ev in store.query(&filter)? {
        table.add_row(vec![
            ev.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            ev.source.to_string(),
            ev.description.clone(),
            ev.amount.to_string(),
            ev.label(),
        ]);
    }
    if table.is_empty() {
        println!("The event log is empty.");
    } else {
        let width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);
        print!("{}", table.render(width));
    }
    Ok(())
}
