use crate::global_settings::GlobalSettings;
use clap::{Arg, Command, arg};

pub(crate) fn build_cli() -> Command {
    Command::new("augur")
        .version("0.1")
        .about("Learn transaction categories from past decisions")
        .subcommand_required(true)
        .subcommand_precedence_over_arg(true) // --x val1 val2 subcommand
        .flatten_help(true) // show help for all subcommands
        .arg_required_else_help(true) // show full help if nothing given
        .args(GlobalSettings::cli())
        .subcommand(
            Command::new("train")
                .about("Replay the event log and train the classifier")
                .arg(min_samples()),
        )
        .subcommand(
            Command::new("auto-categorize")
                .about("Suggest categories for uncategorized transactions")
                .args([
                    arg!(--confidence [THRESHOLD]
                        "Minimum confidence before a suggestion is surfaced")
                    .default_value("0.7")
                    .value_parser(clap::value_parser!(f64)),
                    arg!(--account [ACCOUNT]
                        "Only consider transactions from this account"),
                    arg!(--limit [N] "Stop after this many transactions")
                        .value_parser(clap::value_parser!(usize)),
                    min_samples(),
                    arg!(--write
                        "Record the accepted suggestions in the event log \
                         (default is a dry-run)"),
                    arg!(-i --interactive
                        "Review each suggestion before it is staged"),
                ]),
        )
        .subcommand(
            Command::new("events")
                .about("Show the tail of the categorization event log")
                .args([
                    arg!(--account [ACCOUNT] "Only events for this account"),
                    arg!(--limit [N] "How many recent events to show")
                        .default_value("20")
                        .value_parser(clap::value_parser!(usize)),
                ]),
        )
        .subcommand(
            // Use    eval "$(augur completions zsh)"
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .help("The shell to generate the completions for")
                        .required(true)
                        .value_parser(clap::builder::EnumValueParser::<
                            clap_complete_command::Shell,
                        >::new()),
                ),
        )
}

fn min_samples() -> Arg {
    arg!(--"min-samples" [N]
        "Events required before a category joins the training set")
    .default_value("5")
    .value_parser(clap::value_parser!(usize))
}
