use crate::tables::{Align, Column, Table};
use augur_lib::engine::{Outcome, ReviewState};

fn state_image(state: &ReviewState) -> String {
    match state {
        ReviewState::Pending => "pending".to_string(),
        ReviewState::Approved => "staged".to_string(),
        ReviewState::Rejected => "rejected".to_string(),
        ReviewState::Modified(label) => format!("changed to {label}"),
    }
}

pub fn proposals_view(outcome: &Outcome, max_width: usize) -> String {
    let mut table = Table::new(vec![
        Column::new("Date", Align::Left),
        Column::new("Description", Align::Left).elastic(),
        Column::new("Amount", Align::Right),
        Column::new("Suggestion", Align::Left),
        Column::new("Conf", Align::Right),
        Column::new("State", Align::Left),
    ]);
    for item in &outcome.items {
        let txn = &item.proposal.transaction;
        table.add_row(vec![
            txn.date.to_string(),
            txn.description.clone(),
            txn.amount.to_string(),
            item.proposal.suggestion.label.clone(),
            format!("{:.0}%", item.proposal.suggestion.confidence * 100.0),
            state_image(&item.state),
        ]);
    }

    if table.is_empty() {
        "No transaction cleared the confidence threshold.\n".to_string()
    } else {
        table.render(max_width)
    }
}
