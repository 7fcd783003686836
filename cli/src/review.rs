use augur_lib::engine::{Proposal, ReviewDecision, ReviewPrompt};
use augur_lib::errors::Result;
use console::{Term, style};

/// Terminal-backed review loop: one proposal at a time, answered with a
/// single letter.  Quit is always available and never an error; the engine
/// keeps whatever was already decided.
pub struct ConsolePrompt {
    term: Term,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        ConsolePrompt {
            term: Term::stderr(),
        }
    }
}

impl ReviewPrompt for ConsolePrompt {
    fn review(
        &mut self,
        index: usize,
        total: usize,
        proposal: &Proposal,
    ) -> Result<ReviewDecision> {
        let txn = &proposal.transaction;
        self.term.write_line("")?;
        self.term.write_line(&format!(
            "[{}/{}] {}  {}  {}",
            index + 1,
            total,
            txn.date,
            style(&txn.description).bold(),
            txn.amount,
        ))?;
        self.term.write_line(&format!(
            "      suggested: {} ({:.0}%)",
            style(&proposal.suggestion.label).cyan(),
            proposal.suggestion.confidence * 100.0,
        ))?;

        loop {
            self.term
                .write_str("      [a]pprove  [r]eject  [m]odify  [q]uit > ")?;
            let answer = self.term.read_line()?;
            match answer.trim() {
                "a" | "A" => return Ok(ReviewDecision::Approve),
                "r" | "R" => return Ok(ReviewDecision::Reject),
                "q" | "Q" => return Ok(ReviewDecision::Quit),
                "m" | "M" => {
                    self.term.write_str("      new category: ")?;
                    let label = self.term.read_line()?;
                    let label = label.trim();
                    if label.is_empty() {
                        self.term.write_line(
                            "      empty category, suggestion kept pending",
                        )?;
                        continue;
                    }
                    return Ok(ReviewDecision::Modify(label.to_string()));
                }
                "" => continue,
                other => {
                    self.term.write_line(&format!(
                        "      unknown answer {:?}",
                        other
                    ))?;
                }
            }
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}
