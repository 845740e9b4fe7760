use crate::selector::InjectionMode;
use colored::Colorize;
use itertools::Itertools;
use std::fmt::{self, Display};

/// Summary of one run handed back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub mode: InjectionMode,
    pub message: String,
    pub total_candidates: usize,
    /// Corrupted names, sorted
    pub corrupted_names: Vec<String>,
}

impl RunReport {
    /// Build the report of a run. With `detail` the corrupted names of
    /// partial and randomized runs are listed in the message.
    pub fn build(
        mode: InjectionMode,
        total_candidates: usize,
        corrupted_names: &[String],
        detail: bool,
    ) -> Self {
        let corrupted_names: Vec<String> = corrupted_names.iter().cloned().sorted().collect();
        let value = format!(
            "Fault Injected Image Value: {}/{}",
            corrupted_names.len(),
            total_candidates
        );

        let mut message = match mode {
            InjectionMode::Full => format!(
                "Full Injection Completed! Fault applied to all images.\n{}",
                value
            ),
            InjectionMode::PartialDeterministic { .. } => {
                format!("Partial Injection Completed!\n{}", value)
            }
            InjectionMode::Randomized => format!(
                "Randomized Injection Sequence Completed!\n\
                 ----------------------------------\n{}",
                value
            ),
        };
        if detail && mode != InjectionMode::Full {
            message.push_str("\nFault Injected Files:\n");
            message.push_str(&corrupted_names.join(", "));
        }

        Self {
            mode,
            message,
            total_candidates,
            corrupted_names,
        }
    }

    pub fn corrupted_count(&self) -> usize {
        self.corrupted_names.len()
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = self.message.lines();
        if let Some(first) = lines.next() {
            writeln!(f, "{}", first.green().bold())?;
        }
        for line in lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
