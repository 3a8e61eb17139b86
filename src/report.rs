// SPDX-License-Identifier: PMPL-1.0-or-later

//! Terminal output for experiment records and recover outcomes

use crate::attack::RecoverOutcome;
use crate::types::{ExperimentRecord, ExperimentStatus};
use colored::*;

pub fn print_records(records: &[ExperimentRecord]) {
    if records.is_empty() {
        println!("No attacks recorded.");
        return;
    }

    println!(
        "{}",
        format!(
            "{:<36}  {:<14}  {:<6}  {:<15}  {}",
            "UID", "KIND", "ACTION", "STATUS", "CREATED"
        )
        .bold()
    );
    for record in records {
        let action = record.action.map(|a| a.as_str()).unwrap_or("-");
        println!(
            "{:<36}  {:<14}  {:<6}  {:<15}  {}",
            record.uid,
            record.kind,
            action,
            status_label(record.status),
            record.created_at
        );
    }
}

fn status_label(status: ExperimentStatus) -> ColoredString {
    // Pad before colouring; escape codes would break the column width.
    let text = format!("{:<15}", status.as_str());
    match status {
        ExperimentStatus::Running => text.yellow(),
        ExperimentStatus::Recovered => text.green(),
        ExperimentStatus::Failed | ExperimentStatus::RecoverFailed => text.red(),
        ExperimentStatus::Pending => text.normal(),
    }
}

pub fn describe_outcome(uid: &str, outcome: &RecoverOutcome) -> String {
    match outcome {
        RecoverOutcome::Terminated { pid } => {
            format!("Recover attack {uid} successfully, terminated pid {pid}")
        }
        RecoverOutcome::AlreadyGone { pid } => {
            format!("Recover attack {uid} successfully, pid {pid} had already exited")
        }
        RecoverOutcome::NotStressTool { pid, name } => format!(
            "Recover attack {uid} successfully, pid {pid} now belongs to {name:?} and was left alone"
        ),
    }
}
