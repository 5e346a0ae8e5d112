//! Terminal rendering helpers

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use veritas_foundation::PipelineOutcome;
use veritas_foundation::RefinementStatus;
use veritas_foundation::registry::RegistrationInfo;
use veritas_kernel::{FeedbackEvent, Score};

pub fn models_table(rows: &[RegistrationInfo], health: Option<&[String]>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec!["model", "provider", "capabilities", "max concurrent", "default"];
    if health.is_some() {
        header.push("health");
    }
    table.set_header(header);

    for (i, row) in rows.iter().enumerate() {
        let caps = row
            .capabilities
            .iter()
            .map(|(tag, score)| format!("{tag} ({score:.2})"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut cells = vec![
            row.model_id.clone(),
            row.provider.clone(),
            caps,
            row.max_concurrent.to_string(),
            if row.default { "yes".into() } else { String::new() },
        ];
        if let Some(health) = health {
            cells.push(health.get(i).cloned().unwrap_or_default());
        }
        table.add_row(cells);
    }
    table
}

fn score_line(score: &Score) -> String {
    format!(
        "{:.3} (format {:.2}, relevance {:.2}, safety {:.2}; threshold {:.2})",
        score.overall,
        score.format.value,
        score.relevance.value,
        score.safety.value,
        score.threshold
    )
}

pub fn print_outcome(outcome: &PipelineOutcome) {
    let status = match outcome.status {
        RefinementStatus::Accepted => "accepted".green().bold(),
        RefinementStatus::Exhausted => "exhausted".yellow().bold(),
    };
    println!("{} {}", "Status:".bold(), status);
    println!("{} {}", "Request:".bold(), outcome.request_id);
    println!("{} {}", "Model:".bold(), outcome.candidate.backend_id.cyan());
    if let Some(verdict) = &outcome.verdict {
        println!(
            "{} {:.2} over {}/{} samples",
            "Agreement:".bold(),
            verdict.agreement_ratio,
            verdict.samples_succeeded,
            verdict.samples_requested
        );
    }
    println!("{} {}", "Score:".bold(), score_line(&outcome.score));
    println!("{} {}", "Revisions:".bold(), outcome.steps.len().saturating_sub(1));
    println!();
    println!("{}", outcome.candidate.text);
}

pub fn print_events(events: &[FeedbackEvent]) {
    if events.is_empty() {
        return;
    }
    eprintln!("{}", "Feedback events:".bold());
    for event in events {
        eprintln!("  - {} ({})", event.kind(), event.source);
    }
}
