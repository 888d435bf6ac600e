use crate::error::FeedbackError;
use crate::feedback::FeedbackStore;
use crate::{FeedbackLabel, FeedbackRow, FineTuneRecord};
use regex::Regex;
use std::io::Write;
use std::sync::OnceLock;
use tracing::info;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+?\d[\d\-\s]{7,}\d").expect("phone pattern is valid"))
}

/// Best-effort masking of email addresses and phone numbers. Pattern based,
/// so unusual formats can slip through.
pub fn redact_pii(text: &str) -> String {
    let without_emails = email_pattern().replace_all(text, "[REDACTED_EMAIL]");
    phone_pattern()
        .replace_all(&without_emails, "[REDACTED_PHONE]")
        .into_owned()
}

pub fn fine_tune_record(row: &FeedbackRow) -> FineTuneRecord {
    let query = redact_pii(&row.query);
    let answer = redact_pii(&row.answer);
    FineTuneRecord {
        prompt: format!("User question:\n{query}\n\nAssistant:"),
        completion: format!(" {} END", answer.trim()),
    }
}

/// Writes one JSON object per line and returns how many were written.
pub fn write_jsonl<W: Write>(rows: &[FeedbackRow], mut writer: W) -> Result<usize, FeedbackError> {
    for row in rows {
        serde_json::to_writer(&mut writer, &fine_tune_record(row))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Exports every positively rated row from `store`.
pub async fn export_positive<W: Write>(
    store: &FeedbackStore,
    writer: W,
) -> Result<usize, FeedbackError> {
    let rows = store.rows_with_label(FeedbackLabel::Yes).await?;
    let written = write_jsonl(&rows, writer)?;
    info!(examples = written, "exported fine-tune examples");
    Ok(written)
}
