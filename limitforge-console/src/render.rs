//! Text rendering for console output.

use limitforge::types::{HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER};
use limitforge::{CheckDecision, CheckError, CheckRequest, FailureKind, HealthStatus};
use std::fmt::Write;

const METER_WIDTH: usize = 20;

/// Status badge for the health probe.
pub fn health_badge(result: &Result<HealthStatus, CheckError>) -> String {
    match result {
        Ok(status) => match status.version.as_deref() {
            Some(version) if !version.is_empty() => format!("Online v{version}"),
            _ => "Online".to_string(),
        },
        Err(err) if err.kind() == FailureKind::Transport => "Offline".to_string(),
        Err(_) => "Degraded".to_string(),
    }
}

/// Equivalent curl command for a check.
pub fn curl_snippet(base_url: &str, api_key: &str, request: &CheckRequest) -> String {
    let payload = serde_json::to_string(request).unwrap_or_default();
    [
        "curl -i -X POST".to_string(),
        format!("{}/v1/check", base_url.trim_end_matches('/')),
        format!("-H \"X-API-Key: {api_key}\""),
        "-H 'Content-Type: application/json'".to_string(),
        format!("-d '{payload}'"),
    ]
    .join(" \\\n  ")
}

/// One-word verdict for a check outcome.
pub fn verdict(result: &Result<CheckDecision, CheckError>) -> String {
    match result {
        Ok(decision) if decision.allowed() => "ALLOWED".to_string(),
        Ok(_) => "BLOCKED".to_string(),
        Err(CheckError::Protocol { status, .. }) => format!("ERROR {status}"),
        Err(err) if err.kind() == FailureKind::Transport => "NETWORK ERROR".to_string(),
        Err(err) => format!("ERROR {}", err.kind()),
    }
}

/// Fill bar for `remaining / limit`.
pub fn meter(remaining: u64, limit: u64) -> String {
    if limit == 0 {
        return format!("[{}] Remaining —", " ".repeat(METER_WIDTH));
    }
    let pct = ((remaining.min(limit) as f64 / limit as f64) * 100.0).round() as usize;
    let filled = pct * METER_WIDTH / 100;
    format!(
        "[{}{}] {:>3}% Remaining {}/{}",
        "#".repeat(filled),
        " ".repeat(METER_WIDTH - filled),
        pct,
        remaining,
        limit
    )
}

/// Rate-limit header block, `-` for absent values.
pub fn header_block(decision: &CheckDecision) -> String {
    let mut out = String::new();
    for name in [HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER] {
        let value = decision.headers().get(name).map(String::as_str).unwrap_or("-");
        let _ = writeln!(out, "  {name:<22} {value}");
    }
    out
}

/// One line of the history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub allowed: bool,
    pub remaining: u64,
    pub limit: u64,
    pub subject: String,
}

impl HistoryRow {
    pub fn from_decision(decision: &CheckDecision, subject: &str) -> Self {
        Self {
            allowed: decision.allowed(),
            remaining: decision.remaining(),
            limit: decision.limit(),
            subject: subject.to_string(),
        }
    }
}

pub fn history_table(rows: &[HistoryRow]) -> String {
    let mut out = String::from("  #   verdict  remaining  subject\n");
    for (i, row) in rows.iter().enumerate() {
        let verdict = if row.allowed { "ALLOWED" } else { "BLOCKED" };
        let _ = writeln!(
            out,
            "  {:<3} {:<8} {:>4}/{:<4}  {}",
            i + 1,
            verdict,
            row.remaining,
            row.limit,
            row.subject
        );
    }
    out
}
