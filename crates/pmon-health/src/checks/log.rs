use super::outcome;
use crate::definition::LogCheck;
use crate::error::{HealthError, Result};
use pmon_common::types::{HealthCheckOutcome, HealthStatus};
use regex::{Regex, RegexBuilder};

pub async fn run(name: &str, check: &LogCheck) -> Result<HealthCheckOutcome> {
    let errors = compile(&check.error_patterns)?;
    let warnings = compile(&check.warning_patterns)?;

    let path = check.path.clone();
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(outcome(
            name,
            HealthStatus::Degraded,
            format!("Log file not found: {}", path.display()),
        ));
    }

    let tail_lines = check.tail_lines;
    let read_path = path.clone();
    let (lines, size) = tokio::task::spawn_blocking(move || -> std::io::Result<(Vec<String>, u64)> {
        let bytes = std::fs::read(&read_path)?;
        let text = String::from_utf8_lossy(&bytes);
        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(tail_lines);
        Ok((all[start..].iter().map(|l| l.to_string()).collect(), bytes.len() as u64))
    })
    .await
    .map_err(|e| HealthError::Other(format!("log read panicked: {e}")))??;

    Ok(evaluate(
        name,
        check,
        &lines,
        &errors,
        &warnings,
        &path.display().to_string(),
        size,
    ))
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(HealthError::from)
        })
        .collect()
}

/// Counts matching lines (at most one error and one warning per line) and
/// grades them against `max_error_rate_per_minute`.
fn evaluate(
    name: &str,
    check: &LogCheck,
    lines: &[String],
    errors: &[Regex],
    warnings: &[Regex],
    log_file: &str,
    size_bytes: u64,
) -> HealthCheckOutcome {
    let error_count = lines
        .iter()
        .filter(|l| errors.iter().any(|re| re.is_match(l)))
        .count();
    let warning_count = lines
        .iter()
        .filter(|l| warnings.iter().any(|re| re.is_match(l)))
        .count();

    let max_errors = check.max_error_rate_per_minute as usize;
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();

    if error_count > max_errors {
        status = HealthStatus::Unhealthy;
        issues.push(format!("High error rate: {error_count} errors in recent logs"));
    } else if error_count > 0 {
        status = HealthStatus::Degraded;
        issues.push(format!("Errors found: {error_count} errors in recent logs"));
    }

    if warning_count > max_errors * 2 {
        if status == HealthStatus::Healthy {
            status = HealthStatus::Degraded;
        }
        issues.push(format!("High warning rate: {warning_count} warnings in recent logs"));
    }

    let message = if issues.is_empty() {
        "Log check passed".to_string()
    } else {
        issues.join("; ")
    };

    outcome(name, status, message)
        .with_detail("log_file", log_file)
        .with_detail("lines_checked", lines.len())
        .with_detail("error_count", error_count)
        .with_detail("warning_count", warning_count)
        .with_detail("file_size_mb", size_bytes as f64 / 1024.0 / 1024.0)
}
