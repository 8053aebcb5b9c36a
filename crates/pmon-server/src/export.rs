//! Plain-text exposition of current state for pull-based scrapers.
//!
//! Every series is a gauge. Lines of one metric are contiguous and preceded
//! by a single `# HELP` / `# TYPE` pair.

use pmon_common::types::{Alert, ProjectSummary, Sample, SampleCategory, Severity, Tags};
use std::collections::BTreeMap;
use std::fmt::Write;

const PREFIX: &str = "pmon";

/// Per-project series rendered from project summaries. Project samples of
/// the same name are left out so each metric keeps one label set.
const SUMMARY_SERIES: [&str; 4] = ["running", "health_score", "cpu_percent", "memory_mb"];

struct Family {
    help: String,
    lines: Vec<String>,
}

#[derive(Default)]
struct Exposition {
    families: BTreeMap<String, Family>,
}

impl Exposition {
    fn push(&mut self, metric: String, help: impl FnOnce() -> String, line: String) {
        self.families
            .entry(metric)
            .or_insert_with(|| Family {
                help: help(),
                lines: Vec::new(),
            })
            .lines
            .push(line);
    }

    fn render(self) -> String {
        let mut out = String::new();
        for (metric, family) in self.families {
            let _ = writeln!(out, "# HELP {metric} {}", family.help);
            let _ = writeln!(out, "# TYPE {metric} gauge");
            for line in family.lines {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// Renders the latest samples, the project registry and the open alerts.
///
/// `samples` is expected to hold one (the latest) sample per series.
pub fn render(samples: &[Sample], projects: &[ProjectSummary], alerts: &[Alert]) -> String {
    let mut exposition = Exposition::default();

    for sample in samples {
        if sample.category == SampleCategory::Project && SUMMARY_SERIES.contains(&sample.name.as_str()) {
            continue;
        }
        let metric = metric_name(sample.category.as_str(), &sample.name);
        let line = format!(
            "{metric}{} {} {}",
            labels(&sample.tags),
            format_value(sample.value),
            sample.timestamp.timestamp_millis()
        );
        exposition.push(metric, || help_text(sample), line);
    }

    for project in projects {
        let mut tags = Tags::new();
        tags.insert("project".to_string(), project.project_name.clone());
        let label = labels(&tags);
        let series = [
            ("running", if project.is_running { 1.0 } else { 0.0 }, "Whether the project process is running"),
            ("health_score", project.health_score, "Composite project health score (0-100)"),
            ("cpu_percent", project.cpu_percent, "Project CPU usage in percent"),
            ("memory_mb", project.memory_mb, "Project resident memory in MB"),
        ];
        for (name, value, help) in series {
            let metric = metric_name(SampleCategory::Project.as_str(), name);
            let line = format!("{metric}{label} {}", format_value(value));
            exposition.push(metric, || help.to_string(), line);
        }
    }

    let metric = format!("{PREFIX}_alerts_active");
    let help = || "Open alerts, in total and by severity".to_string();
    exposition.push(metric.clone(), help, format!("{metric} {}", alerts.len()));
    for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
        let count = alerts.iter().filter(|a| a.severity == severity).count();
        let mut tags = Tags::new();
        tags.insert("severity".to_string(), severity.to_string());
        exposition.push(metric.clone(), help, format!("{metric}{} {count}", labels(&tags)));
    }

    exposition.render()
}

fn help_text(sample: &Sample) -> String {
    if sample.unit.is_empty() {
        format!("{} metric {}", sample.category, sample.name)
    } else {
        format!("{} metric {} ({})", sample.category, sample.name, sample.unit)
    }
}

/// `pmon_{category}_{name}` with characters outside `[a-zA-Z0-9_]`
/// replaced by `_`.
pub fn metric_name(category: &str, name: &str) -> String {
    sanitize(&format!("{PREFIX}_{category}_{name}"))
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `{k="v",...}` in key order, or nothing for an empty tag map.
pub fn labels(tags: &Tags) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = tags
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", sanitize(k), escape_label_value(v)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label_value("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn metric_names_are_sanitized() {
        assert_eq!(metric_name("disk", "usage.percent"), "pmon_disk_usage_percent");
        assert_eq!(metric_name("project_custom", "queue-depth"), "pmon_project_custom_queue_depth");
    }

    #[test]
    fn empty_state_still_reports_alert_counts() {
        let text = render(&[], &[], &[]);
        assert!(text.starts_with("# HELP pmon_alerts_active"));
        assert!(text.contains("\npmon_alerts_active 0\n"));
        assert!(text.contains("pmon_alerts_active{severity=\"critical\"} 0\n"));
        assert!(text.ends_with('\n'));
    }
}
