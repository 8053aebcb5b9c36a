use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. A valid `RUST_LOG` replaces the
/// configured level entirely; otherwise the configured level applies to the
/// `pmon` crates and everything else logs errors only.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter(&config.level, from_env.as_deref())?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

fn filter(level: &str, from_env: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Some(filter) = from_env.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return Ok(filter);
    }
    Ok(EnvFilter::default().add_directive(format!("pmon={level}").parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directives_win_over_configured_level() {
        let rendered = filter("info", Some("pmon=trace")).unwrap().to_string();
        assert!(rendered.contains("pmon=trace"));
        assert!(!rendered.contains("pmon=info"));
    }

    #[test]
    fn configured_level_applies_without_env() {
        let rendered = filter("debug", None).unwrap().to_string();
        assert!(rendered.contains("pmon=debug"));

        let rendered = filter("warn", Some("pmon=loud")).unwrap().to_string();
        assert!(rendered.contains("pmon=warn"));
        assert!(filter("not a level!", None).is_err());
    }
}
