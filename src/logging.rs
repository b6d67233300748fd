use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "reportcardd=info";

/// Installs the global subscriber. Logs always go to stderr; stdout carries
/// the IPC responses.
pub fn init_tracing(directive: Option<&str>, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let directive = directive.unwrap_or(DEFAULT_DIRECTIVE);
    let filter = EnvFilter::try_new(if directive.contains('=') {
        directive.to_string()
    } else {
        format!("reportcardd={}", directive)
    })
    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }
    Ok(())
}
