use crate::Result;

/// Initialize tracing for the CLI.
///
/// Logs go to stderr so stdout stays clean for JSONL output. Quiet by default;
/// `RUST_LOG` overrides the filter.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,tgcli=info,tgcli_core=info,{service_name}=info"))
    });

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    Ok(())
}
