//! Binary entry point: opens the configured journal and prints the statistics
//! report over every stored melt. Data entry happens in the UI, not here.
use anyhow::Context;
use plavka_journal::{Journal, JournalConfig, SearchFilter};
use tracing_subscriber::EnvFilter;

/// Set up logging, load `~/.plavka-journal/config.toml` (or the defaults) and
/// print the report.
///
/// Errors such as an unwritable data directory surface through `anyhow` with
/// the underlying cause attached.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = JournalConfig::load_or_default().context("failed to load configuration")?;
    let journal = Journal::open(config).context("failed to open the melt journal")?;
    let statistics = journal
        .statistics(&SearchFilter::default())
        .context("failed to read melt records")?;
    println!("{statistics}");
    Ok(())
}
