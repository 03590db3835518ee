// ABOUTME: Shared logging setup for tessera binaries.
// ABOUTME: Logs go to stderr so stdout stays free for keys and signatures.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr.
///
/// Default: WARN for everything, `crate_names` raised to INFO, or DEBUG when
/// `verbose` is set. RUST_LOG directives are applied on top.
pub fn init_for(crate_names: &[&str], verbose: bool) {
    let mut filter = EnvFilter::from_default_env().add_directive(Level::WARN.into());
    for directive in crate_directives(crate_names, verbose) {
        filter = filter.add_directive(
            directive
                .parse()
                .unwrap_or_else(|_| Level::INFO.into()),
        );
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_env_filter(filter)
        .init();
}

fn crate_directives(crate_names: &[&str], verbose: bool) -> Vec<String> {
    let level = if verbose { "debug" } else { "info" };
    crate_names
        .iter()
        // Crate names use dashes, tracing targets use underscores
        .map(|name| format!("{}={level}", name.replace('-', "_")))
        .collect()
}
