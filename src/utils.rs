use std::fmt::Display;
use std::time::Instant;

use console::Style;
use indicatif::ProgressStyle;

const ANSI_BLUE: Style = Style::new().blue();

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Style of a single running task.
pub(crate) fn style_task() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Style of a whole run, one tick per finished task.
pub(crate) fn style_bar() -> ProgressStyle {
    let template = "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Installs the global subscriber: an env filter (`RUST_LOG`, `info` by
/// default), a fmt layer and the indicatif layer drawing task spinners. Log
/// lines are routed through indicatif so they don't tear the progress bars.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt = fmt::layer()
        .with_target(false)
        .with_writer(indicatif.get_stderr_writer());

    // Ignored when a subscriber is already installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(indicatif)
        .try_init();
}
