use std::path::Path;
use std::sync::Arc;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::AppResult;

/// Wire up stderr logging, honoring `-v`/`-q` and the `REPUSH_LOG` env var.
///
/// When `log_file` is given, every event is also mirrored, ANSI-free, to
/// that file, so a run leaves a plaintext record behind even when nobody
/// watched the terminal.
pub fn setup_logger(
    verbosity: &Verbosity<InfoLevel>,
    log_file: Option<&Path>,
) -> AppResult<()> {
    let indicatif_layer = IndicatifLayer::new();

    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .with_env_var("REPUSH_LOG")
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_writer(indicatif_layer.get_stderr_writer())
        .pretty();

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(indicatif_layer)
        .with(env_filter)
        .init();
    Ok(())
}
