use std::ffi::OsStr;
use std::path::Path;

use anyhow::anyhow;
use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// Log to stderr and, when `file_path` is set, to a file as well.
///
/// Does nothing if a global subscriber is already installed.
pub fn install_logger(verbose: bool, file_path: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                // Backend crates are chatty, only keep their warnings.
                if path.starts_with("burn") && *m.level() > Level::WARN {
                    return false;
                }
            }
            true
        }));

    let file = match file_path {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            let writer = tracing_appender::rolling::never(directory, file_name);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    if registry().with(stderr).with(file).try_init().is_ok() {
        if let Some(path) = file_path {
            update_panic_hook(path);
        }
    }

    Ok(())
}

/// Directory and file name of a log file path.
fn split_log_path(path: &Path) -> anyhow::Result<(&Path, &OsStr)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("The log path '{}' does not name a file", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    Ok((directory, file_name))
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the run logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
