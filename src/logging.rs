/*!
 * Logging and tracing initialization
 *
 * One subscriber, one format layer; the sink decides the shape. Terminal
 * runs are for people watching a sync, so they get compact lines without
 * module targets. A log file is for support bundles, so it gets JSON lines
 * with source locations and thread ids that survive being grepped and
 * shipped.
 */

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Where log output lands; dictates the format
enum LogSink {
    Terminal,
    File(File),
}

impl LogSink {
    fn into_layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            LogSink::Terminal => fmt::layer()
                .compact()
                .with_target(false)
                .boxed(),
            LogSink::File(file) => fmt::layer()
                .json()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        }
    }
}

/// Initialize structured logging
///
/// `RUST_LOG` overrides the computed filter; without it, only `anemone`
/// events pass, at debug level when `verbose` is set.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> crate::error::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("anemone={level}")))
        .map_err(|e| crate::error::SyncError::Config(format!("bad log filter: {e}")))?;

    let sink = match log_file {
        Some(path) => LogSink::File(
            File::create(path)
                .map_err(|e| crate::error::SyncError::from_io(e, path))?,
        ),
        None => LogSink::Terminal,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(sink.into_layer())
        .init();
    Ok(())
}
