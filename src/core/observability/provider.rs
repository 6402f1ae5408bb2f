use crate::app::config::{FileRotation, LogType, LoggingConfig};
use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

type DynLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>;

/// Wire up the tracing subscriber from the logging config.
///
/// Each configured sink becomes a fmt layer, span export per sink
/// is opt-in. Writers are non blocking, their flush guards are
/// deliberately leaked since logging lives for the whole process.
pub fn init(config: &LoggingConfig) -> Result<()> {
    config.validate()?;

    let crate_name = env!("CARGO_PKG_NAME");
    let filter = EnvFilter::from_default_env()
        .add_directive("error".parse()?)
        .add_directive(format!("{}={}", crate_name, config.level).parse()?);

    let mut layers: Vec<DynLayer> = Vec::new();

    for sink in &config.sinks {
        let span_events = if sink.spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match &sink.dest {
            LogType::Stdout { color, json } => {
                let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
                std::mem::forget(guard);

                if *json {
                    layers.push(
                        fmt::layer()
                            .json()
                            .with_writer(non_blocking)
                            .with_span_events(span_events)
                            .boxed(),
                    );
                } else {
                    layers.push(
                        fmt::layer()
                            .compact()
                            .with_ansi(*color)
                            .with_writer(non_blocking)
                            .with_span_events(span_events)
                            .boxed(),
                    );
                }
            }
            LogType::File {
                path,
                json,
                rotation,
            } => {
                let writer = file_writer(path, rotation)?;

                if *json {
                    layers.push(
                        fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_span_events(span_events)
                            .boxed(),
                    );
                } else {
                    layers.push(
                        fmt::layer()
                            .compact()
                            .with_ansi(false)
                            .with_writer(writer)
                            .with_span_events(span_events)
                            .boxed(),
                    );
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

fn file_writer(
    path: &Path,
    rotation: &FileRotation,
) -> Result<tracing_appender::non_blocking::NonBlocking> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Invalid file name in path: {}", path.display()))?;

    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("Invalid directory in path: {}", path.display()))?;

    if !directory.as_os_str().is_empty() {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }

    let appender = match rotation {
        FileRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
        FileRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
        FileRotation::Never => tracing_appender::rolling::never(directory, file_name),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    std::mem::forget(guard);

    Ok(non_blocking)
}
