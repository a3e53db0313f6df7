//! Tracing setup for AgentVerse binaries.
//!
//! Pipeline output goes to stdout, so every log line is written to stderr.
//! HTTP client internals are held at `warn` unless `RUST_LOG` says otherwise.

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Log level for the CLI's `--verbose` switch.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `RUST_LOG` when set, otherwise `level` with noisy dependencies quieted.
fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,rustls=warn",
            level.as_str().to_ascii_lowercase()
        ))
    })
}

fn build_subscriber<W>(
    json: bool,
    filter: EnvFilter,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        Box::new(registry.with(fmt::layer().with_target(false).with_writer(writer).json()))
    } else {
        Box::new(registry.with(fmt::layer().with_target(false).with_writer(writer)))
    }
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let subscriber = build_subscriber(json, default_filter(level), std::io::stderr);
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::obs::{emit_manipulation_failed, emit_pipeline_started};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn capture(json: bool, directive: &str, emit: impl FnOnce()) -> Vec<String> {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = build_subscriber(json, EnvFilter::new(directive), move || writer.clone());
        tracing::subscriber::with_default(subscriber, emit);
        out.lines()
    }

    #[test]
    fn test_level_for_verbose() {
        assert_eq!(level_for(true), Level::DEBUG);
        assert_eq!(level_for(false), Level::INFO);
    }

    #[test]
    fn test_json_lines_carry_event_fields() {
        let lines = capture(true, "info", || emit_pipeline_started("run-json", 3));

        assert_eq!(lines.len(), 1);
        let line: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["event"], "pipeline.started");
        assert_eq!(line["fields"]["run_id"], "run-json");
        assert_eq!(line["fields"]["stage_count"], 3);
    }

    #[test]
    fn test_text_output_respects_filter() {
        let lines = capture(false, "warn", || {
            emit_pipeline_started("run-text", 1);
            emit_manipulation_failed("filter", &"store down", true);
        });

        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("manipulation.failed"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
