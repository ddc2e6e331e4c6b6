use std::fs;
use std::io;
use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

pub const ERROR_LOG: &str = "scale_errors.log";

/// Layer for the append-only error log: warnings and errors only, no colors.
pub fn error_log_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_level(true)
        .with_filter(LevelFilter::WARN)
}

/// Installs the global subscriber: INFO and above to the console, WARN and
/// above appended to `dir/scale_errors.log`. Keep the returned guard alive
/// until exit or buffered lines are lost.
pub fn setup_logging(dir: &Path) -> io::Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let file_appender = rolling::never(dir, ERROR_LOG);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(console)
        .with(error_log_layer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::scale::GROSS_COMMAND;
    use crate::devices::sim::{Reply, SimulatedScale};
    use crate::session::MeasurementSession;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn silent_scale_logs_a_warning_per_attempt() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::registry().with(error_log_layer(capture.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let mut conn = SimulatedScale::new().connect();
            assert!(conn.send_command(GROSS_COMMAND).is_err());
        });

        let text = capture.text();
        assert_eq!(text.matches("Empty response for command: SC.GROSS#1").count(), 3);
        assert!(!text.contains("Error sending command"));
        assert!(text.contains("Giving up on command SC.GROSS#1 after 3 attempts"));
    }

    #[test]
    fn error_log_keeps_warnings_and_errors_only() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::registry().with(error_log_layer(capture.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let mut session = MeasurementSession::new();
            session.attach(
                SimulatedScale::new()
                    .reply(GROSS_COMMAND, Reply::Silent)
                    .reply(GROSS_COMMAND, Reply::Line("12kg".into()))
                    .connect(),
            );
            assert!(session.read_weight().is_err());
        });

        let text = capture.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("Empty response for command: SC.GROSS#1"));
        assert!(text.contains("ERROR"));
        assert!(text.contains("Invalid weight response: 12kg"));
        assert!(!text.contains("Sending command"));
        assert!(!text.contains("Error sending command"));
    }
}
