//! Runs a [`MeasurementSession`] on its own thread so device I/O (settle
//! delays, retries, read timeouts) never blocks the caller.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use crate::devices::scale::Connection;
use crate::error::{Result, ScaleError};
use crate::session::data::{LogEntry, Measurements, Slot};
use crate::session::export::{CsvExporter, Exporter};
use crate::session::MeasurementSession;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Connect(String),
    Zero,
    Record(Slot),
    Export(PathBuf),
    Disconnect,
    Status,
}

enum Message {
    Run(Request),
    Shutdown,
}

#[derive(Debug)]
pub enum Event {
    Connected(String),
    Zeroed,
    Recorded { slot: Slot, weight: f64, measurements: Measurements },
    Exported { path: PathBuf, entry: LogEntry },
    Disconnected,
    Status { port: Option<String>, measurements: Measurements },
    Failed { request: Request, error: ScaleError },
}

pub struct SessionWorker {
    requests: Sender<Message>,
    events: Receiver<Event>,
    handle: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Starts the worker thread. `opener` is used for every `Connect`
    /// request; exports go through [`CsvExporter`].
    pub fn spawn<T, F>(opener: F) -> Self
    where
        T: Read + Write + 'static,
        F: FnMut(&str) -> Result<Connection<T>> + Send + 'static,
    {
        Self::spawn_with_exporter(opener, CsvExporter)
    }

    pub fn spawn_with_exporter<T, F, E>(mut opener: F, exporter: E) -> Self
    where
        T: Read + Write + 'static,
        F: FnMut(&str) -> Result<Connection<T>> + Send + 'static,
        E: Exporter + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<Message>();
        let (event_tx, event_rx) = mpsc::channel::<Event>();

        let handle = thread::spawn(move || {
            info!("Session worker started");
            let mut session = MeasurementSession::<T>::new();

            for message in request_rx {
                let Message::Run(request) = message else {
                    break;
                };

                let event = match handle_request(&mut session, &mut opener, &exporter, &request) {
                    Ok(event) => event,
                    Err(error) => Event::Failed { request, error },
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }

            session.disconnect();
            info!("Session worker stopped");
        });

        SessionWorker {
            requests: request_tx,
            events: event_rx,
            handle: Some(handle),
        }
    }

    pub fn send(&self, request: Request) -> bool {
        self.requests.send(Message::Run(request)).is_ok()
    }

    /// Waits up to `timeout` for the next event. `None` on timeout or when
    /// the worker has stopped.
    pub fn poll(&self, timeout: Duration) -> Option<Event> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Sends a request and blocks until its event arrives, calling `tick`
    /// between polls.
    pub fn call(&self, request: Request, mut tick: impl FnMut()) -> Option<Event> {
        if !self.send(request) {
            return None;
        }
        loop {
            if let Some(event) = self.poll(Duration::from_millis(250)) {
                return Some(event);
            }
            if !self.is_running() {
                return None;
            }
            tick();
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Session worker panicked");
            }
        }
    }
}

fn handle_request<T, F, E>(
    session: &mut MeasurementSession<T>,
    opener: &mut F,
    exporter: &E,
    request: &Request,
) -> Result<Event>
where
    T: Read + Write,
    F: FnMut(&str) -> Result<Connection<T>>,
    E: Exporter,
{
    match request {
        Request::Connect(port) => {
            session.disconnect();
            let connection = opener(port.as_str())?;
            session.attach(connection);
            Ok(Event::Connected(port.clone()))
        }
        Request::Zero => session.zero().map(|_| Event::Zeroed),
        Request::Record(slot) => session.record(*slot).map(|weight| Event::Recorded {
            slot: *slot,
            weight,
            measurements: session.measurements(),
        }),
        Request::Export(path) => session.export(path, exporter).map(|entry| Event::Exported {
            path: path.clone(),
            entry,
        }),
        Request::Disconnect => {
            session.disconnect();
            Ok(Event::Disconnected)
        }
        Request::Status => Ok(Event::Status {
            port: session.port_name().map(str::to_string),
            measurements: session.measurements(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::scale::{GROSS_COMMAND, ZERO_COMMAND};
    use crate::devices::sim::{Reply, SimulatedScale};

    const WAIT: Duration = Duration::from_secs(5);

    fn sim_worker(make: fn() -> SimulatedScale) -> SessionWorker {
        SessionWorker::spawn(move |_port: &str| Ok(make().connect()))
    }

    #[test]
    fn answers_each_request_with_one_event() {
        let worker = sim_worker(|| {
            SimulatedScale::new()
                .reply(ZERO_COMMAND, Reply::Line("OK".into()))
                .reply(GROSS_COMMAND, Reply::Line("5.00".into()))
        });

        worker.send(Request::Connect("SIM".into()));
        assert!(matches!(worker.poll(WAIT), Some(Event::Connected(p)) if p == "SIM"));

        worker.send(Request::Zero);
        assert!(matches!(worker.poll(WAIT), Some(Event::Zeroed)));

        worker.send(Request::Record(Slot::First));
        assert!(matches!(
            worker.poll(WAIT),
            Some(Event::Recorded { slot: Slot::First, weight, measurements })
                if weight == 5.0 && measurements.second.is_none()
        ));

        worker.send(Request::Status);
        assert!(matches!(
            worker.poll(WAIT),
            Some(Event::Status { port: Some(p), measurements })
                if p == "SIM" && measurements.first == Some(5.0)
        ));

        assert!(worker.poll(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn failures_carry_the_request() {
        let worker = sim_worker(SimulatedScale::new);

        let event = worker.call(Request::Zero, || {});
        assert!(matches!(
            event,
            Some(Event::Failed { request: Request::Zero, error: ScaleError::NotConnected })
        ));

        let event = worker.call(Request::Export(PathBuf::from("never.csv")), || {});
        assert!(matches!(
            event,
            Some(Event::Failed { error: ScaleError::MissingMeasurements, .. })
        ));
    }

    #[test]
    fn failed_open_is_reported() {
        let worker = SessionWorker::spawn(|_port: &str| -> Result<Connection<SimulatedScale>> {
            Err(ScaleError::NotConnected)
        });

        let event = worker.call(Request::Connect("COM99".into()), || {});
        assert!(matches!(
            event,
            Some(Event::Failed { request: Request::Connect(_), error: ScaleError::NotConnected })
        ));
    }

    #[test]
    fn drop_stops_the_thread() {
        let worker = sim_worker(SimulatedScale::new);
        assert!(matches!(worker.call(Request::Connect("SIM".into()), || {}), Some(Event::Connected(_))));
        assert!(matches!(worker.call(Request::Disconnect, || {}), Some(Event::Disconnected)));
        drop(worker);
    }
}
