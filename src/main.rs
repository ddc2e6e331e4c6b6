use std::io::{self, BufRead, Write};
use std::path::Path;

use scale_logger::devices::Connection;
use scale_logger::form::{Form, TerminalChooser, TerminalNotifier};
use scale_logger::logging::setup_logging;
use scale_logger::worker::SessionWorker;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = setup_logging(Path::new("logs"))?;
    info!("Starting application");

    let worker = SessionWorker::spawn(|port: &str| Connection::open(port));
    let mut form = Form::new(worker, TerminalNotifier, TerminalChooser);

    println!("Scale Controller - type help for commands");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if !form.dispatch(&line) {
            break;
        }
    }

    // Stops the worker, which releases the serial port
    drop(form);
    info!("Application shutting down");
    Ok(())
}
