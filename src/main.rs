mod calc;
mod config;
mod db;
mod error;
mod grading;
mod ipc;
mod lifecycle;
mod logging;
mod model;
mod policy;
mod store;

use std::io::{self, BufRead, Write};

use tracing::{error, info, warn};

fn main() {
    let config = config::Config::from_env();
    if let Err(e) = logging::init_tracing(config.log_directive.as_deref(), config.log_json) {
        eprintln!("reportcardd: logging disabled: {e}");
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = &config.workspace {
        match ipc::select_workspace(&mut state, path) {
            Ok(()) => info!(workspace = %path.display(), "workspace opened from environment"),
            Err(e) => warn!(workspace = %path.display(), error = %e, "could not open workspace"),
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "reportcardd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                warn!(error = %e, "unparsable request line");
                // Echo the id back when the line was JSON but not a request.
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .unwrap_or_default();
                ipc::bad_json(&id, &e)
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
