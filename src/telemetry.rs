use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Route tracing output to a JSON-lines file, at `SOUNDWATCH_TRACE_LOG` or a
/// temp-dir default. Safe to call more than once; only the first call
/// installs a subscriber.
pub fn init_tracing(enabled: bool) {
    if !enabled {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = env::var("SOUNDWATCH_TRACE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("soundwatch_trace.jsonl"));
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
