//! Raw-mode-gated diagnostic sink.
//!
//! While the terminal is in raw mode, writing to stderr would interleave
//! garbage into the screen the session is drawing. Diagnostics are buffered
//! in memory instead and only drained to stderr once raw mode is restored
//! (clean shutdown or fatal exit). When raw mode was never entered,
//! diagnostics go straight to stderr.

use std::io::Write;
use std::sync::Mutex;

static BUFFER: Mutex<Vec<String>> = Mutex::new(Vec::new());
static RAW: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Call when raw mode is entered/exited so the sink knows whether it is
/// safe to write straight through to stderr.
pub fn set_raw_mode(on: bool) {
    RAW.store(on, std::sync::atomic::Ordering::SeqCst);
}

/// Record a diagnostic line. Buffered while raw mode is active, written
/// immediately to stderr otherwise.
pub fn log(line: &str) {
    if RAW.load(std::sync::atomic::Ordering::SeqCst) {
        BUFFER.lock().unwrap().push(line.to_string());
    } else {
        let _ = writeln!(std::io::stderr(), "{line}");
    }
}

/// Flush any buffered diagnostics to stderr. Called after raw mode is
/// restored, before process exit.
pub fn drain_to_stderr() {
    let mut buf = BUFFER.lock().unwrap();
    if buf.is_empty() {
        return;
    }
    let mut err = std::io::stderr();
    for line in buf.drain(..) {
        let _ = writeln!(err, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn buffers_while_raw_and_drains_after() {
        let _guard = TEST_LOCK.lock().unwrap();
        set_raw_mode(true);
        log("buffered line");
        assert_eq!(BUFFER.lock().unwrap().len(), 1);
        set_raw_mode(false);
        drain_to_stderr();
        assert!(BUFFER.lock().unwrap().is_empty());
    }
}
