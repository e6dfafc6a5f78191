//! Signal fan-in: async-signal-safe latch, drained synchronously by the
//! orchestrator once per tick.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPT: AtomicBool = AtomicBool::new(false);
static TERMINATE: AtomicBool = AtomicBool::new(false);
static QUIT: AtomicBool = AtomicBool::new(false);
static ALARM: AtomicBool = AtomicBool::new(false);
static PIPE: AtomicBool = AtomicBool::new(false);
static WINDOW_CHANGE: AtomicBool = AtomicBool::new(false);

/// The signal kinds the orchestrator cares about, in the priority order
/// they are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
    Quit,
    Alarm,
    Pipe,
    WindowChange,
}

extern "C" fn handle_interrupt(_sig: libc::c_int) {
    // A second INT while the first is still latched and undrained is
    // treated as "stop asking nicely": re-raise with default disposition
    // for unconditional termination instead of latching again.
    if INTERRUPT.swap(true, Ordering::SeqCst) {
        unsafe {
            libc::signal(libc::SIGINT, libc::SIG_DFL);
            libc::raise(libc::SIGINT);
        }
    }
}

extern "C" fn handle_terminate(_sig: libc::c_int) {
    TERMINATE.store(true, Ordering::SeqCst);
}

extern "C" fn handle_quit(_sig: libc::c_int) {
    QUIT.store(true, Ordering::SeqCst);
}

extern "C" fn handle_alarm(_sig: libc::c_int) {
    ALARM.store(true, Ordering::SeqCst);
}

extern "C" fn handle_pipe(_sig: libc::c_int) {
    PIPE.store(true, Ordering::SeqCst);
}

extern "C" fn handle_winch(_sig: libc::c_int) {
    WINDOW_CHANGE.store(true, Ordering::SeqCst);
}

extern "C" fn handle_reraise(sig: libc::c_int) {
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

unsafe fn install(sig: libc::c_int, handler: extern "C" fn(libc::c_int)) -> std::io::Result<()> {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = handler as usize;
    libc::sigemptyset(&mut action.sa_mask);
    action.sa_flags = 0;
    if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Install all handlers. Failure here is the fatal pre-loop error the
/// process exits non-zero for.
pub fn install_all() -> std::io::Result<()> {
    unsafe {
        install(libc::SIGINT, handle_interrupt)?;
        install(libc::SIGTERM, handle_terminate)?;
        install(libc::SIGQUIT, handle_quit)?;
        install(libc::SIGALRM, handle_alarm)?;
        install(libc::SIGPIPE, handle_pipe)?;
        install(libc::SIGWINCH, handle_winch)?;
        for sig in [
            libc::SIGSEGV,
            libc::SIGILL,
            libc::SIGABRT,
            libc::SIGFPE,
            libc::SIGBUS,
            libc::SIGTRAP,
            libc::SIGSYS,
        ] {
            install(sig, handle_reraise)?;
        }
    }
    Ok(())
}

/// Drain one latched signal in priority order (interrupt > terminate >
/// quit > alarm > pipe > window-change), clearing it as it is consumed.
/// Returns `None` once nothing is latched.
pub fn next() -> Option<SignalKind> {
    if INTERRUPT.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::Interrupt);
    }
    if TERMINATE.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::Terminate);
    }
    if QUIT.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::Quit);
    }
    if ALARM.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::Alarm);
    }
    if PIPE.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::Pipe);
    }
    if WINDOW_CHANGE.swap(false, Ordering::SeqCst) {
        return Some(SignalKind::WindowChange);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests share process-global latches; serialize them.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn next_drains_in_priority_order() {
        let _guard = TEST_LOCK.lock().unwrap();
        WINDOW_CHANGE.store(true, Ordering::SeqCst);
        TERMINATE.store(true, Ordering::SeqCst);
        assert_eq!(next(), Some(SignalKind::Terminate));
        assert_eq!(next(), Some(SignalKind::WindowChange));
        assert_eq!(next(), None);
    }

    #[test]
    fn next_clears_flag_after_drain() {
        let _guard = TEST_LOCK.lock().unwrap();
        ALARM.store(true, Ordering::SeqCst);
        assert_eq!(next(), Some(SignalKind::Alarm));
        assert_eq!(next(), None);
    }
}
