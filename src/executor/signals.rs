//! Signal flags for the index worker
//!
//! Handlers only store into atomics; the request loop looks at them at
//! fixed checkpoints.
//! - `SIGUSR1`: the coordinator's search deadline expired, stop emitting
//! - `SIGINT`/`SIGTERM`: finish the current request and exit

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static CANCEL: AtomicBool = AtomicBool::new(false);

extern "C" fn on_cancel(_signal: libc::c_int) {
    CANCEL.store(true, Ordering::SeqCst);
}

/// Install the `SIGUSR1` handler
///
/// Interrupted reads are restarted, so a late signal never breaks the
/// request stream.
pub fn install_cancel_handler() -> io::Result<()> {
    let handler: extern "C" fn(libc::c_int) = on_cancel;
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Clear a cancellation left over from an earlier search
pub fn reset_cancel() {
    CANCEL.store(false, Ordering::SeqCst);
}

pub fn cancel_requested() -> bool {
    CANCEL.load(Ordering::SeqCst)
}

/// Flag raised by `SIGINT`/`SIGTERM`
pub fn termination_flag() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigusr1_sets_cancel_flag() {
        install_cancel_handler().unwrap();
        reset_cancel();
        assert!(!cancel_requested());

        let ret = unsafe { libc::kill(libc::getpid(), libc::SIGUSR1) };
        assert_eq!(ret, 0);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !cancel_requested() && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert!(cancel_requested());
        reset_cancel();
        assert!(!cancel_requested());
    }
}
