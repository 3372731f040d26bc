// common.rs — console printing shared by the engine and renderers

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub const MAXPRINTMSG: usize = 4096;

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// Begin redirecting printf output into a buffer.
pub fn com_begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.lock().take()
}

/// Mirrors the "developer" cvar.
pub fn com_set_developer(enabled: bool) {
    DEVELOPER.store(enabled, Ordering::Relaxed);
}

// ============================================================
// Com_Printf / Com_DPrintf
// ============================================================

/// General-purpose print. Goes to the redirect buffer when one is active,
/// otherwise to the log at info level.
pub fn com_printf(msg: &str) {
    let msg = truncate(msg);
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    log::info!("{}", msg.trim_end());
}

/// Developer-only print. Printed like com_printf only when developer mode
/// is on; otherwise kept at debug level.
pub fn com_dprintf(msg: &str) {
    if DEVELOPER.load(Ordering::Relaxed) {
        com_printf(msg);
    } else {
        log::debug!("{}", truncate(msg).trim_end());
    }
}

fn truncate(msg: &str) -> &str {
    if msg.len() < MAXPRINTMSG {
        return msg;
    }
    let mut end = MAXPRINTMSG - 1;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    &msg[..end]
}
