use tracing::debug;

#[cfg(any(target_os = "android", target_os = "linux"))]
pub(crate) fn try_raise_current_thread_priority() {
    // Lowering nice may not be permitted; the default scheduling is kept then.
    let ret = unsafe {
        let tid = libc::gettid() as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, -2)
    };
    debug!(ok = ret == 0, "raise emulation thread priority");
}

#[cfg(not(any(target_os = "android", target_os = "linux")))]
pub(crate) fn try_raise_current_thread_priority() {
    debug!("thread priority left unchanged on this platform");
}
