use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle};

/// Runs `future` to completion without tying it to the caller's own await
/// chain. Used by the write coordinator (spec.md §4.7) to drive a tier's
/// write to full completion while the caller only awaits the earlier
/// `written` stage.
///
/// Reuses the ambient tokio runtime when the caller is already on one (the
/// common case — tests and any embedding application); falls back to a
/// dedicated background thread driving its own runtime otherwise, mirroring
/// the platform runtime helper this is grounded on. A bare `Builder::
/// new_current_thread().build()` is not enough here: nothing would ever
/// call `block_on` on it, so a spawned task would sit in its queue forever.
/// The background thread's sole job is to keep that runtime polling.
fn background_handle() -> &'static Handle {
    static BACKGROUND_HANDLE: OnceLock<Handle> = OnceLock::new();
    BACKGROUND_HANDLE.get_or_init(|| {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("federation-bg-rt".into())
            .spawn(move || {
                let runtime = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build background tokio runtime");
                tx.send(runtime.handle().clone()).expect("background handle receiver dropped");
                runtime.block_on(std::future::pending::<()>());
            })
            .expect("failed to spawn background runtime thread");
        rx.recv().expect("background runtime thread failed to start")
    })
}

pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else {
        background_handle().spawn(future);
    }
}
