//! Drives service futures and turns Ctrl-C into cancellation.

use std::future::Future;

use log::warn;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

use crate::CliError;

/// Run `future` to completion, cancelling `token` on the first interrupt.
///
/// Services decode and write synchronously between fetches, so the signal
/// watcher runs on its own worker thread.
pub(crate) fn block_on_interruptible<F: Future>(
    token: &CancellationToken,
    future: F,
) -> Result<F::Output, CliError> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let watcher = runtime.spawn(cancel_on_interrupt(token.clone()));
    let output = runtime.block_on(future);
    watcher.abort();
    Ok(output)
}

async fn cancel_on_interrupt(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received; stopping after the current record");
        token.cancel();
    }
}
