//! One-shot notification that a launched session has terminated.

use std::{future::Future, pin::Pin, task};

use tokio::sync::oneshot::{self, error::TryRecvError, Receiver, Sender};

pub struct TerminateTx(Sender<()>);

impl TerminateTx {
    /// Announces termination. If nobody is listening any more, there is nothing to do.
    pub fn notify(self) {
        let _ = self.0.send(());
    }
}

/// Resolves once the paired [TerminateTx] notifies, or is dropped.
///
/// A dropped sender counts as termination: whoever owned the session can no longer report on
/// it, so waiting on it forever would leak the listener.
pub struct TerminateRx {
    rx: Receiver<()>,
    done: bool,
}

impl Future for TerminateRx {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<()> {
        if self.done {
            return task::Poll::Ready(());
        }
        let polled = Pin::new(&mut self.rx).poll(cx);
        if polled.is_ready() {
            self.done = true;
        }
        polled.map(|_| ())
    }
}

impl TerminateRx {
    pub fn is_terminated(&mut self) -> bool {
        if !self.done && !matches!(self.rx.try_recv(), Err(TryRecvError::Empty)) {
            self.done = true;
        }
        self.done
    }
}

pub fn make_pair() -> (TerminateTx, TerminateRx) {
    let (tx, rx) = oneshot::channel();
    (TerminateTx(tx), TerminateRx { rx, done: false })
}
