use crossbeam::atomic::AtomicCell;
use futures::future::Shared;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub mod queue;
pub mod value;

pub struct FinishSignal {
    inner: tokio::sync::oneshot::Receiver<()>,
}

impl FinishSignal {
    pub fn new(inner: tokio::sync::oneshot::Receiver<()>) -> Self {
        Self { inner }
    }
}

impl Future for FinishSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Cancellation signal shared by every task of a run.
///
/// Cloning is cheap; [Shutdown::trigger] on any clone wakes every
/// [Shutdown::wait] on every clone. Triggering twice is a no-op.
#[derive(Clone)]
pub struct Shutdown {
    sender: Arc<AtomicCell<Option<tokio::sync::oneshot::Sender<()>>>>,
    signal: Shared<FinishSignal>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        Shutdown {
            sender: Arc::new(AtomicCell::new(Some(sender))),
            signal: FinishSignal::new(receiver).shared(),
        }
    }

    pub fn trigger(&self) {
        if let Some(sender) = self.sender.swap(None) {
            let _ = sender.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.signal.clone().now_or_never().is_some()
    }

    pub fn wait(&self) -> Shared<FinishSignal> {
        self.signal.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}
