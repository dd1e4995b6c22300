// Copyright 2026. The Ember Development Community
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A cooperative shutdown signal. One [`Shutdown`] is owned by the process
//! entrypoint; every long-running task is handed a cloned [`ShutdownSignal`],
//! which is a future that resolves once `Shutdown::trigger` is called.

use futures::task::AtomicWaker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

#[derive(Debug)]
struct Inner {
    triggered: AtomicBool,
    waker: AtomicWaker,
}

/// Owned by whoever decides when the node stops. Dropping it without calling
/// [`trigger`](Shutdown::trigger) leaves any outstanding signals pending
/// forever, matching the teacher's "explicit trigger, not drop" contract.
pub struct Shutdown {
    inner: Arc<Inner>,
}

/// A cheaply cloneable future that resolves once the owning [`Shutdown`] is
/// triggered. Each subsystem in §5's worker list awaits its own clone.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                waker: AtomicWaker::new(),
            }),
        }
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            inner: self.inner.clone(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Wakes every outstanding `ShutdownSignal`. Idempotent.
    pub fn trigger(&mut self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.waker.wake();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }
}

impl std::future::Future for ShutdownSignal {
    type Output = ();

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<()> {
        if self.inner.triggered.load(Ordering::SeqCst) {
            return Poll::Ready(());
        }
        self.inner.waker.register(cx.waker());
        if self.inner.triggered.load(Ordering::SeqCst) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_resolves_after_trigger() {
        let mut shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        assert!(!signal.is_triggered());
        shutdown.trigger();
        signal.await;
    }

    #[tokio::test]
    async fn multiple_clones_all_resolve() {
        let mut shutdown = Shutdown::new();
        let a = shutdown.to_signal();
        let b = shutdown.to_signal();
        shutdown.trigger();
        a.await;
        b.await;
    }
}
