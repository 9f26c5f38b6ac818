//! Named worker threads with bounded message queues.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block.
    let (sender, recv) = channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This method does not block or fail. If the connected [`PromiseHandle`] was dropped, `value`
    /// will be dropped and nothing happens.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Blocks the calling thread until the [`Promise`] is fulfilled.
    ///
    /// If the thread holding the promise panicked, this returns an error; the panic itself is
    /// propagated when its [`Worker`] is dropped.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped)
    }

    /// Waits at most `timeout` for the [`Promise`] to be fulfilled.
    ///
    /// On timeout, the handle is returned so that the caller can keep waiting.
    pub fn block_timeout(self, timeout: Duration) -> Result<Result<T, PromiseDropped>, Self> {
        match self.recv.recv_timeout(timeout) {
            Ok(value) => Ok(Ok(value)),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(PromiseDropped)),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }
}

/// The [`Promise`] connected to a [`PromiseHandle`] was dropped without being fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("promise was dropped without being fulfilled")]
pub struct PromiseDropped;

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: usize,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the queue capacity of the [`Worker`].
    ///
    /// By default, a capacity of 0 is used, which means that [`Worker::send`] will block until the
    /// worker has finished processing any preceding message, and [`Worker::try_send`] only
    /// succeeds while the worker is idle.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Spawns a [`Worker`] thread that uses `handler` to process incoming messages.
    pub fn spawn<I, F>(self, mut handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let (sender, recv) = channel::bounded(self.capacity);
        let mut builder = thread::Builder::new();
        let name = self.name.unwrap_or_else(|| "worker".into());
        builder = builder.name(name.clone());
        let handle = builder.spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Worker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

/// A handle to a worker thread that processes messages of type `I` in order.
///
/// When dropped, the queue is closed, the thread finishes every message that was already queued,
/// and it is joined. If the thread has panicked, the panic will be forwarded to the thread
/// dropping the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // Close the channel to signal the thread to exit.
        drop(self.sender.take());

        self.wait_for_exit();
    }
}

impl Worker<()> {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: 0,
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn wait_for_exit(&mut self) {
        // Wait for it to exit and propagate its panic if it panicked.
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }

    /// Sends a message to the worker thread.
    ///
    /// This will block until the worker's queue has room for the message.
    ///
    /// If the worker has panicked, this will propagate the panic to the calling thread.
    pub fn send(&mut self, msg: I) {
        let Some(sender) = &self.sender else { return };
        if sender.send(msg).is_err() {
            self.wait_for_exit();
        }
    }

    /// Sends a message to the worker thread if its queue has room.
    ///
    /// Returns the message back if the queue is full. If the worker has panicked, this will
    /// propagate the panic to the calling thread.
    pub fn try_send(&mut self, msg: I) -> Result<(), I> {
        let Some(sender) = &self.sender else {
            return Err(msg);
        };
        match sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => Err(msg),
            Err(TrySendError::Disconnected(msg)) => {
                self.wait_for_exit();
                Err(msg)
            }
        }
    }
}
