use tokio::{sync::watch, task::JoinHandle};

/// A live view of an upstream value.
///
/// Holds the latest value and wakes on every upstream change until it is
/// dropped or [`unsubscribe`](Self::unsubscribe)d. Any task feeding it is
/// aborted at that point, so no callback outlives its subscriber.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps a receiver whose sender is owned elsewhere.
    pub fn from_receiver(rx: watch::Receiver<T>) -> Self {
        Self { rx, task: None }
    }

    /// Wraps a receiver fed by `task`; the task is aborted with the subscription.
    pub fn with_task(rx: watch::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Derives a subscription by applying `f` to every value of `source`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn map<S, F>(mut source: watch::Receiver<S>, f: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> T + Send + 'static,
    {
        let initial = f(&*source.borrow_and_update());
        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = source.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = f(&*source.borrow_and_update());
                        if tx.send(next).is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });
        Self::with_task(rx, task)
    }

    /// The most recent value.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Waits for the next change. `None` once the upstream has gone away.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Explicit teardown; equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
