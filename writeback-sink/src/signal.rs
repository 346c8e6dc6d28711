//! Like [`tokio::sync::oneshot`], but observable by any number of waiters:
//! the value must be [`Clone`], and every [`Waiter`] gets its own copy.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError};

enum State<T> {
    NotFired,
    Fired(T),
}

struct Shared<T>(Arc<Mutex<State<T>>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Arc::clone(&self.0))
    }
}

/// Create a new notifier-waiter pair.
pub fn channel<T: Clone + Send>() -> (Notifier<T>, Waiter<T>) {
    let shared = Shared(Arc::new(Mutex::new(State::NotFired)));
    let (tx, rx) = broadcast::channel(1);
    (Notifier(shared.clone(), tx), Waiter(shared, rx))
}

/// The firing half of the channel.
///
/// More in [`Notifier::fire`].
pub struct Notifier<T: Clone + Send>(Shared<T>, broadcast::Sender<()>);

/// The waiting half of the channel.
///
/// Clone-able for convenience. See [`Waiter::wait`].
pub struct Waiter<T: Clone + Send>(Shared<T>, broadcast::Receiver<()>);

impl<T: Clone + Send> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Waiter(self.0.clone(), self.1.resubscribe())
    }
}

impl<T: Clone + Send> Notifier<T> {
    /// Fire the signal. Every current and future [`Waiter`] observes a clone
    /// of `v`.
    pub fn fire(self, v: T) {
        *self.0 .0.lock().unwrap() = State::Fired(v);
        // Err here means no waiter is subscribed right now; they still read
        // the state set above when they get around to waiting.
        let _ = self.1.send(());
    }
}

impl<T: Clone + Send> Waiter<T> {
    /// Resolves once the signal fires; `None` if the [`Notifier`] was dropped
    /// without firing. Waiting again yields the same value.
    pub async fn wait(&mut self) -> Option<T> {
        match self.1.recv().await {
            Ok(()) | Err(RecvError::Closed) => match &*self.0 .0.lock().unwrap() {
                State::Fired(v) => Some(v.clone()),
                State::NotFired => None,
            },
            Err(RecvError::Lagged(_)) => {
                unreachable!("fired at most once, and the channel has capacity 1")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn notifier_dropped_before_firing() {
        let (notifier, mut waiter) = super::channel::<()>();
        drop(notifier);
        assert_eq!(waiter.wait().await, None);
    }

    #[tokio::test]
    async fn fired_before_wait() {
        let (notifier, mut waiter) = super::channel();
        notifier.fire(7u32);
        assert_eq!(waiter.wait().await, Some(7));
    }

    #[tokio::test]
    async fn every_waiter_observes_the_value() {
        let (notifier, mut waiter1) = super::channel();
        let mut waiter2 = waiter1.clone();
        let t1 = tokio::task::spawn(async move { waiter1.wait().await });
        let t2 = tokio::task::spawn(async move { waiter2.wait().await });
        notifier.fire("done");
        assert_eq!(t1.await.unwrap(), Some("done"));
        assert_eq!(t2.await.unwrap(), Some("done"));
    }

    #[tokio::test]
    async fn waiter_cloned_after_fire_still_observes() {
        let (notifier, mut orig) = super::channel();
        notifier.fire(1u8);
        let mut cloned = orig.clone();
        assert_eq!(cloned.wait().await, Some(1));
        assert_eq!(orig.wait().await, Some(1));
    }

    #[tokio::test]
    async fn wait_is_idempotent() {
        let (notifier, mut waiter) = super::channel();
        notifier.fire(3u64);
        assert_eq!(waiter.wait().await, Some(3));
        assert_eq!(waiter.wait().await, Some(3));
    }
}
