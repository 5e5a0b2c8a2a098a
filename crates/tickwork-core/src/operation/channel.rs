//! Channel - 購読者リスト（observer list）
//!
//! - 購読順に呼び出す
//! - 購読者ゼロへの emit は何もしない
//! - emit 中の subscribe / unsubscribe は次の emit から反映される
//!   （emit 開始時にリストのスナップショットを取るため）

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Channel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<T> = Rc<dyn Fn(&T)>;

/// Ordered list of subscribers for one kind of notification.
pub struct Channel<T> {
    subscribers: RefCell<Vec<(SubscriptionId, Handler<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Invoke every subscriber in subscription order.
    ///
    /// Panics raised by a handler propagate to the caller.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(value);
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_in_subscription_order() {
        let channel = Channel::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            channel.subscribe(move |v: &u32| seen.borrow_mut().push(format!("{tag}:{v}")));
        }
        channel.emit(&7);

        assert_eq!(*seen.borrow(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let channel = Channel::<u32>::new();
        assert!(channel.is_empty());
        channel.emit(&1);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let channel = Channel::<u32>::new();
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&hits);
        let a = channel.subscribe(move |_| h.set(h.get() + 1));
        let h = Rc::clone(&hits);
        channel.subscribe(move |_| h.set(h.get() + 10));

        assert!(channel.unsubscribe(a));
        assert!(!channel.unsubscribe(a));
        channel.emit(&0);

        assert_eq!(hits.get(), 10);
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_emit() {
        let channel = Rc::new(Channel::<u32>::new());
        let hits = Rc::new(Cell::new(0));
        let id = Rc::new(Cell::new(None));

        let (c, h, i) = (Rc::downgrade(&channel), Rc::clone(&hits), Rc::clone(&id));
        let sid = channel.subscribe(move |_| {
            h.set(h.get() + 1);
            if let (Some(c), Some(sid)) = (c.upgrade(), i.get()) {
                c.unsubscribe(sid);
            }
        });
        id.set(Some(sid));

        channel.emit(&0);
        channel.emit(&0);

        assert_eq!(hits.get(), 1);
        assert!(channel.is_empty());
    }
}
