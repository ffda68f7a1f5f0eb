//! Latest-value holder with change-gated publishing.

use crate::bus::Publisher;
use crate::compression::WireEncode;
use crate::error::BusResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// A value plus an equality-gated setter.
///
/// Setting an equal value is a no-op; setting a different one stores it
/// and, for published holders, broadcasts it on the holder's topic. The
/// holder registers itself as the topic's snapshot generator, so new
/// subscribers start from the latest value.
pub struct Observable<T> {
    cell: Arc<RwLock<Option<T>>>,
    publisher: Option<Publisher<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: WireEncode + Clone + PartialEq + Send + Sync + 'static,
{
    /// Holder that is never published.
    pub fn local() -> Self {
        Self {
            cell: Arc::new(RwLock::new(None)),
            publisher: None,
        }
    }

    /// Holder published on `publisher`'s topic.
    pub fn published(publisher: Publisher<T>) -> BusResult<Self> {
        let cell: Arc<RwLock<Option<T>>> = Arc::new(RwLock::new(None));
        let snapshot_cell = cell.clone();
        publisher.register_snapshot(move || snapshot_cell.read().iter().cloned().collect())?;
        Ok(Self {
            cell,
            publisher: Some(publisher),
        })
    }

    /// Published holder seeded with `initial`.
    pub fn published_with(publisher: Publisher<T>, initial: T) -> BusResult<Self> {
        let observable = Self::published(publisher)?;
        *observable.cell.write() = Some(initial);
        Ok(observable)
    }

    pub fn get(&self) -> Option<T> {
        self.cell.read().clone()
    }

    /// Store `value` if it differs from the current one. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        self.set_if(value, |old, new| old != new)
    }

    /// Store `value` if `changed(old, new)` holds, or if nothing is stored yet.
    pub fn set_if<F>(&self, value: T, changed: F) -> bool
    where
        F: FnOnce(&T, &T) -> bool,
    {
        let encode = self.publisher.is_some();
        let update = || {
            let mut cell = self.cell.write();
            if let Some(old) = cell.as_ref() {
                if !changed(old, &value) {
                    return None;
                }
            }
            let encoded = if encode { value.encode() } else { Value::Null };
            *cell = Some(value);
            Some(encoded)
        };
        match &self.publisher {
            Some(publisher) => publisher.publish_state(update),
            None => update().is_some(),
        }
    }

    /// Drop the stored value without publishing. Returns whether one was stored.
    pub fn clear(&self) -> bool {
        self.cell.write().take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBus, Topic};
    use serde_json::json;

    #[tokio::test]
    async fn test_publishes_only_on_change() {
        let bus = MessageBus::new();
        let obs = Observable::published(bus.publisher::<bool>(Topic::ActiveChange)).unwrap();
        let mut sub = bus.subscribe(Topic::ActiveChange);
        assert!(sub.snapshot.is_empty());

        assert!(obs.set(true));
        assert!(!obs.set(true));
        assert!(obs.set(false));

        assert_eq!(sub.messages.recv().await.unwrap(), json!(true));
        assert_eq!(sub.messages.recv().await.unwrap(), json!(false));
        assert!(sub.messages.try_recv().is_err());
        assert_eq!(obs.get(), Some(false));
    }

    #[test]
    fn test_snapshot_reflects_latest() {
        let bus = MessageBus::new();
        let obs =
            Observable::published_with(bus.publisher::<String>(Topic::Notepad), "a".to_string())
                .unwrap();
        obs.set("b".to_string());

        let sub = bus.subscribe(Topic::Notepad);
        assert_eq!(sub.snapshot, vec![json!("b")]);
    }

    #[test]
    fn test_holder_owns_its_topic_snapshot() {
        let bus = MessageBus::new();
        let _obs = Observable::published(bus.publisher::<bool>(Topic::ActiveChange)).unwrap();
        assert!(Observable::published(bus.publisher::<bool>(Topic::ActiveChange)).is_err());
    }

    #[test]
    fn test_custom_change_predicate_and_clear() {
        let obs = Observable::<String>::local();
        assert!(obs.set_if("abc".to_string(), |_, _| false));
        assert!(!obs.set_if("xyz".to_string(), |_, _| false));
        assert_eq!(obs.get().as_deref(), Some("abc"));

        assert!(obs.clear());
        assert!(!obs.clear());
        assert!(obs.get().is_none());
    }

    #[tokio::test]
    async fn test_batched_holder_defers_messages_not_snapshot() {
        let bus = MessageBus::new();
        let policy = bus.batch_policy(Some(std::time::Duration::from_secs(1)));
        let obs = Observable::published(bus.publisher::<String>(Topic::Notepad).batched(&policy))
            .unwrap();
        let mut sub = bus.subscribe(Topic::Notepad);

        assert!(obs.set("a".to_string()));
        assert!(obs.set("b".to_string()));
        assert!(sub.messages.try_recv().is_err());
        assert_eq!(bus.subscribe(Topic::Notepad).snapshot, vec![json!("b")]);

        policy.flush();
        assert_eq!(sub.messages.try_recv().unwrap(), json!("b"));
        assert!(sub.messages.try_recv().is_err());
    }
}
