use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use super::{KeyPath, RealtimeStore};
use crate::error::StoreError;

/// In-process `RealtimeStore` holding the whole keyspace as one JSON tree.
///
/// Watchers are registered per path and re-evaluated after every write that
/// touches their path, an ancestor, or a descendant. A watcher whose
/// receivers are all dropped is pruned on the next write or subscribe.
#[derive(Debug)]
pub struct MemoryRealtimeStore {
    inner: RwLock<Inner>,
    next_key: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
}

#[derive(Debug)]
struct Watcher {
    path: KeyPath,
    tx: watch::Sender<Option<Value>>,
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                root: Value::Object(Map::new()),
                watchers: Vec::new(),
            }),
            next_key: AtomicU64::new(0),
        }
    }
}

impl MemoryRealtimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths with at least one live subscriber.
    pub async fn subscriber_count(&self) -> usize {
        self.inner
            .read()
            .await
            .watchers
            .iter()
            .filter(|w| w.tx.receiver_count() > 0)
            .count()
    }
}

impl Inner {
    fn notify(&mut self, changed: &KeyPath) {
        self.watchers.retain(|w| w.tx.receiver_count() > 0);
        for watcher in &self.watchers {
            if !(watcher.path.is_prefix_of(changed) || changed.is_prefix_of(&watcher.path)) {
                continue;
            }
            let next = lookup(&self.root, &watcher.path).cloned();
            watcher.tx.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// `null` and `{}` are stored as "no value".
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn set_at(node: &mut Value, segments: &[String], value: Value, path: &KeyPath) -> Result<(), StoreError> {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };
    let map = node
        .as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(path.to_string()))?;
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return Ok(());
    }
    let child = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    set_at(child, rest, value, path)
}

/// Removes the value at `segments` and any ancestors left empty.
fn remove_at(node: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Object(Map::new());
        return;
    };
    let Some(map) = node.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_at(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }
}

fn write(root: &mut Value, path: &KeyPath, value: Value) -> Result<(), StoreError> {
    if is_empty_value(&value) {
        remove_at(root, path.segments());
        return Ok(());
    }
    if path.segments().is_empty() && !value.is_object() {
        return Err(StoreError::NotAnObject(path.to_string()));
    }
    set_at(root, path.segments(), value, path)
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn get(&self, path: &KeyPath) -> Result<Option<Value>, StoreError> {
        Ok(lookup(&self.inner.read().await.root, path).cloned())
    }

    async fn set(&self, path: &KeyPath, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        write(&mut inner.root, path, value)?;
        inner.notify(path);
        debug!(path = %path, "realtime: set");
        Ok(())
    }

    async fn update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        // Validate the target first so a rejected update writes nothing.
        if let Some(existing) = lookup(&inner.root, path) {
            if !existing.is_object() {
                return Err(StoreError::NotAnObject(path.to_string()));
            }
        }
        for (key, value) in fields {
            write(&mut inner.root, &path.child(key), value)?;
        }
        inner.notify(path);
        debug!(path = %path, "realtime: update");
        Ok(())
    }

    async fn remove(&self, path: &KeyPath) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        remove_at(&mut inner.root, path.segments());
        inner.notify(path);
        debug!(path = %path, "realtime: remove");
        Ok(())
    }

    async fn compare_and_set(
        &self,
        path: &KeyPath,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if lookup(&inner.root, path) != expected {
            debug!(path = %path, "realtime: compare-and-set lost");
            return Ok(false);
        }
        write(&mut inner.root, path, value)?;
        inner.notify(path);
        debug!(path = %path, "realtime: compare-and-set");
        Ok(true)
    }

    async fn last_children(
        &self,
        path: &KeyPath,
        limit: usize,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        let inner = self.inner.read().await;
        let Some(children) = lookup(&inner.root, path).and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        let skip = children.len().saturating_sub(limit);
        Ok(children
            .iter()
            .skip(skip)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn subscribe(&self, path: &KeyPath) -> watch::Receiver<Option<Value>> {
        let mut inner = self.inner.write().await;
        inner.watchers.retain(|w| w.tx.receiver_count() > 0);
        let (tx, rx) = watch::channel(lookup(&inner.root, path).cloned());
        inner.watchers.push(Watcher {
            path: path.clone(),
            tx,
        });
        rx
    }

    fn generate_key(&self) -> String {
        // Fixed-width hex keeps lexical order equal to generation order.
        format!("{:016x}", self.next_key.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn path(s: &str) -> KeyPath {
        s.split('/').fold(KeyPath::root(), |p, seg| p.child(seg))
    }

    #[tokio::test]
    async fn set_and_get_nested_values() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("sensors/u1/s1"), json!({"humidity": 55})).await.unwrap();

        assert_eq!(
            store.get(&path("sensors/u1/s1")).await.unwrap(),
            Some(json!({"humidity": 55}))
        );
        assert_eq!(
            store.get(&path("sensors/u1")).await.unwrap(),
            Some(json!({"s1": {"humidity": 55}}))
        );
        assert_eq!(store.get(&path("sensors/u2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_last_write_wins() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("a/b"), json!({"x": 1, "y": 2})).await.unwrap();
        store.set(&path("a/b"), json!({"x": 3})).await.unwrap();
        assert_eq!(store.get(&path("a/b")).await.unwrap(), Some(json!({"x": 3})));
    }

    #[tokio::test]
    async fn update_merges_shallowly() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("settings/u1"), json!({"a": true, "b": 1})).await.unwrap();

        let mut fields = Map::new();
        fields.insert("a".into(), json!(false));
        fields.insert("c".into(), json!("new"));
        store.update(&path("settings/u1"), fields).await.unwrap();

        assert_eq!(
            store.get(&path("settings/u1")).await.unwrap(),
            Some(json!({"a": false, "b": 1, "c": "new"}))
        );
    }

    #[tokio::test]
    async fn update_creates_missing_record() {
        let store = MemoryRealtimeStore::new();
        let mut fields = Map::new();
        fields.insert("read".into(), json!(true));
        store.update(&path("alerts/u1/a1"), fields).await.unwrap();
        assert_eq!(
            store.get(&path("alerts/u1/a1")).await.unwrap(),
            Some(json!({"read": true}))
        );
    }

    #[tokio::test]
    async fn writing_below_a_scalar_is_rejected() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("a"), json!(5)).await.unwrap();
        let err = store.set(&path("a/b"), json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
        assert_eq!(store.get(&path("a")).await.unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn compare_and_set_writes_only_over_the_expected_value() {
        let store = MemoryRealtimeStore::new();
        let key = path("unclaimed_sensors/dev");

        assert!(!store.compare_and_set(&key, Some(&json!({"a": 1})), json!({"a": 2})).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);

        assert!(store.compare_and_set(&key, None, json!({"a": 1})).await.unwrap());
        assert!(!store.compare_and_set(&key, None, json!({"a": 9})).await.unwrap());
        assert!(store.compare_and_set(&key, Some(&json!({"a": 1})), json!({"a": 2})).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn remove_prunes_empty_parents() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("alerts/u1/a1"), json!({"x": 1})).await.unwrap();
        store.remove(&path("alerts/u1/a1")).await.unwrap();
        assert_eq!(store.get(&path("alerts/u1")).await.unwrap(), None);
        assert_eq!(store.get(&path("alerts")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn setting_null_removes() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("a/b"), json!(1)).await.unwrap();
        store.set(&path("a/b"), Value::Null).await.unwrap();
        assert_eq!(store.get(&path("a/b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn push_keys_keep_insertion_order() {
        let store = MemoryRealtimeStore::new();
        let history = path("history/u1/s1");
        for i in 0..5 {
            store.push(&history, json!({"n": i})).await.unwrap();
        }

        let last = store.last_children(&history, 3).await.unwrap();
        let ns: Vec<i64> = last.iter().map(|(_, v)| v["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);

        assert_eq!(store.last_children(&history, 100).await.unwrap().len(), 5);
        assert!(store.last_children(&path("history/u1/none"), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscriber_sees_current_then_changes() {
        let store = MemoryRealtimeStore::new();
        store.set(&path("sensors/u1/s1"), json!({"t": 1})).await.unwrap();

        let mut rx = store.subscribe(&path("sensors/u1/s1")).await;
        assert_eq!(*rx.borrow_and_update(), Some(json!({"t": 1})));

        store.set(&path("sensors/u1/s1"), json!({"t": 2})).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(json!({"t": 2})));

        store.remove(&path("sensors/u1/s1")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn ancestor_subscriber_sees_child_writes() {
        let store = MemoryRealtimeStore::new();
        let mut rx = store.subscribe(&path("sensors/u1")).await;

        store.set(&path("sensors/u1/s2"), json!({"t": 9})).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(json!({"s2": {"t": 9}})));
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_wake_subscribers() {
        let store = MemoryRealtimeStore::new();
        let rx = store.subscribe(&path("sensors/u1/s1")).await;

        store.set(&path("sensors/u1/s2"), json!({"t": 1})).await.unwrap();
        store.set(&path("settings/u1"), json!({"x": 1})).await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let store = MemoryRealtimeStore::new();
        let rx = store.subscribe(&path("a")).await;
        assert_eq!(store.subscriber_count().await, 1);

        drop(rx);
        assert_eq!(store.subscriber_count().await, 0);
        store.set(&path("a"), json!(1)).await.unwrap();
        assert!(store.inner.read().await.watchers.is_empty());
    }
}
