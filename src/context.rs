//! Request-scoped context and the attribute store attached to it.
//!
//! A [`Context`] is an immutable chain of type-keyed bindings. Deriving a
//! child never changes the parent. The one exception to immutability is the
//! [`AttrStore`]: the first [`attach`] on a root creates it, and every
//! context derived from that root shares it, so attaching from any
//! descendant (or from many threads at once) is visible to all of them.

use crate::value::{Attr, Value};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

struct Node {
    parent: Option<Arc<Node>>,
    key: TypeId,
    value: Arc<dyn Any + Send + Sync>,
}

/// Immutable carrier of request-scoped values.
#[derive(Clone, Default)]
pub struct Context {
    node: Option<Arc<Node>>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context that binds `value` under its type.
    ///
    /// A later binding of the same type shadows earlier ones.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Context {
        Context {
            node: Some(Arc::new(Node {
                parent: self.node.clone(),
                key: TypeId::of::<T>(),
                value: Arc::new(value),
            })),
        }
    }

    /// Look up the nearest binding of type `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        let key = TypeId::of::<T>();
        let mut node = self.node.as_deref();
        while let Some(n) = node {
            if n.key == key {
                return n.value.downcast_ref::<T>();
            }
            node = n.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0;
        let mut node = self.node.as_deref();
        while let Some(n) = node {
            depth += 1;
            node = n.parent.as_deref();
        }
        f.debug_struct("Context")
            .field("bindings", &depth)
            .field("fields", &lookup(self).map(|s| s.len()))
            .finish()
    }
}

/// Concurrency-safe map of attributes shared by a context tree.
#[derive(Default)]
pub struct AttrStore {
    entries: DashMap<String, Value>,
}

impl AttrStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the entries as attrs. Order is unspecified.
    pub fn attrs(&self) -> Vec<Attr> {
        self.entries
            .iter()
            .map(|entry| Attr::new(entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl fmt::Debug for AttrStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (e.key().clone(), e.value().clone())))
            .finish()
    }
}

// Private key type: the store is unreachable through `Context::value`.
#[derive(Clone)]
struct Fields(Arc<AttrStore>);

/// Attach `key = value` to the logging fields of `ctx`.
///
/// If `ctx` already carries a store the entry goes into that same store and
/// a context sharing it is returned. Otherwise a new store is created and
/// bound to a derived context.
pub fn attach(ctx: &Context, key: impl Into<String>, value: impl Into<Value>) -> Context {
    if let Some(Fields(store)) = ctx.value::<Fields>() {
        store.insert(key, value);
        return ctx.clone();
    }

    let store = Arc::new(AttrStore::new());
    store.insert(key, value);
    ctx.with_value(Fields(store))
}

/// The attribute store bound to `ctx`, if any.
pub fn lookup(ctx: &Context) -> Option<Arc<AttrStore>> {
    ctx.value::<Fields>().map(|Fields(store)| Arc::clone(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct RequestId(&'static str);

    #[test]
    fn values_shadow_and_do_not_leak_upwards() {
        let root = Context::background().with_value(RequestId("a"));
        let child = root.with_value(RequestId("b"));
        assert_eq!(root.value::<RequestId>(), Some(&RequestId("a")));
        assert_eq!(child.value::<RequestId>(), Some(&RequestId("b")));
        assert!(Context::background().value::<RequestId>().is_none());
    }

    #[test]
    fn attach_creates_store_once() {
        let root = Context::background();
        assert!(lookup(&root).is_none());

        let ctx = attach(&root, "a", 1);
        let ctx2 = attach(&ctx, "b", 2);
        let store = lookup(&ctx).unwrap();
        assert!(Arc::ptr_eq(&store, &lookup(&ctx2).unwrap()));
        assert_eq!(store.len(), 2);
        assert!(lookup(&root).is_none());
    }

    #[test]
    fn attach_through_descendant_is_visible_to_ancestor() {
        let ctx = attach(&Context::background(), "a", 1);
        let descendant = ctx.with_value(RequestId("r"));
        attach(&descendant, "b", "two");
        let store = lookup(&ctx).unwrap();
        assert_eq!(store.get("b").unwrap().as_str(), Some("two"));
    }

    #[test]
    fn last_write_wins() {
        let ctx = attach(&Context::background(), "k", "first");
        attach(&ctx, "k", "second");
        let store = lookup(&ctx).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").unwrap().as_str(), Some("second"));
    }

    #[test]
    fn concurrent_attach_keeps_every_entry() {
        let ctx = attach(&Context::background(), "seed", 0);
        thread::scope(|s| {
            for i in 0..64 {
                let ctx = ctx.clone();
                s.spawn(move || {
                    attach(&ctx, format!("k{i}"), i);
                });
            }
        });
        let store = lookup(&ctx).unwrap();
        assert_eq!(store.len(), 65);
        for i in 0..64i64 {
            match store.get(&format!("k{i}")) {
                Some(Value::Int(v)) => assert_eq!(v, i),
                other => panic!("k{i}: unexpected {other:?}"),
            }
        }
    }
}
