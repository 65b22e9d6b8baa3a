use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Typed per-request values that never go on the wire.
///
/// Middleware and helpers use this to pass context down to handlers, keyed
/// by the value's type.
#[derive(Clone, Default)]
pub struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| (**value).downcast_ref::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.map.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u16);

    #[test]
    fn values_are_keyed_by_type() {
        let mut ext = Extensions::new();
        ext.insert(Marker(201));
        ext.insert(String::from("room"));

        assert_eq!(ext.get::<Marker>(), Some(&Marker(201)));
        assert_eq!(ext.get::<String>().map(String::as_str), Some("room"));
        assert_eq!(ext.len(), 2);

        ext.insert(Marker(404));
        assert_eq!(ext.get::<Marker>(), Some(&Marker(404)));

        assert!(ext.remove::<Marker>());
        assert!(ext.get::<Marker>().is_none());
        assert!(!ext.remove::<Marker>());
    }
}
