use std::sync::Arc;

use crate::{
    any::{downcast, erase, Instance, TypeInfo},
    metadata::ComponentMetadata,
    store::InstanceStore,
};

/// Request-scoped instances consulted before the container store.
///
/// Clones share the same instances.
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) store: Arc<InstanceStore>,
}

impl Context {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under the lookup name of `T` and returns the previous instance of that type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) -> Option<Arc<T>> {
        self.insert_shared(TypeInfo::of::<T>().lookup_name(), Arc::new(value))
    }

    pub fn insert_named<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) -> Option<Arc<T>> {
        self.insert_shared(name, Arc::new(value))
    }

    pub fn insert_shared<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<String>, value: Arc<T>) -> Option<Arc<T>> {
        let name = name.into();
        let metadata = ComponentMetadata::realized(name.clone(), TypeInfo::of::<T>(), erase(value));
        self.store
            .set(name, Arc::new(metadata))
            .and_then(|previous| previous.instance())
            .and_then(|instance| downcast(&instance))
    }

    #[inline]
    #[must_use]
    pub fn get_instance(&self, name: &str) -> Option<Instance> {
        self.store.get_instance(name)
    }

    #[must_use]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_instance(&TypeInfo::of::<T>().lookup_name()).and_then(|instance| downcast(&instance))
    }
}
