use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    any::{type_name, TypeId},
    mem,
    sync::Arc,
};
use tracing::{debug, warn};

use crate::{any::TypeInfo, errors::InjectErrorKind, injector::Injector};

/// Field injection for aggregates.
///
/// A type opts in by listing its fields against the [`Fields`] cursor. Each call fills one field:
/// by instance lookup, by lazy construction or from the layered properties.
pub trait Wired: Send + Sync + 'static {
    /// Property path under which the fields of this type live, `""` for the root.
    const PREFIX: &'static str = "";

    #[allow(unused_variables)]
    fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
        Ok(())
    }
}

pub struct Fields<'a> {
    injector: &'a Injector,
    path: String,
    stack: Vec<TypeId>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(injector: &'a Injector, path: impl Into<String>, stack: Vec<TypeId>) -> Self {
        Self {
            injector,
            path: path.into(),
            stack,
        }
    }

    #[inline]
    #[must_use]
    pub fn injector(&self) -> &Injector {
        self.injector
    }

    /// Property path of the aggregate currently being wired.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn field_path(&self, field: &str) -> String {
        if self.path.is_empty() {
            field.to_owned()
        } else {
            format!("{}.{field}", self.path)
        }
    }

    /// Fills `slot` with the instance registered for `T`, falling back to the instance named by the field path.
    ///
    /// Returns `false` when nothing suitable was found. Already filled slots are left alone.
    pub fn inject<T>(&mut self, field: &str, slot: &mut Option<Arc<T>>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if slot.is_some() {
            return true;
        }
        if self.fill(field, &TypeInfo::of::<T>().lookup_name(), slot) {
            return true;
        }
        let path = self.field_path(field);
        self.fill(field, &path, slot)
    }

    /// Fills `slot` with the instance stored under `name`.
    pub fn inject_named<T>(&mut self, name: &str, slot: &mut Option<Arc<T>>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if slot.is_some() {
            return true;
        }
        self.fill(name, name, slot)
    }

    /// As [`Fields::inject`], but constructs and registers a missing aggregate.
    pub fn autowire<T>(&mut self, field: &str, slot: &mut Option<Arc<T>>) -> bool
    where
        T: Wired + Default,
    {
        if self.inject(field, slot) {
            return true;
        }
        if self.stack.contains(&TypeId::of::<T>()) {
            warn!(field, dependency = type_name::<T>(), "Circular field injection, field skipped");
            return false;
        }

        match construct::<T>(self.injector, &mut self.stack) {
            Ok(instance) => {
                *slot = Some(instance);
                true
            }
            Err(err) => {
                warn!(field, dependency = type_name::<T>(), "Field can't be autowired: {err}");
                false
            }
        }
    }

    /// Reads the property at the field path into `slot`.
    ///
    /// `${KEY:default}` placeholders are substituted, comma separated strings are split when the target is a sequence.
    pub fn property<T>(&mut self, field: &str, slot: &mut T) -> bool
    where
        T: DeserializeOwned,
    {
        let path = self.field_path(field);
        let Some(value) = self.injector.container().get_property(&path) else {
            debug!(property = %path, "Property is not set");
            return false;
        };
        let value = self.replace_placeholders(value);

        match adapt::<T>(value) {
            Some(value) => {
                *slot = value;
                true
            }
            None => {
                warn!(property = %path, expected = type_name::<T>(), "Property has incorrect type, field skipped");
                false
            }
        }
    }

    /// Wires a nested aggregate under the field path.
    ///
    /// Types already being wired higher up are skipped.
    pub fn nested<T>(&mut self, field: &str, value: &mut T) -> Result<bool, InjectErrorKind>
    where
        T: Wired,
    {
        let type_id = TypeId::of::<T>();
        if self.stack.contains(&type_id) {
            debug!(field, dependency = type_name::<T>(), "Already being wired, nested field skipped");
            return Ok(false);
        }

        let nested_path = self.field_path(field);
        let path = mem::replace(&mut self.path, nested_path);
        self.stack.push(type_id);
        let result = value.wire(self);
        self.stack.pop();
        self.path = path;

        result.map(|()| true)
    }

    fn fill<T>(&self, field: &str, name: &str, slot: &mut Option<Arc<T>>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let Some(instance) = self.injector.get_instance(name) else {
            return false;
        };
        match crate::any::downcast::<T>(&instance) {
            Some(value) => {
                *slot = Some(value);
                true
            }
            None => {
                warn!(field, instance = name, expected = type_name::<T>(), "Instance has incorrect type, field skipped");
                false
            }
        }
    }

    fn replace_placeholders(&self, value: Value) -> Value {
        match value {
            Value::String(source) => Value::String(self.injector.container().replace(&source)),
            Value::Array(items) => Value::Array(items.into_iter().map(|item| self.replace_placeholders(item)).collect()),
            other => other,
        }
    }
}

pub(crate) fn construct<T>(injector: &Injector, stack: &mut Vec<TypeId>) -> Result<Arc<T>, InjectErrorKind>
where
    T: Wired + Default,
{
    let mut value = T::default();
    let mut fields = Fields::new(injector, T::PREFIX, mem::take(stack));
    fields.stack.push(TypeId::of::<T>());
    let result = value.wire(&mut fields);
    fields.stack.pop();
    *stack = fields.stack;
    result?;

    debug!(dependency = type_name::<T>(), "Autowired");

    injector.insert_autowired(value)
}

pub(crate) fn adapt<T: DeserializeOwned>(value: Value) -> Option<T> {
    if let Ok(value) = serde_json::from_value::<T>(value.clone()) {
        return Some(value);
    }
    let Value::String(source) = value else {
        return None;
    };
    if let Ok(value) = serde_json::from_str::<T>(&source) {
        return Some(value);
    }

    let items = source.split(',').map(str::trim).collect::<Vec<_>>();
    let strings = items.iter().map(|item| Value::String((*item).to_owned())).collect();
    if let Ok(value) = serde_json::from_value::<T>(Value::Array(strings)) {
        return Some(value);
    }
    let parsed = items
        .iter()
        .map(|item| serde_json::from_str::<Value>(item).unwrap_or_else(|_| Value::String((*item).to_owned())))
        .collect();
    serde_json::from_value::<T>(Value::Array(parsed)).ok()
}

#[cfg(test)]
mod tests {
    use super::{adapt, Fields, Wired};
    use crate::{errors::InjectErrorKind, Container};

    use serde_json::json;
    use std::sync::Arc;
    use figment::Jail;
    use tracing_test::traced_test;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    struct Database {
        url: &'static str,
    }

    #[derive(Default)]
    struct Pool {
        size: u32,
        hosts: Vec<String>,
    }

    impl Wired for Pool {
        fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
            fields.property("size", &mut self.size);
            fields.property("hosts", &mut self.hosts);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Repository {
        database: Option<Arc<Database>>,
        clock: Option<Arc<dyn Clock>>,
        pool: Pool,
        name: String,
    }

    impl Wired for Repository {
        const PREFIX: &'static str = "repository";

        fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
            fields.inject("database", &mut self.database);
            fields.inject_named("clock", &mut self.clock);
            fields.nested("pool", &mut self.pool)?;
            fields.property("name", &mut self.name);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Parent {
        child: Option<Arc<Child>>,
    }

    #[derive(Default)]
    struct Child {
        parent: Option<Arc<Parent>>,
    }

    impl Wired for Parent {
        fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
            fields.autowire("child", &mut self.child);
            Ok(())
        }
    }

    impl Wired for Child {
        fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
            fields.autowire("parent", &mut self.parent);
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_into_object() {
        Jail::expect_with(|_| {
            let container = Container::new();
            container.set_instance(Database { url: "postgres://db" });
            container.set_shared_instance("clock", Arc::new(FixedClock) as Arc<dyn Clock>);
            container.set_property("repository.pool.size", 8);
            container.set_property("repository.pool.hosts", "a.local, b.local");
            container.set_property("repository.name", "${REPOSITORY_NAME:orders}");

            let mut repository = Repository::default();
            container.injector().into_object(&mut repository).unwrap();

            assert_eq!(repository.database.unwrap().url, "postgres://db");
            assert_eq!(repository.clock.unwrap().now(), 42);
            assert_eq!(repository.pool.size, 8);
            assert_eq!(repository.pool.hosts, ["a.local", "b.local"]);
            assert_eq!(repository.name, "orders");
            Ok(())
        });
    }

    #[test]
    #[traced_test]
    fn test_incorrect_type_is_skipped() {
        Jail::expect_with(|_| {
            let container = Container::new();
            container.set_named_instance("clock", 5u8);
            container.set_property("repository.pool.size", "many");

            let mut repository = Repository::default();
            container.injector().into_object(&mut repository).unwrap();

            assert!(repository.clock.is_none());
            assert_eq!(repository.pool.size, 0);
            assert!(logs_contain("Instance has incorrect type, field skipped"));
            assert!(logs_contain("Property has incorrect type, field skipped"));
            Ok(())
        });
    }

    #[test]
    #[traced_test]
    fn test_circular_autowire_is_cut() {
        let container = Container::new();

        let parent = container.injector().autowire::<Parent>().unwrap();
        let child = parent.child.as_ref().unwrap();

        assert!(child.parent.is_none());
        assert!(logs_contain("Circular field injection, field skipped"));
        assert!(Arc::ptr_eq(child, &container.get_instance::<Child>().unwrap()));
    }

    #[test]
    fn test_adapt() {
        assert_eq!(adapt::<u16>(json!("8080")), Some(8080));
        assert_eq!(adapt::<Vec<String>>(json!("a,b")), Some(vec!["a".to_owned(), "b".to_owned()]));
        assert_eq!(adapt::<Vec<String>>(json!(["a"])), Some(vec!["a".to_owned()]));
        assert_eq!(adapt::<String>(json!("plain")), Some("plain".to_owned()));
        assert_eq!(adapt::<bool>(json!({ "key": 1 })), None);
    }

    #[test]
    fn test_adapt_comma_separated() {
        assert_eq!(adapt::<Vec<u16>>(json!("80, 443")), Some(vec![80, 443]));
        assert_eq!(adapt::<Vec<String>>(json!("80,443")), Some(vec!["80".to_owned(), "443".to_owned()]));
        assert_eq!(adapt::<String>(json!("Orders, Inc")), Some("Orders, Inc".to_owned()));
        assert_eq!(adapt::<Vec<u16>>(json!("80,web")), None);
    }
}
