use parking_lot::Mutex;
use std::{any::TypeId, collections::BTreeMap, marker::PhantomData, sync::Arc};

use crate::{
    any::{downcast, erase, Instance, TypeInfo},
    dependency::{extend_unique, Dependency},
    dependency_resolver::DependencyResolver,
    fields::Wired,
    instantiator::{boxed_instantiator_factory, boxed_method_factory, finish_plain, finish_wired, Instantiator, MethodInstantiator},
    metadata::{Caster, ComponentKind, ComponentMetadata},
};

/// Typed registration of a component producing `T`.
///
/// ```rust
/// use fabrik::{Component, Container, Inject, InstantiateErrorKind};
///
/// struct Database;
/// struct Repository(std::sync::Arc<Database>);
///
/// let container = Container::new();
/// container.register(Component::value(Database)).unwrap();
/// container
///     .register(Component::function(|Inject(database): Inject<Database>| {
///         Ok::<_, InstantiateErrorKind>(Repository(database))
///     }))
///     .unwrap();
/// container.build_components().unwrap();
///
/// assert!(container.get_instance::<Repository>().is_some());
/// ```
pub struct Component<T> {
    name: Option<String>,
    kind: ComponentKind,
    dependencies: Vec<Dependency>,
    capabilities: BTreeMap<TypeId, Caster>,
    _provides: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Component<T> {
    fn new(kind: ComponentKind, dependencies: Vec<Dependency>) -> Self {
        Self {
            name: None,
            kind,
            dependencies,
            capabilities: BTreeMap::new(),
            _provides: PhantomData,
        }
    }

    /// Component built by calling `instantiator` with injected parameters.
    #[must_use]
    pub fn function<Inst, Deps>(instantiator: Inst) -> Self
    where
        Inst: Instantiator<Deps, Provides = T>,
        Deps: DependencyResolver + 'static,
    {
        Self::new(
            ComponentKind::Function {
                instantiator: boxed_instantiator_factory(instantiator),
                finisher: finish_plain::<T>,
            },
            Deps::dependencies(),
        )
    }

    /// Component built by a method of `owner`, which is passed as the first argument.
    #[must_use]
    pub fn method<Owner, Inst, Deps>(owner: Arc<Owner>, method_name: impl Into<String>, instantiator: Inst) -> Self
    where
        Owner: ?Sized + Send + Sync + 'static,
        Inst: MethodInstantiator<Owner, Deps, Provides = T>,
        Deps: DependencyResolver + 'static,
    {
        Self::new(
            ComponentKind::Method {
                method_name: method_name.into(),
                owner: TypeInfo::of::<Owner>(),
                instantiator: boxed_method_factory(owner, instantiator),
                finisher: finish_plain::<T>,
            },
            Deps::dependencies(),
        )
    }

    /// Already constructed component, only field injection remains if it's [`Component::wired`].
    #[must_use]
    pub fn value(value: T) -> Self {
        Self::new(
            ComponentKind::Value {
                value: Mutex::new(Some((Box::new(value), finish_plain::<T>))),
            },
            Vec::new(),
        )
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares dependencies the parameter types don't express.
    #[must_use]
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_unique(&mut self.dependencies, names.into_iter().map(Dependency::declared));
        self
    }

    /// Makes the component listable and injectable as `Cap`.
    #[must_use]
    pub fn capability<Cap>(mut self, cast: fn(Arc<T>) -> Arc<Cap>) -> Self
    where
        Cap: ?Sized + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |instance: &Instance| downcast::<T>(instance).map(|value| erase(cast(value))));
        self.capabilities.insert(TypeId::of::<Cap>(), caster);
        self
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| TypeInfo::of::<T>().lookup_name())
    }

    #[inline]
    #[must_use]
    pub(crate) fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl<T: Wired> Component<T> {
    /// Runs field injection on the produced value before it's stored.
    #[must_use]
    pub fn wired(mut self) -> Self {
        match &mut self.kind {
            ComponentKind::Function { finisher, .. } | ComponentKind::Method { finisher, .. } => *finisher = finish_wired::<T>,
            ComponentKind::Value { value } => {
                if let Some((_, finisher)) = value.get_mut() {
                    *finisher = finish_wired::<T>;
                }
            }
            ComponentKind::External => {}
        }
        self
    }
}

impl<T: Send + Sync + 'static> From<Component<T>> for ComponentMetadata {
    fn from(component: Component<T>) -> Self {
        let mut metadata = ComponentMetadata::new(component.name(), Some(TypeInfo::of::<T>()), component.kind);
        metadata.dependencies = component.dependencies;
        metadata.capabilities = component.capabilities;
        metadata
    }
}
