use std::{
    any::{type_name, TypeId},
    sync::Arc,
};
use tracing::{debug, debug_span, error};

use crate::{
    any::{downcast, erase, Instance, TypeInfo},
    context::Context,
    dependency_resolver::DependencyResolver,
    errors::InjectErrorKind,
    fields::{construct, Fields, Wired},
    instantiator::{Instantiator, MethodInstantiator},
    metadata::ComponentMetadata,
    store::InstanceStore,
    Container,
};

/// Injection handle over a container and an optional request-scoped [`Context`].
#[derive(Clone)]
pub struct Injector {
    container: Container,
    context: Option<Context>,
}

impl Injector {
    #[inline]
    #[must_use]
    pub(crate) fn new(container: Container, context: Option<Context>) -> Self {
        Self { container, context }
    }

    #[inline]
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Instance stored under `name`, context first.
    #[must_use]
    pub fn get_instance(&self, name: &str) -> Option<Instance> {
        self.context
            .as_ref()
            .and_then(|context| context.get_instance(name))
            .or_else(|| self.container.inner.store.get_instance(name))
    }

    /// Instance stored under the lookup name of `T`.
    ///
    /// # Errors
    /// [`InjectErrorKind::NotInjected`] when nothing is stored, [`InjectErrorKind::IncorrectType`] when the stored instance isn't a `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectErrorKind> {
        let type_info = TypeInfo::of::<T>();
        let span = debug_span!("get", dependency = type_info.name);
        let _guard = span.enter();

        let name = type_info.lookup_name();
        let Some(instance) = self.get_instance(&name) else {
            debug!("Not found");
            return Err(InjectErrorKind::NotInjected { type_name: type_info.name });
        };
        downcast(&instance).ok_or_else(|| {
            let err = InjectErrorKind::IncorrectType {
                name,
                expected: type_info.name,
            };
            error!("{}", err);
            err
        })
    }

    /// Instance stored under `name`.
    ///
    /// # Errors
    /// [`InjectErrorKind::NotFound`] or [`InjectErrorKind::IncorrectType`].
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, InjectErrorKind> {
        let Some(instance) = self.get_instance(name) else {
            return Err(InjectErrorKind::NotFound { name: name.to_owned() });
        };
        downcast(&instance).ok_or_else(|| InjectErrorKind::IncorrectType {
            name: name.to_owned(),
            expected: type_name::<T>(),
        })
    }

    /// Instance of `T`, constructed with field injection and stored when absent.
    ///
    /// # Errors
    /// Field injection errors and [`InjectErrorKind::IncorrectType`].
    pub fn autowire<T: Wired + Default>(&self) -> Result<Arc<T>, InjectErrorKind> {
        match self.get::<T>() {
            Err(InjectErrorKind::NotInjected { .. }) => construct::<T>(self, &mut Vec::new()),
            result => result,
        }
    }

    /// Runs field injection on `object`.
    ///
    /// # Errors
    /// Errors returned by [`Wired::wire`].
    pub fn into_object<T: Wired>(&self, object: &mut T) -> Result<(), InjectErrorKind> {
        let span = debug_span!("into_object", object = type_name::<T>());
        let _guard = span.enter();

        let mut fields = Fields::new(self, T::PREFIX, vec![TypeId::of::<T>()]);
        object.wire(&mut fields)
    }

    /// Calls `instantiator` with injected parameters. Nothing is called when a parameter can't be resolved.
    ///
    /// # Errors
    /// [`InjectErrorKind::Dependency`] or [`InjectErrorKind::Factory`].
    pub fn into_function<Deps, Inst>(&self, mut instantiator: Inst) -> Result<Inst::Provides, InjectErrorKind>
    where
        Deps: DependencyResolver,
        Inst: Instantiator<Deps>,
    {
        let dependencies = Deps::resolve(self).map_err(|err| InjectErrorKind::Dependency(Box::new(err)))?;
        instantiator.instantiate(dependencies).map_err(|err| InjectErrorKind::Factory {
            component: type_name::<Inst::Provides>().to_owned(),
            source: err.into(),
        })
    }

    /// As [`Injector::into_function`], with `owner` passed as the first argument.
    ///
    /// # Errors
    /// [`InjectErrorKind::Dependency`] or [`InjectErrorKind::Factory`].
    pub fn into_method<Owner, Deps, Inst>(&self, owner: Arc<Owner>, mut instantiator: Inst) -> Result<Inst::Provides, InjectErrorKind>
    where
        Owner: ?Sized + Send + Sync + 'static,
        Deps: DependencyResolver,
        Inst: MethodInstantiator<Owner, Deps>,
    {
        let dependencies = Deps::resolve(self).map_err(|err| InjectErrorKind::Dependency(Box::new(err)))?;
        instantiator.instantiate(owner, dependencies).map_err(|err| InjectErrorKind::Factory {
            component: type_name::<Inst::Provides>().to_owned(),
            source: err.into(),
        })
    }

    /// Realizes `metadata` once and stores it in the container.
    pub(crate) fn inject_dependency(&self, metadata: &Arc<ComponentMetadata>) -> Result<Instance, InjectErrorKind> {
        if let Some(instance) = metadata.instance() {
            return Ok(instance);
        }

        let span = debug_span!("inject", component = metadata.name());
        let _guard = span.enter();

        let instance = metadata.produce(self)?;
        let instance = metadata.instance.get_or_init(|| instance).clone();
        self.container.store_component(metadata);

        debug!("Injected");
        Ok(instance)
    }

    /// Stores an autowired value under its lookup name; concurrent constructions converge on the first one stored.
    pub(crate) fn insert_autowired<T: Send + Sync + 'static>(&self, value: T) -> Result<Arc<T>, InjectErrorKind> {
        let type_info = TypeInfo::of::<T>();
        let name = type_info.lookup_name();
        let metadata = Arc::new(ComponentMetadata::realized(name.clone(), type_info, erase(Arc::new(value))));

        let store: &InstanceStore = match &self.context {
            Some(context) => &context.store,
            None => &self.container.inner.store,
        };
        store.get_or_insert(name.clone(), metadata).get::<T>().ok_or(InjectErrorKind::IncorrectType {
            name,
            expected: type_info.name,
        })
    }
}
