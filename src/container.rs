use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info_span, warn};

use crate::{
    any::{downcast, erase, TypeInfo},
    component::Component,
    config::Config,
    configurable::PendingConfiguration,
    context::Context,
    errors::{ContainerErrorKind, InjectErrorKind, RegistrationErrorKind},
    graph,
    injector::Injector,
    metadata::ComponentMetadata,
    properties::Properties,
    store::InstanceStore,
};

/// Build progress of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Unbuilt,
    PropertiesBuilt,
    ComponentsBuilt,
}

pub(crate) struct ContainerInner {
    pub(crate) store: InstanceStore,
    pub(crate) components: Mutex<Vec<Arc<ComponentMetadata>>>,
    pub(crate) configurations_pending: Mutex<Vec<PendingConfiguration>>,
    pub(crate) configurations: InstanceStore,
    pub(crate) properties: RwLock<Properties>,
    pub(crate) state: Mutex<BuildState>,
    pub(crate) build_lock: ReentrantMutex<()>,
    pub(crate) config: Config,
}

/// Component registry and instance store.
///
/// Clones share the same components and instances.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::with_properties(config, Properties::default())
    }

    #[must_use]
    pub fn with_properties(config: Config, properties: Properties) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                store: InstanceStore::new(),
                components: Mutex::new(Vec::new()),
                configurations_pending: Mutex::new(Vec::new()),
                configurations: InstanceStore::new(),
                properties: RwLock::new(properties),
                state: Mutex::new(BuildState::Unbuilt),
                build_lock: ReentrantMutex::new(()),
                config,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> Config {
        self.inner.config
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BuildState {
        *self.inner.state.lock()
    }

    pub(crate) fn advance_state(&self, state: BuildState) {
        let mut current = self.inner.state.lock();
        if *current < state {
            *current = state;
        }
    }

    /// Adds a component to be built by [`Container::build_components`].
    ///
    /// # Errors
    /// Empty or already registered name.
    pub fn register<T: Send + Sync + 'static>(&self, component: Component<T>) -> Result<(), RegistrationErrorKind> {
        self.register_metadata(component.into())
    }

    /// # Errors
    /// Empty or already registered name.
    pub fn register_named<T: Send + Sync + 'static>(&self, name: impl Into<String>, component: Component<T>) -> Result<(), RegistrationErrorKind> {
        self.register(component.named(name))
    }

    /// Registers every component, stopping at the first failure.
    ///
    /// # Errors
    /// Empty or already registered name.
    pub fn register_all<I>(&self, components: I) -> Result<(), RegistrationErrorKind>
    where
        I: IntoIterator<Item = ComponentMetadata>,
    {
        components.into_iter().try_for_each(|metadata| self.register_metadata(metadata))
    }

    /// # Errors
    /// Empty or already registered name.
    pub fn register_metadata(&self, metadata: ComponentMetadata) -> Result<(), RegistrationErrorKind> {
        if metadata.name().is_empty() {
            return Err(RegistrationErrorKind::EmptyName);
        }

        let mut components = self.inner.components.lock();
        if components.iter().any(|registered| registered.name() == metadata.name()) {
            let err = RegistrationErrorKind::DuplicateName {
                name: metadata.name().to_owned(),
            };
            warn!("{}", err);
            return Err(err);
        }

        debug!(component = metadata.name(), kind = ?metadata.kind(), "Registered");
        components.push(Arc::new(metadata));
        Ok(())
    }

    /// Registered components in registration order.
    #[must_use]
    pub fn components(&self) -> Vec<Arc<ComponentMetadata>> {
        self.inner.components.lock().clone()
    }

    /// Stores `value` under the lookup name of `T`, replacing the previous instance.
    pub fn set_instance<T: Send + Sync + 'static>(&self, value: T) -> Arc<T> {
        self.set_instance_as(Arc::new(value))
    }

    pub fn set_named_instance<T: Send + Sync + 'static>(&self, name: impl Into<String>, value: T) -> Arc<T> {
        self.set_shared_instance(name, Arc::new(value))
    }

    /// Stores `value` under the lookup name of `T`, which may be a capability object such as `dyn Trait`.
    pub fn set_instance_as<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> Arc<T> {
        self.set_shared_instance(TypeInfo::of::<T>().lookup_name(), value)
    }

    pub fn set_shared_instance<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<String>, value: Arc<T>) -> Arc<T> {
        let _guard = self.inner.build_lock.lock();

        let name = name.into();
        let metadata = ComponentMetadata::realized(name.clone(), TypeInfo::of::<T>(), erase(value.clone()));
        debug!(instance = %name, "Instance set");
        self.inner.store.set(name, Arc::new(metadata));
        value
    }

    #[must_use]
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_named_instance(&TypeInfo::of::<T>().lookup_name())
    }

    #[must_use]
    pub fn get_named_instance<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.inner.store.get_instance(name).and_then(|instance| downcast(&instance))
    }

    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<Arc<ComponentMetadata>> {
        self.inner.store.get(name)
    }

    /// Stored instances by name.
    #[must_use]
    pub fn items(&self) -> Vec<(String, Arc<ComponentMetadata>)> {
        self.inner.store.items()
    }

    /// Every stored instance usable as `Cap`.
    #[must_use]
    pub fn get_list_by_capability<Cap: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<Cap>> {
        self.inner.store.list_by_capability::<Cap>()
    }

    #[inline]
    #[must_use]
    pub fn injector(&self) -> Injector {
        Injector::new(self.clone(), None)
    }

    /// Injector that reads and stores request-scoped instances in `context` first.
    #[inline]
    #[must_use]
    pub fn runtime_injector(&self, context: Context) -> Injector {
        Injector::new(self.clone(), Some(context))
    }

    /// Builds a single component right away and stores it, bypassing the dependency graph.
    ///
    /// # Errors
    /// [`ContainerErrorKind::Inject`] when a parameter can't be resolved or the factory fails.
    pub fn inject_dependency<T: Send + Sync + 'static>(&self, component: Component<T>) -> Result<Arc<T>, ContainerErrorKind> {
        let _guard = self.inner.build_lock.lock();

        let metadata = Arc::new(ComponentMetadata::from(component));
        let name = metadata.name().to_owned();
        let into_err = |source| ContainerErrorKind::Inject { component: name.clone(), source };

        let instance = self.injector().inject_dependency(&metadata).map_err(into_err)?;
        downcast(&instance).ok_or_else(|| {
            into_err(InjectErrorKind::IncorrectType {
                name: name.clone(),
                expected: TypeInfo::of::<T>().name,
            })
        })
    }

    /// Stores a realized component under its name and, when enabled and free, under its type lookup name.
    pub(crate) fn store_component(&self, metadata: &Arc<ComponentMetadata>) {
        self.inner.store.set(metadata.name(), metadata.clone());

        if !self.inner.config.alias_by_type {
            return;
        }
        if let Some(lookup_name) = metadata.lookup_name() {
            if lookup_name != metadata.name() {
                self.inner.store.get_or_insert(lookup_name, metadata.clone());
            }
        }
    }

    /// Resolves the dependency graph of the registered components and builds them in order.
    ///
    /// Realized components are skipped, so repeated calls keep the instances.
    /// A component that fails is logged and skipped, the rest are still built.
    ///
    /// # Errors
    /// - [`ContainerErrorKind::Graph`] when the graph can't be resolved, nothing is built then
    /// - [`ContainerErrorKind::Inject`] with the first failed component
    pub fn build_components(&self) -> Result<(), ContainerErrorKind> {
        let span = info_span!("build_components");
        let _span_guard = span.enter();
        let _guard = self.inner.build_lock.lock();

        let components = self.components();
        let resolved = graph::resolve(&components, self.inner.config.strict_dependencies).map_err(|err| {
            error!("{}", err);
            err
        })?;

        let injector = self.injector();
        let mut first_err = None;
        for metadata in &resolved {
            if metadata.is_realized() {
                debug!(component = metadata.name(), "Already realized");
                continue;
            }
            if let Err(err) = injector.inject_dependency(metadata) {
                error!(component = metadata.name(), "{}", err);
                if first_err.is_none() {
                    first_err = Some(ContainerErrorKind::Inject {
                        component: metadata.name().to_owned(),
                        source: err,
                    });
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                self.advance_state(BuildState::ComponentsBuilt);
                debug!(components = resolved.len(), "Components built");
                Ok(())
            }
        }
    }
}
