use std::{mem, sync::Arc};
use tracing::{debug, error, info_span};

use crate::{
    any::{downcast, Instance, TypeInfo},
    component::Component,
    errors::{ContainerErrorKind, RegistrationErrorKind},
    graph,
    metadata::ComponentMetadata,
    utils::naming::to_lower_camel,
    Container,
};

/// Provider of components, usually built from its own methods.
///
/// ```rust
/// use std::sync::Arc;
/// use fabrik::{Component, ComponentMetadata, Configuration, Container, InstantiateErrorKind};
///
/// struct Pool {
///     size: u32,
/// }
///
/// struct DatabaseConfiguration {
///     pool_size: u32,
/// }
///
/// impl DatabaseConfiguration {
///     fn pool(self: Arc<Self>) -> Result<Pool, InstantiateErrorKind> {
///         Ok(Pool { size: self.pool_size })
///     }
/// }
///
/// impl Configuration for DatabaseConfiguration {
///     fn components(self: Arc<Self>) -> Vec<ComponentMetadata> {
///         vec![Component::method(self, "pool", Self::pool).into()]
///     }
/// }
///
/// let container = Container::new();
/// container.register_configuration(Component::value(DatabaseConfiguration { pool_size: 4 })).unwrap();
/// container.build_configurations().unwrap();
/// container.build_components().unwrap();
///
/// assert_eq!(container.get_instance::<Pool>().unwrap().size, 4);
/// assert!(container.configuration::<DatabaseConfiguration>("database").is_some());
/// ```
pub trait Configuration: Send + Sync + 'static {
    fn components(self: Arc<Self>) -> Vec<ComponentMetadata>;
}

pub(crate) struct PendingConfiguration {
    pub(crate) metadata: Arc<ComponentMetadata>,
    expand: fn(&Instance) -> Option<Vec<ComponentMetadata>>,
}

fn expand<C: Configuration>(instance: &Instance) -> Option<Vec<ComponentMetadata>> {
    downcast::<C>(instance).map(Configuration::components)
}

/// `DatabaseConfiguration` is named `database`, a type named just `Configuration` takes its package name.
#[must_use]
pub(crate) fn configuration_name(type_info: &TypeInfo) -> String {
    let short_name = type_info.short_name();
    let name = to_lower_camel(&short_name.replace("Configuration", ""));
    if name.is_empty() {
        type_info.package_name().unwrap_or(short_name).to_owned()
    } else {
        name
    }
}

impl Container {
    /// Adds a configuration to be built by [`Container::build_configurations`].
    ///
    /// # Errors
    /// Empty or already registered configuration name.
    pub fn register_configuration<C: Configuration>(&self, component: Component<C>) -> Result<(), RegistrationErrorKind> {
        let name = component
            .explicit_name()
            .map_or_else(|| configuration_name(&TypeInfo::of::<C>()), ToOwned::to_owned);
        if name.is_empty() {
            return Err(RegistrationErrorKind::EmptyName);
        }

        let mut pending = self.inner.configurations_pending.lock();
        if pending.iter().any(|configuration| configuration.metadata.name() == name) || self.inner.configurations.contains(&name) {
            return Err(RegistrationErrorKind::DuplicateName { name });
        }

        debug!(configuration = name, "Configuration registered");
        pending.push(PendingConfiguration {
            metadata: Arc::new(component.named(name).into()),
            expand: expand::<C>,
        });
        Ok(())
    }

    /// Builds the registered configurations in dependency order, stores them and registers their components.
    ///
    /// # Errors
    /// - [`ContainerErrorKind::Graph`] when the configurations depend on each other in a cycle
    /// - [`ContainerErrorKind::Inject`] or [`ContainerErrorKind::Registration`] with the first failure,
    ///   the remaining configurations are still built
    pub fn build_configurations(&self) -> Result<(), ContainerErrorKind> {
        let span = info_span!("build_configurations");
        let _span_guard = span.enter();
        let _guard = self.inner.build_lock.lock();

        let pending = mem::take(&mut *self.inner.configurations_pending.lock());
        let metadata = pending.iter().map(|configuration| configuration.metadata.clone()).collect::<Vec<_>>();
        let resolved = match graph::resolve(&metadata, self.inner.config.strict_dependencies) {
            Ok(resolved) => resolved,
            Err(err) => {
                error!("{}", err);
                self.inner.configurations_pending.lock().extend(pending);
                return Err(err.into());
            }
        };

        let injector = self.injector();
        let mut first_err: Option<ContainerErrorKind> = None;
        for metadata in resolved {
            let Some(configuration) = pending.iter().find(|configuration| Arc::ptr_eq(&configuration.metadata, &metadata)) else {
                continue;
            };

            let instance = match injector.inject_dependency(&metadata) {
                Ok(instance) => instance,
                Err(err) => {
                    error!(configuration = metadata.name(), "{}", err);
                    first_err.get_or_insert(ContainerErrorKind::Inject {
                        component: metadata.name().to_owned(),
                        source: err,
                    });
                    continue;
                }
            };
            self.inner.configurations.set(metadata.name(), metadata.clone());

            let components = (configuration.expand)(&instance).unwrap_or_default();
            debug!(configuration = metadata.name(), components = components.len(), "Configuration built");

            for component in components {
                if let Err(err) = self.register_metadata(component) {
                    first_err.get_or_insert(err.into());
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Built configuration stored under `name`.
    #[must_use]
    pub fn configuration<C: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<C>> {
        self.inner.configurations.get(name).and_then(|metadata| metadata.get::<C>())
    }
}

#[cfg(test)]
mod tests {
    use super::{configuration_name, Configuration};
    use crate::{
        errors::{ContainerErrorKind, InjectErrorKind, RegistrationErrorKind},
        inject::Inject,
        Component, ComponentMetadata, Container, Fields, InstantiateErrorKind, TypeInfo, Wired,
    };

    use std::sync::Arc;
    use figment::Jail;
    use tracing_test::traced_test;

    mod billing {
        pub struct Configuration;
    }

    struct Topic;

    struct MessagingConfiguration;

    impl Configuration for MessagingConfiguration {
        fn components(self: Arc<Self>) -> Vec<ComponentMetadata> {
            vec![Component::value(Topic).into()]
        }
    }

    struct Broker {
        url: String,
    }

    struct Consumer {
        broker: Arc<Broker>,
        group: &'static str,
    }

    #[derive(Default)]
    struct QueueConfiguration {
        url: String,
    }

    impl QueueConfiguration {
        fn broker(self: Arc<Self>) -> Result<Broker, InstantiateErrorKind> {
            Ok(Broker { url: self.url.clone() })
        }

        fn consumer(self: Arc<Self>, Inject(broker): Inject<Broker>) -> Result<Consumer, InstantiateErrorKind> {
            Ok(Consumer { broker, group: "orders" })
        }
    }

    impl Wired for QueueConfiguration {
        const PREFIX: &'static str = "queue";

        fn wire(&mut self, fields: &mut Fields<'_>) -> Result<(), InjectErrorKind> {
            fields.property("url", &mut self.url);
            Ok(())
        }
    }

    impl Configuration for QueueConfiguration {
        fn components(self: Arc<Self>) -> Vec<ComponentMetadata> {
            vec![
                Component::method(self.clone(), "Consumer", Self::consumer).into(),
                Component::method(self, "Broker", Self::broker).into(),
            ]
        }
    }

    #[test]
    fn test_configuration_name() {
        assert_eq!(configuration_name(&TypeInfo::of::<QueueConfiguration>()), "queue");
        assert_eq!(configuration_name(&TypeInfo::of::<MessagingConfiguration>()), "messaging");
        assert_eq!(configuration_name(&TypeInfo::of::<billing::Configuration>()), "billing");
        assert_eq!(configuration_name(&TypeInfo::of::<Broker>()), "broker");
    }

    #[test]
    #[traced_test]
    fn test_build_configurations() {
        Jail::expect_with(|_| {
            let container = Container::new();
            container.set_property("queue.url", "amqp://localhost");
            container.register_configuration(Component::value(QueueConfiguration::default()).wired()).unwrap();

            container.build_configurations().unwrap();

            assert_eq!(container.configuration::<QueueConfiguration>("queue").unwrap().url, "amqp://localhost");
            assert_eq!(container.components().len(), 2);

            container.build_components().unwrap();

            let consumer = container.get_instance::<Consumer>().unwrap();
            assert_eq!(consumer.broker.url, "amqp://localhost");
            assert_eq!(consumer.group, "orders");
            assert!(Arc::ptr_eq(&consumer.broker, &container.get_instance::<Broker>().unwrap()));
            Ok(())
        });
    }

    #[test]
    #[traced_test]
    fn test_duplicate_configuration() {
        let container = Container::new();
        container.register_configuration(Component::value(MessagingConfiguration)).unwrap();

        assert_eq!(
            container.register_configuration(Component::value(MessagingConfiguration)).unwrap_err(),
            RegistrationErrorKind::DuplicateName {
                name: "messaging".to_owned()
            }
        );

        container
            .register_configuration(Component::value(MessagingConfiguration).named("events"))
            .unwrap();
    }

    #[test]
    #[traced_test]
    fn test_duplicate_component_is_reported() {
        let container = Container::new();
        container.register(Component::value(Topic)).unwrap();
        container.register_configuration(Component::value(MessagingConfiguration)).unwrap();

        assert!(matches!(
            container.build_configurations().unwrap_err(),
            ContainerErrorKind::Registration(RegistrationErrorKind::DuplicateName { .. })
        ));
        assert!(container.configuration::<MessagingConfiguration>("messaging").is_some());
    }
}
