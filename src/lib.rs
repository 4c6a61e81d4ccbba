#[macro_use]
pub(crate) mod macros;

pub(crate) mod actions;
pub(crate) mod any;
pub(crate) mod app;
pub(crate) mod component;
pub(crate) mod config;
pub(crate) mod configurable;
pub(crate) mod container;
pub(crate) mod context;
pub(crate) mod dependency;
pub(crate) mod dependency_resolver;
pub(crate) mod errors;
pub(crate) mod fields;
pub(crate) mod graph;
pub(crate) mod inject;
pub(crate) mod injector;
pub(crate) mod instantiator;
pub(crate) mod metadata;
pub(crate) mod properties;
pub(crate) mod service;
pub(crate) mod store;

pub mod utils;

pub use actions::{
    ActionFailure, ActionFn, ActionHandle, ActionRegistry, IntoAction, Phase, PostInit, PostProcessor, Shutdown, ShutdownAction, Startup,
    StartupAction, LAST_PRIORITY,
};
pub use any::{Instance, TypeInfo};
pub use app::Application;
pub use component::Component;
pub use config::Config;
pub use configurable::Configuration;
pub use container::{BuildState, Container};
pub use context::Context;
pub use dependency::{Dependency, DependencyOrigin};
pub use dependency_resolver::DependencyResolver;
pub use errors::{ContainerErrorKind, GraphEntry, GraphErrorKind, InjectErrorKind, InstantiateErrorKind, RegistrationErrorKind};
pub use fields::{Fields, Wired};
pub use graph::{display_dependency_graph, resolve, Graph, Node};
pub use inject::{Autowired, Inject};
pub use injector::Injector;
pub use instantiator::{instance, Instantiator, MethodInstantiator};
pub use metadata::{ComponentMetadata, Kind};
pub use properties::{AppProperties, LoggingProperties, ProfilesProperties, Properties, SystemConfiguration};
pub use store::InstanceStore;
