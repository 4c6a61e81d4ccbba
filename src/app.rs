use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span};

use crate::{
    actions::{ActionFailure, ActionRegistry, PostInit, Shutdown, Startup},
    container::Container,
    errors::ContainerErrorKind,
};

/// Container with its startup, shutdown and post-initialization actions.
///
/// Lifecycle: [`Application::build`], [`Application::after_initialization`], [`Application::run_startup`],
/// and [`Application::shutdown`] at exit.
#[derive(Clone, Default)]
pub struct Application {
    container: Container,
    startup: ActionRegistry<Startup>,
    shutdown: ActionRegistry<Shutdown>,
    post_processors: ActionRegistry<PostInit>,
}

impl Application {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_container(container: Container) -> Self {
        Self {
            container,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub const fn container(&self) -> &Container {
        &self.container
    }

    #[inline]
    #[must_use]
    pub const fn startup(&self) -> &ActionRegistry<Startup> {
        &self.startup
    }

    #[inline]
    #[must_use]
    pub const fn shutdown_actions(&self) -> &ActionRegistry<Shutdown> {
        &self.shutdown
    }

    #[inline]
    #[must_use]
    pub const fn post_processors(&self) -> &ActionRegistry<PostInit> {
        &self.post_processors
    }

    /// Builds the properties, then the configurations, then the components.
    ///
    /// # Errors
    /// The first error of a build step. Later steps are not run after a properties or configuration error.
    pub fn build(&self) -> Result<(), ContainerErrorKind> {
        let span = info_span!("build");
        let _guard = span.enter();

        self.container.build_properties()?;
        self.container.build_configurations()?;
        self.container.build_components()?;

        info!("Application built");
        Ok(())
    }

    /// Initializes and runs the post-processors.
    pub fn after_initialization(&self) -> Vec<ActionFailure> {
        self.post_processors.init(&self.container.injector());
        self.post_processors.run()
    }

    /// Initializes and runs the startup actions.
    pub fn run_startup(&self) -> Vec<ActionFailure> {
        self.startup.init(&self.container.injector());
        self.startup.run()
    }

    /// Initializes and runs the shutdown actions.
    pub fn shutdown(&self) -> Vec<ActionFailure> {
        self.shutdown.init(&self.container.injector());
        self.shutdown.run()
    }

    #[inline]
    pub fn set_property<V: Serialize>(&self, name: &str, value: V) {
        self.container.set_property(name, value);
    }

    #[inline]
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<Value> {
        self.container.get_property(name)
    }
}

#[cfg(test)]
mod tests {
    use super::Application;
    use crate::{
        inject::Inject, BuildState, Component, InstantiateErrorKind, PostProcessor, ShutdownAction, StartupAction, SystemConfiguration,
    };

    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use figment::Jail;
    use tracing_test::traced_test;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Server {
        port: u16,
        journal: Journal,
    }

    impl StartupAction for Server {
        fn run(&self) -> anyhow::Result<()> {
            self.journal.lock().push(format!("listen {}", self.port));
            Ok(())
        }
    }

    impl ShutdownAction for Server {
        fn shutdown(&self) -> anyhow::Result<()> {
            self.journal.lock().push(format!("close {}", self.port));
            Ok(())
        }
    }

    struct Ready {
        journal: Journal,
    }

    impl PostProcessor for Ready {
        fn after_initialization(&self) -> anyhow::Result<()> {
            self.journal.lock().push("ready".to_owned());
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_lifecycle() {
        Jail::expect_with(|_| {
            let journal = Journal::default();
            let app = Application::new();
            app.set_property("server.port", 8081);

            app.container()
                .register(Component::function({
                    let journal = journal.clone();
                    move |Inject(system): Inject<SystemConfiguration>| {
                        let port = system.app.version.len() as u16 + 8000;
                        Ok::<_, InstantiateErrorKind>(Server {
                            port,
                            journal: journal.clone(),
                        })
                    }
                }))
                .unwrap();

            app.startup()
                .register(|Inject(server): Inject<Server>| Ok::<_, InstantiateErrorKind>(Listen(server)));
            app.shutdown_actions()
                .register(|Inject(server): Inject<Server>| Ok::<_, InstantiateErrorKind>(Close(server)));
            app.post_processors().register({
                let journal = journal.clone();
                move || {
                    Ok::<_, InstantiateErrorKind>(Ready {
                        journal: journal.clone(),
                    })
                }
            });

            app.build().unwrap();

            assert_eq!(app.container().state(), BuildState::ComponentsBuilt);
            assert_eq!(app.get_property("server.port"), Some(json!(8081)));
            assert!(app.after_initialization().is_empty());
            assert!(app.run_startup().is_empty());
            assert!(app.shutdown().is_empty());
            assert_eq!(*journal.lock(), ["ready", "listen 8002", "close 8002"]);
            Ok(())
        });
    }

    struct Listen(Arc<Server>);

    impl StartupAction for Listen {
        fn run(&self) -> anyhow::Result<()> {
            self.0.run()
        }
    }

    struct Close(Arc<Server>);

    impl ShutdownAction for Close {
        fn shutdown(&self) -> anyhow::Result<()> {
            self.0.shutdown()
        }
    }

    #[test]
    #[traced_test]
    fn test_failing_startup_continues() {
        Jail::expect_with(|_| {
            let app = Application::new();
            app.startup().register_fn("migrations", || Err(anyhow::anyhow!("schema is locked")));
            app.startup().register_fn("cache", || Ok(()));

            app.build().unwrap();
            let failures = app.run_startup();

            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, "migrations");
            assert!(logs_contain("schema is locked"));
            Ok(())
        });
    }
}
