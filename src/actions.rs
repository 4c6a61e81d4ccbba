use parking_lot::Mutex;
use std::{
    any::Any,
    convert::Infallible,
    marker::PhantomData,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info_span, warn};

use crate::{
    any::TypeInfo,
    dependency_resolver::DependencyResolver,
    errors::InjectErrorKind,
    injector::Injector,
    instantiator::Instantiator,
    service::{service_fn, BoxCloneService, Service as _},
};

/// Priority that makes an action run after the regularly registered ones.
pub const LAST_PRIORITY: i32 = 9999;

pub trait StartupAction: Send + Sync {
    fn run(&self) -> anyhow::Result<()>;
}

pub trait ShutdownAction: Send + Sync {
    fn shutdown(&self) -> anyhow::Result<()>;
}

pub trait PostProcessor: Send + Sync {
    fn after_initialization(&self) -> anyhow::Result<()>;
}

/// A lifecycle phase and the action object it invokes.
pub trait Phase: Send + Sync + 'static {
    type Action: ?Sized + Send + Sync;

    const NAME: &'static str;

    fn invoke(action: &Self::Action) -> anyhow::Result<()>;
}

pub struct Startup;
pub struct Shutdown;
pub struct PostInit;

impl Phase for Startup {
    type Action = dyn StartupAction;

    const NAME: &'static str = "startup";

    fn invoke(action: &Self::Action) -> anyhow::Result<()> {
        action.run()
    }
}

impl Phase for Shutdown {
    type Action = dyn ShutdownAction;

    const NAME: &'static str = "shutdown";

    fn invoke(action: &Self::Action) -> anyhow::Result<()> {
        action.shutdown()
    }
}

impl Phase for PostInit {
    type Action = dyn PostProcessor;

    const NAME: &'static str = "post_init";

    fn invoke(action: &Self::Action) -> anyhow::Result<()> {
        action.after_initialization()
    }
}

/// Conversion of a constructed registrant into the action object of a phase.
pub trait IntoAction<P: Phase>: Send + Sync + 'static {
    fn into_action(self: Arc<Self>) -> Arc<P::Action>;
}

impl<T: StartupAction + 'static> IntoAction<Startup> for T {
    fn into_action(self: Arc<Self>) -> Arc<dyn StartupAction> {
        self
    }
}

impl<T: ShutdownAction + 'static> IntoAction<Shutdown> for T {
    fn into_action(self: Arc<Self>) -> Arc<dyn ShutdownAction> {
        self
    }
}

impl<T: PostProcessor + 'static> IntoAction<PostInit> for T {
    fn into_action(self: Arc<Self>) -> Arc<dyn PostProcessor> {
        self
    }
}

/// Closure usable as an action of any phase.
#[derive(Clone)]
pub struct ActionFn<F>(pub F);

impl<F: Fn() -> anyhow::Result<()> + Send + Sync> StartupAction for ActionFn<F> {
    fn run(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl<F: Fn() -> anyhow::Result<()> + Send + Sync> ShutdownAction for ActionFn<F> {
    fn shutdown(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl<F: Fn() -> anyhow::Result<()> + Send + Sync> PostProcessor for ActionFn<F> {
    fn after_initialization(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Action `{name}` failed: {error:#}")]
pub struct ActionFailure {
    pub name: String,
    pub error: anyhow::Error,
}

type BoxedActionFactory<P> = BoxCloneService<Injector, Arc<<P as Phase>::Action>, InjectErrorKind>;

struct ActionInfo<P: Phase> {
    id: u64,
    name: String,
    priority: i32,
    factory: BoxedActionFactory<P>,
    action: Option<Arc<P::Action>>,
}

type Entries<P> = Arc<Mutex<Vec<ActionInfo<P>>>>;

/// Ordered list of actions of the phase `P`.
///
/// Entries are kept sorted by ascending priority. A new entry gets the current length of the list
/// as its priority, so entries run in registration order unless moved.
pub struct ActionRegistry<P: Phase> {
    entries: Entries<P>,
    next_id: Arc<AtomicU64>,
}

impl<P: Phase> Clone for ActionRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<P: Phase> Default for ActionRegistry<P> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn sort<P: Phase>(entries: &mut [ActionInfo<P>]) {
    entries.sort_by_key(|entry| entry.priority);
}

impl<P: Phase> ActionRegistry<P> {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory of the action under the lookup name of the type it produces.
    pub fn register<Deps, Inst>(&self, instantiator: Inst) -> ActionHandle<P>
    where
        Deps: DependencyResolver + 'static,
        Inst: Instantiator<Deps>,
        Inst::Provides: IntoAction<P>,
    {
        self.register_named(TypeInfo::of::<Inst::Provides>().lookup_name(), instantiator)
    }

    pub fn register_named<Deps, Inst>(&self, name: impl Into<String>, instantiator: Inst) -> ActionHandle<P>
    where
        Deps: DependencyResolver + 'static,
        Inst: Instantiator<Deps>,
        Inst::Provides: IntoAction<P>,
    {
        let factory = BoxCloneService(Box::new(service_fn(move |injector: Injector| {
            let provides = injector.into_function::<Deps, _>(instantiator.clone())?;
            Ok(<Inst::Provides as IntoAction<P>>::into_action(Arc::new(provides)))
        })));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let mut entries = self.entries.lock();
        let priority = i32::try_from(entries.len()).unwrap_or(LAST_PRIORITY);

        debug!(phase = P::NAME, action = %name, priority, "Action registered");
        entries.push(ActionInfo {
            id,
            name,
            priority,
            factory,
            action: None,
        });
        sort(&mut entries);

        ActionHandle {
            id: Some(id),
            entries: self.entries.clone(),
            _phase: PhantomData,
        }
    }

    /// Registers a closure without dependencies.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> ActionHandle<P>
    where
        F: Fn() -> anyhow::Result<()> + Clone + Send + Sync + 'static,
        ActionFn<F>: IntoAction<P>,
    {
        self.register_named(name, move || Ok::<_, Infallible>(ActionFn(f.clone())))
    }

    /// Handle of the first entry named `name`. Operations on a handle of an unknown entry do nothing.
    #[must_use]
    pub fn handle(&self, name: &str) -> ActionHandle<P> {
        let id = self.entries.lock().iter().find(|entry| entry.name == name).map(|entry| entry.id);
        ActionHandle {
            id,
            entries: self.entries.clone(),
            _phase: PhantomData,
        }
    }

    /// Entry names with their priorities in run order.
    #[must_use]
    pub fn priorities(&self) -> Vec<(String, i32)> {
        self.entries.lock().iter().map(|entry| (entry.name.clone(), entry.priority)).collect()
    }

    /// Entry names in run order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().iter().map(|entry| entry.name.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Builds the action objects with `injector`. An entry that can't be built is logged and skipped.
    ///
    /// Returns the number of entries ready to run.
    pub fn init(&self, injector: &Injector) -> usize {
        let span = info_span!("init_actions", phase = P::NAME);
        let _guard = span.enter();

        let pending = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.action.is_none())
            .map(|entry| (entry.id, entry.name.clone(), entry.factory.clone()))
            .collect::<Vec<_>>();

        for (id, name, mut factory) in pending {
            match factory.call(injector.clone()) {
                Ok(action) => {
                    if let Some(entry) = self.entries.lock().iter_mut().find(|entry| entry.id == id) {
                        entry.action = Some(action);
                    }
                    debug!(action = %name, "Action initialized");
                }
                Err(err) => warn!(action = %name, "Action skipped: {err}"),
            }
        }

        self.entries.lock().iter().filter(|entry| entry.action.is_some()).count()
    }

    /// Runs the initialized actions in ascending priority.
    ///
    /// Errors and panics are caught per action, the remaining actions still run.
    pub fn run(&self) -> Vec<ActionFailure> {
        let span = info_span!("run_actions", phase = P::NAME);
        let _guard = span.enter();

        let actions = self
            .entries
            .lock()
            .iter()
            .filter_map(|entry| entry.action.clone().map(|action| (entry.name.clone(), action)))
            .collect::<Vec<_>>();

        let mut failures = Vec::new();
        for (name, action) in actions {
            let error = match catch_unwind(AssertUnwindSafe(|| P::invoke(&*action))) {
                Ok(Ok(())) => {
                    debug!(action = %name, "Action done");
                    continue;
                }
                Ok(Err(err)) => err,
                Err(payload) => anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
            };

            let failure = ActionFailure { name, error };
            error!("{}", failure);
            failures.push(failure);
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Handle of a registered entry, used to move it in the run order.
pub struct ActionHandle<P: Phase> {
    id: Option<u64>,
    entries: Entries<P>,
    _phase: PhantomData<P>,
}

impl<P: Phase> Clone for ActionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            entries: self.entries.clone(),
            _phase: PhantomData,
        }
    }
}

impl<P: Phase> ActionHandle<P> {
    fn update(&self, f: impl FnOnce(&mut ActionInfo<P>, Option<i32>)) {
        let Some(id) = self.id else {
            return;
        };

        let mut entries = self.entries.lock();
        let tail = if entries.len() <= 1 { None } else { entries.last().map(|entry| entry.priority) };
        if let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) {
            f(entry, tail);
            sort(&mut entries);
        }
    }

    pub fn set_priority(&self, priority: i32) -> &Self {
        self.update(|entry, _| entry.priority = priority);
        self
    }

    /// Moves the entry behind every other one: [`LAST_PRIORITY`], or one after the current tail when it's already there.
    pub fn set_last(&self) -> &Self {
        self.update(|entry, tail| {
            entry.priority = match tail {
                Some(tail) if tail >= LAST_PRIORITY => tail + 1,
                _ => LAST_PRIORITY,
            };
        });
        self
    }

    pub fn set_name(&self, name: impl Into<String>) -> &Self {
        let name = name.into();
        self.update(move |entry, _| entry.name = name);
        self
    }

    #[must_use]
    pub fn priority(&self) -> Option<i32> {
        let id = self.id?;
        self.entries.lock().iter().find(|entry| entry.id == id).map(|entry| entry.priority)
    }

    #[must_use]
    pub fn name(&self) -> Option<String> {
        let id = self.id?;
        self.entries.lock().iter().find(|entry| entry.id == id).map(|entry| entry.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionRegistry, PostInit, PostProcessor, Shutdown, Startup, StartupAction, LAST_PRIORITY};
    use crate::{inject::Inject, Container, InstantiateErrorKind};

    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_test::traced_test;

    type Journal = Arc<Mutex<Vec<&'static str>>>;

    fn record(journal: &Journal, entry: &'static str) -> impl Fn() -> anyhow::Result<()> + Clone + Send + Sync + 'static {
        let journal = journal.clone();
        move || {
            journal.lock().push(entry);
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_set_last_order() {
        let journal = Journal::default();
        let registry = ActionRegistry::<Startup>::new();

        let p1 = registry.register_fn("p1", record(&journal, "p1"));
        registry.register_fn("p2", record(&journal, "p2"));
        registry.register_fn("p3", record(&journal, "p3"));
        p1.set_last();

        assert_eq!(registry.names(), ["p2", "p3", "p1"]);
        assert_eq!(p1.priority(), Some(LAST_PRIORITY));

        registry.init(&Container::new().injector());
        assert!(registry.run().is_empty());
        assert_eq!(*journal.lock(), ["p2", "p3", "p1"]);
    }

    #[test]
    #[traced_test]
    fn test_set_last_behind_last_priority() {
        let journal = Journal::default();
        let registry = ActionRegistry::<Shutdown>::new();

        let p1 = registry.register_fn("p1", record(&journal, "p1"));
        let p2 = registry.register_fn("p2", record(&journal, "p2"));
        p1.set_last();
        p2.set_last();

        assert_eq!(registry.priorities(), [("p1".to_owned(), LAST_PRIORITY), ("p2".to_owned(), LAST_PRIORITY + 1)]);
    }

    #[test]
    #[traced_test]
    fn test_set_last_single_and_unknown() {
        let registry = ActionRegistry::<Startup>::new();
        let only = registry.register_fn("only", || Ok(()));
        only.set_last();

        assert_eq!(only.priority(), Some(LAST_PRIORITY));

        let unknown = registry.handle("missing");
        unknown.set_last().set_priority(-1);

        assert_eq!(unknown.priority(), None);
        assert_eq!(registry.priorities(), [("only".to_owned(), LAST_PRIORITY)]);
    }

    #[test]
    #[traced_test]
    fn test_set_priority_and_name() {
        let registry = ActionRegistry::<PostInit>::new();
        registry.register_fn("a", || Ok(()));
        let b = registry.register_fn("b", || Ok(()));
        b.set_priority(-5).set_name("first");

        assert_eq!(registry.names(), ["first", "a"]);
        assert_eq!(registry.handle("first").priority(), Some(-5));
    }

    #[test]
    #[traced_test]
    fn test_failures_are_collected() {
        let journal = Journal::default();
        let registry = ActionRegistry::<Startup>::new();
        registry.register_fn("broken", || Err(anyhow::anyhow!("port is busy")));
        registry.register_fn("panicking", || panic!("bad state"));
        registry.register_fn("healthy", record(&journal, "healthy"));

        registry.init(&Container::new().injector());
        let failures = registry.run();

        assert_eq!(
            failures.iter().map(|failure| failure.name.as_str()).collect::<Vec<_>>(),
            ["broken", "panicking"]
        );
        assert!(failures[0].to_string().contains("port is busy"));
        assert!(failures[1].to_string().contains("bad state"));
        assert_eq!(*journal.lock(), ["healthy"]);
    }

    struct Greeting(&'static str);

    struct Announce {
        greeting: Arc<Greeting>,
        journal: Journal,
    }

    impl StartupAction for Announce {
        fn run(&self) -> anyhow::Result<()> {
            self.journal.lock().push(self.greeting.0);
            Ok(())
        }
    }

    struct Warmup;

    impl PostProcessor for Warmup {
        fn after_initialization(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn test_injected_actions() {
        let journal = Journal::default();
        let container = Container::new();
        container.set_instance(Greeting("hello"));

        let registry = ActionRegistry::<Startup>::new();
        let handle = registry.register({
            let journal = journal.clone();
            move |Inject(greeting): Inject<Greeting>| {
                Ok::<_, InstantiateErrorKind>(Announce {
                    greeting,
                    journal: journal.clone(),
                })
            }
        });
        registry.register_named("unresolvable", |Inject(_): Inject<str>| {
            Ok::<_, InstantiateErrorKind>(Announce {
                greeting: Arc::new(Greeting("never")),
                journal: Journal::default(),
            })
        });

        assert_eq!(handle.name().unwrap(), "tests.announce");
        assert_eq!(registry.init(&container.injector()), 1);
        assert!(registry.run().is_empty());
        assert_eq!(*journal.lock(), ["hello"]);
        assert!(logs_contain("Action skipped"));

        let post = ActionRegistry::<PostInit>::new();
        post.register(|| Ok::<_, InstantiateErrorKind>(Warmup));

        assert_eq!(post.init(&container.injector()), 1);
    }
}
