use std::{
    any::{type_name, Any},
    sync::Arc,
};
use tracing::debug;

use crate::{
    any::{erase, Instance},
    dependency_resolver::DependencyResolver,
    errors::{InjectErrorKind, InstantiateErrorKind},
    fields::Wired,
    injector::Injector,
    service::{service_fn, BoxCloneService},
};

/// A constructor whose parameters are resolved by the injector.
pub trait Instantiator<Deps>: Clone + Send + Sync + 'static
where
    Deps: DependencyResolver,
{
    type Provides: Send + Sync + 'static;
    type Error: Into<InstantiateErrorKind>;

    fn instantiate(&mut self, dependencies: Deps) -> Result<Self::Provides, Self::Error>;
}

/// A constructor bound to an owner that is always passed as the first argument.
pub trait MethodInstantiator<Owner, Deps>: Clone + Send + Sync + 'static
where
    Owner: ?Sized + Send + Sync + 'static,
    Deps: DependencyResolver,
{
    type Provides: Send + Sync + 'static;
    type Error: Into<InstantiateErrorKind>;

    fn instantiate(&mut self, owner: Arc<Owner>, dependencies: Deps) -> Result<Self::Provides, Self::Error>;
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum InstantiatorErrorKind {
    #[error(transparent)]
    Deps(InjectErrorKind),
    #[error(transparent)]
    Factory(InstantiateErrorKind),
}

impl InstantiatorErrorKind {
    pub(crate) fn into_inject(self, component: &str) -> InjectErrorKind {
        match self {
            Self::Deps(err) => InjectErrorKind::Dependency(Box::new(err)),
            Self::Factory(source) => InjectErrorKind::Factory {
                component: component.to_owned(),
                source,
            },
        }
    }
}

pub(crate) type BoxedCloneInstantiator = BoxCloneService<Injector, Box<dyn Any + Send>, InstantiatorErrorKind>;

/// Converts a raw produced value into a shareable [`Instance`].
pub(crate) type Finisher = fn(Box<dyn Any + Send>, &str, &Injector) -> Result<Instance, InjectErrorKind>;

#[must_use]
pub(crate) fn boxed_instantiator_factory<Inst, Deps>(instantiator: Inst) -> BoxedCloneInstantiator
where
    Inst: Instantiator<Deps>,
    Deps: DependencyResolver + 'static,
{
    BoxCloneService(Box::new(service_fn({
        move |injector: Injector| {
            let dependencies = Deps::resolve(&injector).map_err(InstantiatorErrorKind::Deps)?;
            let provides = instantiator
                .clone()
                .instantiate(dependencies)
                .map_err(|err| InstantiatorErrorKind::Factory(err.into()))?;

            debug!("Instantiated");

            Ok(Box::new(provides) as Box<dyn Any + Send>)
        }
    })))
}

#[must_use]
pub(crate) fn boxed_method_factory<Owner, Inst, Deps>(owner: Arc<Owner>, instantiator: Inst) -> BoxedCloneInstantiator
where
    Owner: ?Sized + Send + Sync + 'static,
    Inst: MethodInstantiator<Owner, Deps>,
    Deps: DependencyResolver + 'static,
{
    BoxCloneService(Box::new(service_fn({
        move |injector: Injector| {
            let dependencies = Deps::resolve(&injector).map_err(InstantiatorErrorKind::Deps)?;
            let provides = instantiator
                .clone()
                .instantiate(owner.clone(), dependencies)
                .map_err(|err| InstantiatorErrorKind::Factory(err.into()))?;

            debug!("Instantiated by method");

            Ok(Box::new(provides) as Box<dyn Any + Send>)
        }
    })))
}

fn take<T: Send + Sync + 'static>(value: Box<dyn Any + Send>, name: &str) -> Result<T, InjectErrorKind> {
    value.downcast::<T>().map(|value| *value).map_err(|_| InjectErrorKind::IncorrectType {
        name: name.to_owned(),
        expected: type_name::<T>(),
    })
}

pub(crate) fn finish_plain<T: Send + Sync + 'static>(value: Box<dyn Any + Send>, name: &str, _injector: &Injector) -> Result<Instance, InjectErrorKind> {
    take::<T>(value, name).map(|value| erase(Arc::new(value)))
}

pub(crate) fn finish_wired<T: Wired>(value: Box<dyn Any + Send>, name: &str, injector: &Injector) -> Result<Instance, InjectErrorKind> {
    let mut value = take::<T>(value, name)?;
    injector.into_object(&mut value)?;
    Ok(erase(Arc::new(value)))
}

macro_rules! impl_instantiator {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Response, Err, $($ty,)*> Instantiator<($($ty,)*)> for F
        where
            F: FnMut($($ty,)*) -> Result<Response, Err> + Clone + Send + Sync + 'static,
            Response: Send + Sync + 'static,
            Err: Into<InstantiateErrorKind>,
            $( $ty: DependencyResolver, )*
        {
            type Provides = Response;
            type Error = Err;

            fn instantiate(&mut self, ($($ty,)*): ($($ty,)*)) -> Result<Self::Provides, Self::Error> {
                self($($ty,)*)
            }
        }

        #[allow(non_snake_case)]
        impl<F, Owner, Response, Err, $($ty,)*> MethodInstantiator<Owner, ($($ty,)*)> for F
        where
            F: FnMut(Arc<Owner>, $($ty,)*) -> Result<Response, Err> + Clone + Send + Sync + 'static,
            Owner: ?Sized + Send + Sync + 'static,
            Response: Send + Sync + 'static,
            Err: Into<InstantiateErrorKind>,
            $( $ty: DependencyResolver, )*
        {
            type Provides = Response;
            type Error = Err;

            fn instantiate(&mut self, owner: Arc<Owner>, ($($ty,)*): ($($ty,)*)) -> Result<Self::Provides, Self::Error> {
                self(owner, $($ty,)*)
            }
        }
    };
}

all_the_tuples!(impl_instantiator);

/// Wrapper to create an instantiator that just returns passed value.
/// It can be used when the value was created outside the container.
#[inline]
#[must_use]
pub fn instance<T: Clone + Send + Sync + 'static>(val: T) -> impl Instantiator<(), Provides = T, Error = InstantiateErrorKind> {
    move || Ok(val.clone())
}

#[cfg(test)]
mod tests {
    use super::{boxed_instantiator_factory, boxed_method_factory, instance, InstantiatorErrorKind, Instantiator};
    use crate::{dependency_resolver::DependencyResolver, errors::InjectErrorKind, inject::Inject, service::Service as _, Container, InstantiateErrorKind};

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };
    use tracing::debug;
    use tracing_test::traced_test;

    struct Request(bool);
    struct Response(bool);

    struct Router {
        prefix: &'static str,
    }

    #[test]
    #[allow(dead_code)]
    fn test_factory_helper() {
        fn resolver<Deps: DependencyResolver, F: Instantiator<Deps>>(_f: F) {}
        fn resolver_with_dep() {
            resolver(|| Ok::<_, InstantiateErrorKind>(()));
            resolver(instance(1u8));
        }
    }

    #[test]
    #[traced_test]
    fn test_boxed_instantiator_factory() {
        let instantiator_response_call_count = Arc::new(AtomicU8::new(0));

        let mut instantiator_response = boxed_instantiator_factory({
            let instantiator_response_call_count = instantiator_response_call_count.clone();
            move |Inject(request): Inject<Request>| {
                instantiator_response_call_count.fetch_add(1, Ordering::SeqCst);

                debug!("Call instantiator response");
                Ok::<_, InstantiateErrorKind>(Response(request.0))
            }
        });

        let container = Container::new();
        container.set_instance(Request(true));

        let response_1 = instantiator_response.call(container.injector()).unwrap();
        let response_2 = instantiator_response.call(container.injector()).unwrap();

        assert!(response_1.downcast::<Response>().unwrap().0);
        assert!(response_2.downcast::<Response>().unwrap().0);
        assert_eq!(instantiator_response_call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[traced_test]
    fn test_missing_dependency_skips_invocation() {
        let call_count = Arc::new(AtomicU8::new(0));

        let mut instantiator = boxed_instantiator_factory({
            let call_count = call_count.clone();
            move |Inject(request): Inject<Request>| {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, InstantiateErrorKind>(Response(request.0))
            }
        });

        let err = instantiator.call(Container::new().injector()).err().unwrap();

        assert!(matches!(err, InstantiatorErrorKind::Deps(InjectErrorKind::NotInjected { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[traced_test]
    fn test_boxed_method_factory() {
        let router = Arc::new(Router { prefix: "/api" });

        let mut instantiator = boxed_method_factory(router, |router: Arc<Router>, Inject(request): Inject<Request>| {
            Ok::<_, InstantiateErrorKind>(format!("{}:{}", router.prefix, request.0))
        });

        let container = Container::new();
        container.set_instance(Request(false));

        let route = instantiator.call(container.injector()).unwrap();

        assert_eq!(*route.downcast::<String>().unwrap(), "/api:false");
    }

    #[test]
    #[traced_test]
    fn test_factory_error() {
        let mut instantiator = boxed_instantiator_factory(|| Err::<Response, _>(InstantiateErrorKind::Custom(anyhow::anyhow!("broken pipe"))));

        let err = instantiator.call(Container::new().injector()).err().unwrap().into_inject("response");

        assert!(matches!(&err, InjectErrorKind::Factory { component, .. } if component == "response"));
        assert!(err.to_string().contains("broken pipe"));
    }
}
