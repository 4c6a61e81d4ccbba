use std::sync::Arc;

use crate::{
    any::TypeInfo,
    dependency::Dependency,
    dependency_resolver::DependencyResolver,
    errors::InjectErrorKind,
    fields::Wired,
    injector::Injector,
};

/// Shared instance looked up by the lookup name of `Dep`. Never constructed on demand,
/// so it suits capability objects (`dyn Trait`) and collections.
pub struct Inject<Dep: ?Sized>(pub Arc<Dep>);

impl<Dep: ?Sized + Send + Sync + 'static> DependencyResolver for Inject<Dep> {
    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
        injector.get().map(Self)
    }

    #[inline]
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::derived(TypeInfo::of::<Dep>().lookup_name())]
    }
}

/// Shared instance of `Dep`, constructed with `Default` and field injection when it's absent.
pub struct Autowired<Dep>(pub Arc<Dep>);

impl<Dep: Wired + Default> DependencyResolver for Autowired<Dep> {
    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
        injector.autowire().map(Self)
    }

    #[inline]
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::derived(TypeInfo::of::<Dep>().lookup_name())]
    }
}
