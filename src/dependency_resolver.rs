use crate::{
    dependency::{extend_unique, Dependency},
    errors::InjectErrorKind,
    injector::Injector,
    Container,
};

/// A value that can be pulled out of an [`Injector`] as a factory parameter.
pub trait DependencyResolver: Sized {
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind>;

    /// Names of the components this resolver reads, used to order the dependency graph.
    #[inline]
    #[must_use]
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }
}

macro_rules! impl_dependency_resolver {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case, unused_mut)]
        impl<$($ty,)*> DependencyResolver for ($($ty,)*)
        where
            $( $ty: DependencyResolver, )*
        {
            #[inline]
            #[allow(unused_variables)]
            fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
                Ok(($($ty::resolve(injector)?,)*))
            }

            #[inline]
            fn dependencies() -> Vec<Dependency> {
                let mut dependencies = Vec::new();
                $( extend_unique(&mut dependencies, $ty::dependencies()); )*
                dependencies
            }
        }
    };
}

all_the_tuples!(impl_dependency_resolver);

impl<Dep: DependencyResolver> DependencyResolver for Option<Dep> {
    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
        Ok(Dep::resolve(injector).ok())
    }

    #[inline]
    fn dependencies() -> Vec<Dependency> {
        Dep::dependencies()
    }
}

impl DependencyResolver for Injector {
    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
        Ok(injector.clone())
    }
}

impl DependencyResolver for Container {
    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, InjectErrorKind> {
        Ok(injector.container().clone())
    }
}
