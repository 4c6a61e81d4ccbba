use std::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::utils::naming::{split_type_path, to_lower_camel};

/// Type-erased realized component.
///
/// Always holds an `Arc<T>` so that unsized values such as `dyn Trait` can be stored and shared.
pub type Instance = Arc<dyn Any + Send + Sync>;

#[inline]
#[must_use]
pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

#[inline]
#[must_use]
pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    /// Last path segment without generics: `app::db::Database<T>` gives `Database`.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let (path, _) = split_type_path(self.name);
        path.last().copied().unwrap_or(self.name)
    }

    /// Module that declares the type: `app::db::Database` gives `db`.
    #[must_use]
    pub fn package_name(&self) -> Option<&'static str> {
        let (path, _) = split_type_path(self.name);
        path.len().checked_sub(2).and_then(|index| path.get(index).copied())
    }

    /// Canonical store key of the type: `package.lowerCamelShortName`, generics kept verbatim.
    #[must_use]
    pub fn lookup_name(&self) -> String {
        let (_, generics) = split_type_path(self.name);
        let short = to_lower_camel(self.short_name());
        match self.package_name() {
            Some(package) => format!("{package}.{short}{generics}"),
            None => format!("{short}{generics}"),
        }
    }
}
