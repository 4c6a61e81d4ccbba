use std::fmt::{self, Display, Formatter};

/// Where a dependency name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyOrigin {
    /// Listed by the registrant via `depends_on`.
    Declared,
    /// Taken from the static type of an injected parameter.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dependency {
    pub name: String,
    pub origin: DependencyOrigin,
}

impl Dependency {
    #[inline]
    #[must_use]
    pub fn declared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: DependencyOrigin::Declared,
        }
    }

    #[inline]
    #[must_use]
    pub fn derived(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: DependencyOrigin::Derived,
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Appends `dependencies` keeping the first occurrence of every name.
pub(crate) fn extend_unique(target: &mut Vec<Dependency>, dependencies: impl IntoIterator<Item = Dependency>) {
    for dependency in dependencies {
        if !target.iter().any(|existing| existing.name == dependency.name) {
            target.push(dependency);
        }
    }
}
