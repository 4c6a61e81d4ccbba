use parking_lot::Mutex;
use std::{
    any::{Any, TypeId},
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock},
};

use crate::{
    any::{downcast, Instance, TypeInfo},
    dependency::Dependency,
    errors::InjectErrorKind,
    injector::Injector,
    instantiator::{BoxedCloneInstantiator, Finisher},
    service::Service as _,
    utils::naming::to_lower_camel,
};

/// Cast from a realized instance to an erased capability object.
pub(crate) type Caster = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

pub(crate) enum ComponentKind {
    Function {
        instantiator: BoxedCloneInstantiator,
        finisher: Finisher,
    },
    Method {
        method_name: String,
        owner: TypeInfo,
        instantiator: BoxedCloneInstantiator,
        finisher: Finisher,
    },
    Value {
        value: Mutex<Option<(Box<dyn Any + Send>, Finisher)>>,
    },
    External,
}

/// Kind of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Function,
    Method,
    Value,
    External,
}

pub struct ComponentMetadata {
    pub(crate) name: String,
    pub(crate) type_info: Option<TypeInfo>,
    pub(crate) kind: ComponentKind,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) capabilities: BTreeMap<TypeId, Caster>,
    pub(crate) resolved: Mutex<Vec<Arc<ComponentMetadata>>>,
    pub(crate) instance: OnceLock<Instance>,
}

impl ComponentMetadata {
    pub(crate) fn new(name: String, type_info: Option<TypeInfo>, kind: ComponentKind) -> Self {
        Self {
            name,
            type_info,
            kind,
            dependencies: Vec::new(),
            capabilities: BTreeMap::new(),
            resolved: Mutex::new(Vec::new()),
            instance: OnceLock::new(),
        }
    }

    /// Placeholder for a dependency name no registered component provides.
    #[must_use]
    pub fn external(name: impl Into<String>) -> Self {
        Self::new(name.into(), None, ComponentKind::External)
    }

    /// Metadata for an instance created outside the container.
    #[must_use]
    pub fn realized(name: impl Into<String>, type_info: TypeInfo, instance: Instance) -> Self {
        let metadata = Self::new(name.into(), Some(type_info), ComponentKind::Value { value: Mutex::new(None) });
        let _ = metadata.instance.set(instance);
        metadata
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self.kind {
            ComponentKind::Function { .. } => Kind::Function,
            ComponentKind::Method { .. } => Kind::Method,
            ComponentKind::Value { .. } => Kind::Value,
            ComponentKind::External => Kind::External,
        }
    }

    #[inline]
    #[must_use]
    pub fn type_info(&self) -> Option<TypeInfo> {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        self.type_info.map(|type_info| type_info.name)
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> Option<&'static str> {
        self.type_info.map(|type_info| type_info.short_name())
    }

    #[inline]
    #[must_use]
    pub fn package_name(&self) -> Option<&'static str> {
        self.type_info.and_then(|type_info| type_info.package_name())
    }

    #[inline]
    #[must_use]
    pub fn lookup_name(&self) -> Option<String> {
        self.type_info.map(|type_info| type_info.lookup_name())
    }

    /// Lower camel method name and its `package.method` form, for method components only.
    #[must_use]
    pub fn method_names(&self) -> Option<(String, String)> {
        let ComponentKind::Method { method_name, owner, .. } = &self.kind else {
            return None;
        };
        let method_name = to_lower_camel(method_name);
        let qualified = match owner.package_name() {
            Some(package) => format!("{package}.{method_name}"),
            None => method_name.clone(),
        };
        Some((method_name, qualified))
    }

    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|dependency| dependency.name.as_str())
    }

    /// Dependencies matched by the last graph resolution.
    #[must_use]
    pub fn resolved_dependencies(&self) -> Vec<Arc<ComponentMetadata>> {
        self.resolved.lock().clone()
    }

    #[inline]
    #[must_use]
    pub fn instance(&self) -> Option<Instance> {
        self.instance.get().cloned()
    }

    #[inline]
    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.instance.get().is_some()
    }

    /// Realized instance as `T`, if it has that type.
    #[must_use]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instance.get().and_then(downcast::<T>)
    }

    /// Realized instance as the capability `Cap`, either directly or through a declared cast.
    #[must_use]
    pub fn cast<Cap: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<Cap>> {
        let instance = self.instance.get()?;
        if let Some(value) = downcast::<Cap>(instance) {
            return Some(value);
        }
        let caster = self.capabilities.get(&TypeId::of::<Cap>())?;
        caster(instance).as_ref().and_then(downcast::<Cap>)
    }

    /// Produces the instance of this component without storing it.
    pub(crate) fn produce(&self, injector: &Injector) -> Result<Instance, InjectErrorKind> {
        match &self.kind {
            ComponentKind::Function { instantiator, finisher } | ComponentKind::Method { instantiator, finisher, .. } => {
                let raw = instantiator.clone().call(injector.clone()).map_err(|err| err.into_inject(&self.name))?;
                finisher(raw, &self.name, injector)
            }
            ComponentKind::Value { value } => {
                let Some((raw, finisher)) = value.lock().take() else {
                    return Err(InjectErrorKind::NotRealized { name: self.name.clone() });
                };
                finisher(raw, &self.name, injector)
            }
            ComponentKind::External => Err(InjectErrorKind::NotFound { name: self.name.clone() }),
        }
    }
}

impl Debug for ComponentMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMetadata")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("type_name", &self.type_name())
            .field("dependencies", &self.dependencies)
            .field("realized", &self.is_realized())
            .finish_non_exhaustive()
    }
}
