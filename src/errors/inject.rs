use super::instantiate::InstantiateErrorKind;

#[derive(thiserror::Error, Debug)]
pub enum InjectErrorKind {
    #[error("Instance of type `{type_name}` is not injected and can't be constructed")]
    NotInjected { type_name: &'static str },
    #[error("Instance `{name}` is not found")]
    NotFound { name: String },
    #[error("Instance `{name}` has incorrect type, expected `{expected}`")]
    IncorrectType { name: String, expected: &'static str },
    #[error("Dependency failed: {0}")]
    Dependency(Box<InjectErrorKind>),
    #[error("Factory of component `{component}` failed: {source}")]
    Factory {
        component: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Component `{name}` is not realized")]
    NotRealized { name: String },
}
