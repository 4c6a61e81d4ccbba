#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationErrorKind {
    #[error("Component name can't be empty")]
    EmptyName,
    #[error("Component `{name}` is already registered")]
    DuplicateName { name: String },
}
