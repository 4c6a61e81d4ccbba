mod container;
mod graph;
mod inject;
mod instantiate;
mod registration;

pub use container::ContainerErrorKind;
pub use graph::{GraphEntry, GraphErrorKind};
pub use inject::InjectErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use registration::RegistrationErrorKind;
