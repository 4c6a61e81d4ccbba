use super::{graph::GraphErrorKind, inject::InjectErrorKind, registration::RegistrationErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ContainerErrorKind {
    #[error(transparent)]
    Registration(#[from] RegistrationErrorKind),
    #[error(transparent)]
    Graph(#[from] GraphErrorKind),
    #[error("Injection of component `{component}` failed: {source}")]
    Inject {
        component: String,
        #[source]
        source: InjectErrorKind,
    },
    #[error("Properties can't be built: {0}")]
    Properties(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ContainerErrorKind {
    fn from(err: figment::Error) -> Self {
        Self::Properties(Box::new(err))
    }
}
