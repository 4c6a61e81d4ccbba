use std::fmt::{self, Display, Formatter};

/// A node left over after the graph was reduced as far as possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntry {
    pub name: String,
    pub dependencies: Vec<String>,
}

impl Display for GraphEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for dependency in &self.dependencies {
            write!(f, " -> {dependency}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    CircularDependency { remaining: Vec<GraphEntry> },
    MissingDependency { component: String, dependency: String },
}

impl Display for GraphErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GraphErrorKind::CircularDependency { remaining } => {
                write!(f, "Circular dependency detected among: ")?;
                for (index, entry) in remaining.iter().enumerate() {
                    if index > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{entry}")?;
                }
                Ok(())
            }
            GraphErrorKind::MissingDependency { component, dependency } => {
                write!(f, "Dependency `{dependency}` of component `{component}` is not found")
            }
        }
    }
}
