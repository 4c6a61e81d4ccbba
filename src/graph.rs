use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
    sync::Arc,
};
use tracing::{debug, error, trace, warn};

use crate::{
    dependency::DependencyOrigin,
    errors::{GraphEntry, GraphErrorKind},
    metadata::ComponentMetadata,
};

pub struct Node {
    /// Position in the resolved component list, `None` for external nodes.
    pub index: Option<usize>,
    pub name: String,
    pub data: Arc<ComponentMetadata>,
    /// Node indices this node depends on.
    pub deps: Vec<usize>,
}

impl Node {
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.index.is_none()
    }
}

/// Dependency graph over registered components.
///
/// Dependency names are matched against the components with a fixed list of strategies, unknown names
/// become external leaves and the graph is reduced level by level into a build order.
#[derive(Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
}

struct Keys {
    type_name: Option<&'static str>,
    name: String,
    lookup_name: Option<String>,
    short_name: Option<&'static str>,
    package_name: Option<&'static str>,
    method_names: Option<(String, String)>,
}

impl Keys {
    fn new(metadata: &ComponentMetadata) -> Self {
        Self {
            type_name: metadata.type_name(),
            name: metadata.name().to_owned(),
            lookup_name: metadata.lookup_name(),
            short_name: metadata.short_name(),
            package_name: metadata.package_name(),
            method_names: metadata.method_names(),
        }
    }
}

type Strategy = fn(&Keys, &str) -> bool;

const STRATEGIES: [Strategy; 5] = [
    |keys, name| keys.type_name == Some(name),
    |keys, name| keys.name == name || keys.lookup_name.as_deref() == Some(name),
    |keys, name| keys.short_name == Some(name),
    |keys, name| keys.package_name == Some(name),
    |keys, name| {
        keys.method_names
            .as_ref()
            .is_some_and(|(method_name, qualified)| method_name == name || qualified == name)
    },
];

fn find_dependency_index(keys: &[Keys], name: &str) -> Option<usize> {
    STRATEGIES
        .iter()
        .find_map(|strategy| keys.iter().position(|item| strategy(item, name)))
}

impl Graph {
    /// Builds the graph, adding an external node for every unknown dependency name.
    ///
    /// # Errors
    /// With `strict`, an unknown declared dependency is [`GraphErrorKind::MissingDependency`].
    pub fn build(components: &[Arc<ComponentMetadata>], strict: bool) -> Result<Self, GraphErrorKind> {
        let keys = components.iter().map(|metadata| Keys::new(metadata)).collect::<Vec<_>>();
        let mut nodes = components
            .iter()
            .enumerate()
            .map(|(index, metadata)| Node {
                index: Some(index),
                name: metadata.name().to_owned(),
                data: metadata.clone(),
                deps: Vec::new(),
            })
            .collect::<Vec<_>>();
        let mut externals = BTreeMap::new();

        for (index, metadata) in components.iter().enumerate() {
            let mut deps = Vec::with_capacity(metadata.dependencies().len());

            for dependency in metadata.dependencies() {
                let node_index = match find_dependency_index(&keys, &dependency.name) {
                    Some(node_index) => node_index,
                    None => {
                        match dependency.origin {
                            DependencyOrigin::Declared if strict => {
                                return Err(GraphErrorKind::MissingDependency {
                                    component: metadata.name().to_owned(),
                                    dependency: dependency.name.clone(),
                                });
                            }
                            DependencyOrigin::Declared => warn!("dependency {} is not found", dependency.name),
                            DependencyOrigin::Derived => {
                                debug!(component = metadata.name(), dependency = %dependency.name, "Expected to be set as instance");
                            }
                        }

                        *externals.entry(dependency.name.clone()).or_insert_with(|| {
                            nodes.push(Node {
                                index: None,
                                name: dependency.name.clone(),
                                data: Arc::new(ComponentMetadata::external(dependency.name.clone())),
                                deps: Vec::new(),
                            });
                            nodes.len() - 1
                        })
                    }
                };
                if !deps.contains(&node_index) {
                    deps.push(node_index);
                }
            }
            nodes[index].deps = deps;
        }

        Ok(Self { nodes })
    }

    /// Reduces the graph into build order. External nodes never appear in the result.
    ///
    /// # Errors
    /// [`GraphErrorKind::CircularDependency`] with the part of the graph that can't be reduced.
    pub fn reduce(&self) -> Result<Vec<usize>, GraphErrorKind> {
        let mut pending = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_external())
            .map(|(index, node)| {
                let deps = node
                    .deps
                    .iter()
                    .copied()
                    .filter(|dep| !self.nodes[*dep].is_external())
                    .collect::<BTreeSet<_>>();
                (index, deps)
            })
            .collect::<BTreeMap<usize, BTreeSet<usize>>>();
        let mut order = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(index, _)| *index)
                .collect::<Vec<_>>();

            if ready.is_empty() {
                let remaining = pending
                    .iter()
                    .map(|(index, deps)| GraphEntry {
                        name: self.nodes[*index].name.clone(),
                        dependencies: deps.iter().map(|dep| self.nodes[*dep].name.clone()).collect(),
                    })
                    .collect::<Vec<_>>();
                let remaining_nodes = pending.keys().map(|index| &self.nodes[*index]).collect::<Vec<_>>();

                error!("{}", display_dependency_graph("Circular dependency", &self.nodes, &remaining_nodes));
                return Err(GraphErrorKind::CircularDependency { remaining });
            }

            for index in &ready {
                pending.remove(index);
            }
            for deps in pending.values_mut() {
                for index in &ready {
                    deps.remove(index);
                }
            }
            order.extend(ready);
        }

        Ok(order)
    }
}

/// Renders `nodes` one edge per line: `position (origin): name -> dependency`.
#[must_use]
pub fn display_dependency_graph(title: &str, graph: &[Node], nodes: &[&Node]) -> String {
    let mut output = format!("{title}:");
    for (position, node) in nodes.iter().enumerate() {
        let origin = node.index.map_or_else(|| "-".to_owned(), |index| index.to_string());
        if node.deps.is_empty() {
            let _ = write!(output, "\n\t{position:4} ({origin:>4}): {}", node.name);
        }
        for dep in &node.deps {
            let _ = write!(output, "\n\t{position:4} ({origin:>4}): {} -> {}", node.name, graph[*dep].name);
        }
    }
    output
}

/// Orders `components` so that every component comes after the components it depends on,
/// and records the matched dependencies of each one.
///
/// # Errors
/// See [`Graph::build`] and [`Graph::reduce`].
pub fn resolve(components: &[Arc<ComponentMetadata>], strict: bool) -> Result<Vec<Arc<ComponentMetadata>>, GraphErrorKind> {
    let graph = Graph::build(components, strict)?;
    let order = graph.reduce()?;

    for node in &graph.nodes {
        *node.data.resolved.lock() = node.deps.iter().map(|dep| graph.nodes[*dep].data.clone()).collect();
    }

    let resolved = order.iter().map(|index| graph.nodes[*index].data.clone()).collect::<Vec<_>>();
    trace!(
        "{}",
        display_dependency_graph("Resolved", &graph.nodes, &order.iter().map(|index| &graph.nodes[*index]).collect::<Vec<_>>())
    );
    debug!(components = resolved.len(), "Dependency graph resolved");

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::{display_dependency_graph, resolve, Graph};
    use crate::{
        errors::GraphErrorKind,
        inject::Inject,
        metadata::{ComponentMetadata, Kind},
        Component, InstantiateErrorKind,
    };

    use std::sync::Arc;
    use tracing_test::traced_test;

    mod storage {
        pub struct Database;
    }

    struct Repository;
    struct Handler;
    struct Router;

    fn named(name: &str, dependencies: &[&str]) -> Arc<ComponentMetadata> {
        Arc::new(Component::value(()).named(name).depends_on(dependencies.iter().copied()).into())
    }

    fn names(resolved: &[Arc<ComponentMetadata>]) -> Vec<&str> {
        resolved.iter().map(|metadata| metadata.name()).collect()
    }

    #[test]
    #[traced_test]
    fn test_resolve_order() {
        let components = [named("c", &["b", "a"]), named("b", &["a"]), named("a", &[])];

        let resolved = resolve(&components, false).unwrap();

        assert_eq!(names(&resolved), ["a", "b", "c"]);
        assert_eq!(names(&components[0].resolved_dependencies()), ["b", "a"]);
    }

    #[test]
    #[traced_test]
    fn test_resolve_independent_keeps_registration_order() {
        let components = [named("z", &[]), named("y", &[]), named("x", &["z"])];

        assert_eq!(names(&resolve(&components, false).unwrap()), ["z", "y", "x"]);
    }

    #[test]
    #[traced_test]
    fn test_circular_dependency() {
        let components = [named("a", &["b"]), named("b", &["c"]), named("c", &["a"]), named("d", &[])];

        let err = resolve(&components, false).unwrap_err();

        let GraphErrorKind::CircularDependency { remaining } = err else {
            panic!("expected circular dependency");
        };
        assert_eq!(
            remaining.iter().map(|entry| (entry.name.as_str(), entry.dependencies.clone())).collect::<Vec<_>>(),
            [("a", vec!["b".to_owned()]), ("b", vec!["c".to_owned()]), ("c", vec!["a".to_owned()])]
        );
        assert!(logs_contain("Circular dependency"));
    }

    #[test]
    #[traced_test]
    fn test_self_dependency_is_circular() {
        let components = [named("a", &["a"])];

        assert!(matches!(
            resolve(&components, false),
            Err(GraphErrorKind::CircularDependency { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_external_dependency() {
        let components = [named("a", &["registry.client"]), named("b", &["a"])];

        let resolved = resolve(&components, false).unwrap();

        assert_eq!(names(&resolved), ["a", "b"]);
        let external = components[0].resolved_dependencies();
        assert_eq!(external[0].kind(), Kind::External);
        assert_eq!(external[0].name(), "registry.client");
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("dependency registry.client is not found")).count() {
                1 => Ok(()),
                count => Err(format!("expected one warning, got {count}")),
            }
        });
    }

    #[test]
    #[traced_test]
    fn test_strict_missing_dependency() {
        let components = [named("a", &["registry.client"])];

        assert_eq!(
            resolve(&components, true).unwrap_err(),
            GraphErrorKind::MissingDependency {
                component: "a".to_owned(),
                dependency: "registry.client".to_owned(),
            }
        );
    }

    #[test]
    #[traced_test]
    fn test_derived_missing_dependency_is_silent() {
        let components = [Arc::new(ComponentMetadata::from(Component::function(
            |Inject(_): Inject<Repository>| Ok::<_, InstantiateErrorKind>(Handler),
        )))];

        assert_eq!(resolve(&components, true).unwrap().len(), 1);
        assert!(!logs_contain("is not found"));
    }

    #[test]
    #[traced_test]
    fn test_match_strategies() {
        let database = Arc::new(ComponentMetadata::from(Component::value(storage::Database).named("primary")));
        let router = Arc::new(ComponentMetadata::from(Component::method(
            Arc::new(Router),
            "RouteTable",
            |_: Arc<Router>| Ok::<_, InstantiateErrorKind>(Handler),
        )));
        let by_type_name = named("by_type_name", &[std::any::type_name::<storage::Database>()]);
        let by_short_name = named("by_short_name", &["Database"]);
        let by_package = named("by_package", &["storage"]);
        let by_method = named("by_method", &["routeTable"]);
        let by_qualified_method = named("by_qualified_method", &["tests.routeTable"]);

        let components = [
            by_type_name.clone(),
            by_short_name.clone(),
            by_package.clone(),
            by_method.clone(),
            by_qualified_method.clone(),
            database,
            router,
        ];
        let resolved = resolve(&components, true).unwrap();

        assert_eq!(names(&resolved)[..2], ["primary", "tests.handler"]);
        for metadata in [&by_type_name, &by_short_name, &by_package] {
            assert_eq!(names(&metadata.resolved_dependencies()), ["primary"]);
        }
        for metadata in [&by_method, &by_qualified_method] {
            assert_eq!(names(&metadata.resolved_dependencies()), ["tests.handler"]);
        }
    }

    #[test]
    #[traced_test]
    fn test_display_dependency_graph() {
        let components = [named("a", &[]), named("b", &["a", "missing"])];
        let graph = Graph::build(&components, false).unwrap();
        let nodes = graph.nodes.iter().collect::<Vec<_>>();

        assert_eq!(
            display_dependency_graph("Graph", &graph.nodes, &nodes),
            "Graph:\n\t   0 (   0): a\n\t   1 (   1): b -> a\n\t   1 (   1): b -> missing\n\t   2 (   -): missing"
        );
    }
}
