/// Config for a container
/// ## Fields
/// - `strict_dependencies`:
///   If `true`, a declared dependency that no registered component provides fails graph resolution.
///   Otherwise it's logged and treated as an external, already satisfied dependency.
///
///   Dependencies derived from parameter types are never strict, they may be set as instances later.
/// - `alias_by_type`:
///   If `true`, a built component is also stored under the lookup name of its type
///   when no other instance holds that name, so it can be injected by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub strict_dependencies: bool,
    pub alias_by_type: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_dependencies: false,
            alias_by_type: true,
        }
    }
}
