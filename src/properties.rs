use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, env, path::PathBuf, sync::Arc};
use tracing::{debug, info_span, warn};

use crate::{
    any::{erase, TypeInfo},
    container::BuildState,
    errors::ContainerErrorKind,
    fields::adapt,
    metadata::ComponentMetadata,
    Container,
};

pub const PROFILES_ACTIVE_ENV: &str = "APP_PROFILES_ACTIVE";
pub const PROFILES_ACTIVE_PROPERTY: &str = "app.profiles.active";
pub const PROFILES_INCLUDE_PROPERTY: &str = "app.profiles.include";
pub const DEFAULT_PROFILE: &str = "default";
pub const SYSTEM_CONFIGURATION: &str = "system";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfiguration {
    pub app: AppProperties,
    pub logging: LoggingProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppProperties {
    pub is_run_in_cli: bool,
    pub title: String,
    pub project: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub terms_of_service: String,
    pub profiles: ProfilesProperties,
}

impl Default for AppProperties {
    fn default() -> Self {
        Self {
            is_run_in_cli: false,
            title: String::new(),
            project: String::new(),
            name: String::new(),
            description: String::new(),
            version: "v1".to_owned(),
            terms_of_service: String::new(),
            profiles: ProfilesProperties::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesProperties {
    pub active: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub include: Vec<String>,
}

impl Default for ProfilesProperties {
    fn default() -> Self {
        Self {
            active: DEFAULT_PROFILE.to_owned(),
            include: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingProperties {
    pub level: String,
}

impl Default for LoggingProperties {
    fn default() -> Self {
        Self { level: "info".to_owned() }
    }
}

fn string_or_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrSeq {
        String(String),
        Seq(Vec<String>),
    }

    Ok(match StringOrSeq::deserialize(deserializer)? {
        StringOrSeq::String(source) => split_list(&source),
        StringOrSeq::Seq(items) => items,
    })
}

fn split_list(source: &str) -> Vec<String> {
    source
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Property sources of a container, later overriding earlier:
/// 1. [`SystemConfiguration::default`]
/// 2. defaults set with [`Container::set_default_property`]
/// 3. `{config_dir}/application.toml`
/// 4. `{config_dir}/application-{profile}.toml` for the active profile and every `app.profiles.include`
/// 5. environment variables with the `FABRIK_` prefix, `__` separating nested keys
/// 6. properties set with [`Container::set_property`]
pub struct Properties {
    defaults: BTreeMap<String, Value>,
    overrides: BTreeMap<String, Value>,
    config_dir: PathBuf,
    env_prefix: String,
    merged: Option<Figment>,
    system: Option<Arc<SystemConfiguration>>,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            defaults: BTreeMap::new(),
            overrides: BTreeMap::new(),
            config_dir: PathBuf::from("config"),
            env_prefix: "FABRIK_".to_owned(),
            merged: None,
            system: None,
        }
    }
}

impl Properties {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    #[must_use]
    pub fn with_env_prefix(mut self, env_prefix: impl Into<String>) -> Self {
        self.env_prefix = env_prefix.into();
        self
    }

    /// Overrides the property `name`. Values are stored as given, comma separated strings
    /// are split only when read into a sequence.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.overrides.insert(name.into(), value);
        self.merged = None;
    }

    pub fn set_default(&mut self, name: impl Into<String>, value: Value) {
        self.defaults.insert(name.into(), value);
        self.merged = None;
    }

    fn base(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(SystemConfiguration::default()));
        for (name, value) in &self.defaults {
            figment = figment.merge(Serialized::default(name, value));
        }
        figment.merge(Toml::file(self.config_dir.join("application.toml")))
    }

    fn with_overrides(&self, mut figment: Figment) -> Figment {
        figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));
        for (name, value) in &self.overrides {
            figment = figment.merge(Serialized::default(name, value));
        }
        figment
    }

    /// Profile from an explicit property, then `APP_PROFILES_ACTIVE`, then the configuration files.
    #[must_use]
    pub fn active_profile(&self) -> String {
        if let Some(Value::String(profile)) = self.overrides.get(PROFILES_ACTIVE_PROPERTY) {
            return profile.clone();
        }
        if let Ok(profile) = env::var(PROFILES_ACTIVE_ENV) {
            if !profile.is_empty() {
                return profile;
            }
        }
        self.with_overrides(self.base())
            .extract_inner::<String>(PROFILES_ACTIVE_PROPERTY)
            .unwrap_or_else(|_| DEFAULT_PROFILE.to_owned())
    }

    /// Active profile followed by the included ones, without repeats.
    #[must_use]
    pub fn profiles(&self) -> Vec<String> {
        let mut profiles = vec![self.active_profile()];
        let include = self
            .with_overrides(self.base())
            .find_value(PROFILES_INCLUDE_PROPERTY)
            .ok()
            .and_then(|value| value.deserialize::<Value>().ok())
            .and_then(adapt::<Vec<String>>)
            .unwrap_or_default();

        for profile in include {
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }
        profiles
    }

    #[must_use]
    pub fn figment(&self) -> Figment {
        if let Some(figment) = &self.merged {
            return figment.clone();
        }

        let profiles = self.profiles();
        let mut figment = self.base();
        for profile in &profiles {
            figment = figment.merge(Toml::file(self.config_dir.join(format!("application-{profile}.toml"))));
        }
        self.with_overrides(figment)
            .merge(Serialized::default(PROFILES_ACTIVE_PROPERTY, &profiles[0]))
    }

    /// Extracts the [`SystemConfiguration`] and keeps the merged sources until the next change.
    ///
    /// # Errors
    /// Unreadable files or values that don't fit [`SystemConfiguration`].
    pub fn build(&mut self) -> Result<Arc<SystemConfiguration>, figment::Error> {
        let figment = self.figment();
        let system = Arc::new(figment.extract::<SystemConfiguration>()?);
        self.merged = Some(figment);
        self.system = Some(system.clone());
        Ok(system)
    }

    #[must_use]
    pub fn system(&self) -> Option<Arc<SystemConfiguration>> {
        self.system.clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.figment().find_value(name).ok()?.deserialize::<Value>().ok()
    }

    /// Substitutes `${KEY}` and `${KEY:default}` with the property `KEY`, the environment variable `KEY` or the default.
    /// Unknown placeholders without a default are kept.
    #[must_use]
    pub fn replace(&self, source: &str) -> String {
        let mut output = String::with_capacity(source.len());
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            let Some(end) = rest[start..].find('}') else {
                break;
            };
            output.push_str(&rest[..start]);

            let placeholder = &rest[start + 2..start + end];
            let (key, default) = match placeholder.split_once(':') {
                Some((key, default)) => (key, Some(default)),
                None => (placeholder, None),
            };
            let value = self
                .get(key)
                .map(|value| match value {
                    Value::String(value) => value,
                    Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
                    other => other.to_string(),
                })
                .or_else(|| env::var(key).ok())
                .or_else(|| default.map(ToOwned::to_owned));

            match value {
                Some(value) => output.push_str(&value),
                None => output.push_str(&rest[start..=start + end]),
            }
            rest = &rest[start + end + 1..];
        }
        output.push_str(rest);
        output
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

impl Container {
    /// Overrides a property.
    pub fn set_property<V: Serialize>(&self, name: &str, value: V) {
        match serde_json::to_value(value) {
            Ok(value) => self.inner.properties.write().set(name, value),
            Err(err) => warn!(property = name, "Property can't be serialized: {err}"),
        }
    }

    /// Sets a property value used when no other source provides one.
    pub fn set_default_property<V: Serialize>(&self, name: &str, value: V) {
        match serde_json::to_value(value) {
            Ok(value) => self.inner.properties.write().set_default(name, value),
            Err(err) => warn!(property = name, "Default property can't be serialized: {err}"),
        }
    }

    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<Value> {
        self.inner.properties.read().get(name)
    }

    /// Property `name` converted into `T`.
    #[must_use]
    pub fn property<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get_property(name).and_then(adapt)
    }

    /// See [`Properties::replace`].
    #[must_use]
    pub fn replace(&self, source: &str) -> String {
        self.inner.properties.read().replace(source)
    }

    /// Merges the property sources into the [`SystemConfiguration`], stores it as an instance and
    /// as the `system` configuration. Later calls return the stored configuration, properties set
    /// after the first build are only visible through [`Container::get_property`].
    ///
    /// # Errors
    /// [`ContainerErrorKind::Properties`] when the sources can't be read or extracted.
    pub fn build_properties(&self) -> Result<Arc<SystemConfiguration>, ContainerErrorKind> {
        let span = info_span!("build_properties");
        let _guard = span.enter();

        let mut properties = self.inner.properties.write();
        if let Some(system) = properties.system() {
            debug!("Already built");
            return Ok(system);
        }
        let system = properties.build()?;
        drop(properties);

        self.set_instance_as(system.clone());
        self.inner.configurations.set(
            SYSTEM_CONFIGURATION,
            Arc::new(ComponentMetadata::realized(
                SYSTEM_CONFIGURATION,
                TypeInfo::of::<SystemConfiguration>(),
                erase(system.clone()),
            )),
        );
        self.advance_state(BuildState::PropertiesBuilt);

        debug!(profile = %system.app.profiles.active, "Properties built");
        Ok(system)
    }
}
