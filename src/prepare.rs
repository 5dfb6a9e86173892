//! Preparation of a local compose project for deployment.
//!
//! The project is resolved by `docker compose config`, so file
//! discovery, `extends`, and interpolation follow Compose itself.
//! The resolved model is then made self-contained: built services
//! point at a registry image, components receive their extra
//! environment, the project gets a unique name, and every `$` is
//! escaped so the server does not interpolate a second time.
//!
//! A *component* is the directory a service is built from, so two
//! services built from `./api` share the `api` image and
//! environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use docker_compose_types::{Environment, SingleValue};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};

/// Key of the environments map holding variables for the
/// `docker compose config` process itself.
pub const COMPOSE_ENV_KEY: &str = "$";

/// Image template placeholder replaced by the component name.
pub const COMPONENT_PLACEHOLDER: &str = "service.name";

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z0-9_.-]+)\s*\}").expect("valid placeholder regex")
});

/// Extra environment variables per component.
pub type Environments = IndexMap<String, IndexMap<String, String>>;

/// What to prepare and how.
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub compose_dir: PathBuf,
    pub project: String,
    pub image_template: Option<String>,
    pub environments: Environments,
}

impl PrepareOptions {
    #[must_use]
    pub fn new(compose_dir: impl Into<PathBuf>, project: &str) -> Self {
        Self {
            compose_dir: compose_dir.into(),
            project: project.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn image_template(mut self, template: &str) -> Self {
        self.image_template = Some(template.to_string());
        self
    }

    #[must_use]
    pub fn environments(mut self, environments: Environments) -> Self {
        self.environments = environments;
        self
    }
}

/// Resolve the compose project and return the document to send to
/// the server, as YAML.
pub fn prepare(docker: Docker<'_>, options: &PrepareOptions) -> DeployResult<String> {
    if !options.compose_dir.is_dir() {
        return Err(DeployError::FileNotFound(
            options.compose_dir.display().to_string(),
        ));
    }

    let compose_env: Vec<(&str, &str)> = options
        .environments
        .get(COMPOSE_ENV_KEY)
        .map(|vars| vars.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect())
        .unwrap_or_default();

    let resolved = docker.compose_config(&options.compose_dir, &compose_env)?;
    let mut document: Value = serde_json::from_str(&resolved)?;

    let components = components(&document);
    let images = images(&document, &components, options.image_template.as_deref())?;
    substitute_images(&mut document, &images);
    inject_environment(&mut document, &components, &options.environments)?;

    let name = unique_name(&options.project);
    if let Value::Object(root) = &mut document {
        root.insert("name".to_string(), Value::String(name.clone()));
    }
    disarm(&mut document);

    info!(project = %options.project, %name, built = images.len(), "compose project prepared");
    Ok(serde_yaml::to_string(&document)?)
}

/// Expand the `${...}` placeholders of an image template.
/// `${service.name}` is the component; any other dotted path is
/// looked up in the resolved compose model.
pub fn render_image(template: &str, document: &Value, component: &str) -> DeployResult<String> {
    let mut image = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        image.push_str(&template[last..whole.start()]);
        image.push_str(&resolve(path.as_str(), document, component)?);
        last = whole.end();
    }
    image.push_str(&template[last..]);

    if image.trim().is_empty() {
        return Err(DeployError::InvalidImageTemplate(format!(
            "{template:?} renders an empty image name"
        )));
    }
    Ok(image)
}

/// Merge `extra` into a service environment, keeping its list or
/// map form. Variables already set on the service win.
#[must_use]
pub fn merge_environment(
    extra: &IndexMap<String, String>,
    current: Option<Environment>,
) -> Environment {
    match current {
        Some(Environment::List(entries)) => Environment::List(
            extra
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .chain(entries)
                .collect(),
        ),
        Some(Environment::KvPair(entries)) => {
            let mut merged = as_pairs(extra);
            merged.extend(entries);
            Environment::KvPair(merged)
        }
        None => Environment::KvPair(as_pairs(extra)),
    }
}

/// A compose project name unique to this deployment, so taking down
/// an older deployment never touches the new one.
#[must_use]
pub fn unique_name(project: &str) -> String {
    let base: String = project
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();

    format!("{}-{}", base.trim_start_matches(['-', '_']), &suffix[..8])
}

/// Escape every `$` in string values.
pub fn disarm(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('$') => *s = s.replace('$', "$$"),
        Value::Array(items) => items.iter_mut().for_each(disarm),
        Value::Object(map) => map.values_mut().for_each(disarm),
        _ => {}
    }
}

/// Parse per-component environments from YAML: a mapping of
/// component name to a mapping of variable name to scalar value.
pub fn parse_environments(text: &str) -> DeployResult<Environments> {
    if text.trim().is_empty() {
        return Ok(Environments::new());
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| DeployError::InvalidEnvironment(e.to_string()))?;
    let serde_yaml::Value::Mapping(components) = value else {
        return Err(DeployError::InvalidEnvironment(
            "expected a mapping of components".into(),
        ));
    };

    components
        .into_iter()
        .map(|(component, vars)| -> DeployResult<(String, IndexMap<String, String>)> {
            let component = scalar(&component).ok_or_else(|| {
                DeployError::InvalidEnvironment("component names must be strings".into())
            })?;
            let serde_yaml::Value::Mapping(vars) = vars else {
                return Err(DeployError::InvalidEnvironment(format!(
                    "variables of {component} must be a mapping"
                )));
            };

            let vars = vars
                .into_iter()
                .map(|(key, value)| -> DeployResult<(String, String)> {
                    let key = scalar(&key).ok_or_else(|| {
                        DeployError::InvalidEnvironment(format!(
                            "variable names of {component} must be strings"
                        ))
                    })?;
                    let value = scalar(&value).ok_or_else(|| {
                        DeployError::InvalidEnvironment(format!(
                            "{component}.{key} must be a string, number, or boolean"
                        ))
                    })?;
                    Ok((key, value))
                })
                .collect::<DeployResult<IndexMap<_, _>>>()?;

            Ok((component, vars))
        })
        .collect()
}

/// Service name to component name, for every service with a
/// `build` section.
fn components(document: &Value) -> IndexMap<String, String> {
    let Some(services) = document.get("services").and_then(Value::as_object) else {
        return IndexMap::new();
    };

    services
        .iter()
        .filter_map(|(service, definition)| {
            let build = definition.get("build")?;
            let context = build
                .as_str()
                .or_else(|| build.get("context").and_then(Value::as_str));
            let component = context
                .and_then(|c| Path::new(c).file_name())
                .map_or_else(|| service.clone(), |n| n.to_string_lossy().into_owned());
            Some((service.clone(), component))
        })
        .collect()
}

fn images(
    document: &Value,
    components: &IndexMap<String, String>,
    template: Option<&str>,
) -> DeployResult<IndexMap<String, String>> {
    let Some((first, _)) = components.first() else {
        return Ok(IndexMap::new());
    };
    let template = template.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
        DeployError::InvalidImageTemplate(format!(
            "service {first} is built locally, an image template is required"
        ))
    })?;

    components
        .iter()
        .map(|(service, component)| -> DeployResult<(String, String)> {
            Ok((service.clone(), render_image(template, document, component)?))
        })
        .collect()
}

fn substitute_images(document: &mut Value, images: &IndexMap<String, String>) {
    let Some(services) = document.get_mut("services").and_then(Value::as_object_mut) else {
        return;
    };

    for (service, image) in images {
        if let Some(Value::Object(definition)) = services.get_mut(service) {
            definition.remove("build");
            definition.insert("image".to_string(), Value::String(image.clone()));
            debug!(%service, %image, "build replaced by image");
        }
    }
}

fn inject_environment(
    document: &mut Value,
    components: &IndexMap<String, String>,
    environments: &Environments,
) -> DeployResult<()> {
    let Some(services) = document.get_mut("services").and_then(Value::as_object_mut) else {
        return Ok(());
    };

    for (service, component) in components {
        let Some(extra) = environments.get(component).filter(|e| !e.is_empty()) else {
            continue;
        };
        let Some(Value::Object(definition)) = services.get_mut(service) else {
            continue;
        };

        let current = match definition.get("environment") {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value::<Environment>(value.clone())?),
        };
        let merged = merge_environment(extra, current);
        definition.insert("environment".to_string(), serde_json::to_value(&merged)?);
        debug!(%service, %component, added = extra.len(), "environment injected");
    }
    Ok(())
}

fn resolve(path: &str, document: &Value, component: &str) -> DeployResult<String> {
    if path == COMPONENT_PLACEHOLDER {
        return Ok(component.to_string());
    }

    let found = path.split('.').try_fold(document, |node, key| {
        node.get(key)
            .or_else(|| key.parse::<usize>().ok().and_then(|i| node.get(i)))
    });

    match found {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
        _ => Err(DeployError::InvalidImageTemplate(format!(
            "${{{path}}} does not resolve to a string, number, or boolean"
        ))),
    }
}

fn as_pairs(vars: &IndexMap<String, String>) -> IndexMap<String, Option<SingleValue>> {
    vars.iter()
        .map(|(k, v)| (k.clone(), Some(SingleValue::String(v.clone()))))
        .collect()
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
