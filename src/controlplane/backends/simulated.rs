//! Simulated Storage Backend
//!
//! Advertises QoS profiles read from a JSON profile document and pretends to
//! move objects between them. Nothing is written to disk; a transition simply
//! takes a configurable amount of time.
//!
//! With a `base_directory` the backend also reports the files and
//! directories below it as objects it holds, so they can be adopted into
//! the CDMI tree, and remembers the transitions it ran on them.

use crate::domain::model::Metadata;
use crate::domain::ports::{BackendCapability, CapabilityType, ObjectStatus, StorageBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry key of the simulated backend
pub const SIMULATED_BACKEND_TYPE: &str = "dummy_filesystem";

/// Metadata key listing the profiles a class may move to
pub const CAPABILITIES_ALLOWED: &str = "cdmi_capabilities_allowed";

/// Suffix of the monitored copy of each class attribute
const PROVIDED_SUFFIX: &str = "_provided";

const DEFAULT_PROFILES: &str = include_str!("../../../config/qos-profiles.json");

const DEFAULT_EXPORT_IDENTIFIER: &str = "http://localhost/cdmi/browse";

// =============================================================================
// Configuration
// =============================================================================

/// Profile document the backend is built from
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDocument {
    pub default_container_capability_class: String,
    pub default_dataobject_capability_class: String,
    #[serde(default)]
    pub container_capabilities: Metadata,
    #[serde(default)]
    pub dataobject_capabilities: Metadata,
    #[serde(default)]
    pub container_classes: BTreeMap<String, Metadata>,
    #[serde(default)]
    pub dataobject_classes: BTreeMap<String, Metadata>,
}

impl ProfileDocument {
    /// Parse a profile document from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The document compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_PROFILES)
    }
}

/// Configuration for the simulated backend
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Advertised profiles
    pub profiles: ProfileDocument,
    /// Time a transition takes to complete
    pub transition_delay: Duration,
    /// Identifier advertised in the container `Network/WebHTTP` export
    pub export_identifier: String,
    /// Directory whose entries the backend reports as its objects
    pub base_directory: Option<PathBuf>,
}

impl SimulatedConfig {
    /// Build from free-form backend properties.
    ///
    /// Recognised keys: `capabilities_file`, `transition_delay_ms`,
    /// `export_identifier` and `base_directory`.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let profiles = match properties.get("capabilities_file") {
            Some(file) => {
                let text = std::fs::read_to_string(file).map_err(|e| {
                    Error::Configuration(format!("cannot read capabilities file {}: {}", file, e))
                })?;
                ProfileDocument::from_json(&text)?
            }
            None => ProfileDocument::builtin()?,
        };

        let transition_delay = match properties.get("transition_delay_ms") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|_| {
                Error::Configuration(format!("transition_delay_ms is not a number: {}", ms))
            })?),
            None => Duration::from_millis(10_000),
        };

        let export_identifier = properties
            .get("export_identifier")
            .cloned()
            .unwrap_or_else(|| DEFAULT_EXPORT_IDENTIFIER.to_string());

        Ok(Self {
            profiles,
            transition_delay,
            export_identifier,
            base_directory: properties.get("base_directory").map(PathBuf::from),
        })
    }
}

// =============================================================================
// Profile table
// =============================================================================

#[derive(Debug, Clone)]
struct Profile {
    capability: BackendCapability,
    allowed: Vec<String>,
    monitored: Metadata,
}

impl Profile {
    fn new(
        name: &str,
        capability_type: CapabilityType,
        capabilities: &Metadata,
        class: &Metadata,
    ) -> Self {
        let allowed = class
            .get(CAPABILITIES_ALLOWED)
            .and_then(Value::as_array)
            .map(|targets| {
                targets
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let monitored = class
            .iter()
            .map(|(key, value)| (format!("{}{}", key, PROVIDED_SUFFIX), value.clone()))
            .collect();

        Self {
            capability: BackendCapability {
                name: name.to_string(),
                capability_type,
                capabilities: capabilities.clone(),
                metadata: class.clone(),
            },
            allowed,
            monitored,
        }
    }
}

/// Transition the backend ran on one of its objects
#[derive(Debug, Clone)]
struct Placed {
    current: String,
    target: Option<String>,
    due: Instant,
}

impl Placed {
    /// Settle a transition whose delay has elapsed
    fn settle(&mut self) {
        if Instant::now() >= self.due {
            if let Some(target) = self.target.take() {
                self.current = target;
            }
        }
    }
}

// =============================================================================
// Simulated Backend
// =============================================================================

/// Backend that advertises profiles from a document and simulates transitions
#[derive(Debug)]
pub struct SimulatedBackend {
    config: SimulatedConfig,
    /// Profiles keyed by capability URI
    profiles: BTreeMap<String, Profile>,
    /// Transitions run on objects under the base directory, keyed by path
    placed: DashMap<String, Placed>,
}

impl SimulatedBackend {
    /// Create from a config
    pub fn new(config: SimulatedConfig) -> Result<Self> {
        let document = &config.profiles;
        let mut profiles = BTreeMap::new();

        let classes = [
            (
                CapabilityType::Container,
                &document.container_capabilities,
                &document.container_classes,
            ),
            (
                CapabilityType::Dataobject,
                &document.dataobject_capabilities,
                &document.dataobject_classes,
            ),
        ];
        for (capability_type, capabilities, classes) in classes {
            for (name, class) in classes {
                debug!(kind = %capability_type, name = %name, "Found capability class");
                let profile = Profile::new(name, capability_type, capabilities, class);
                profiles.insert(profile.capability.uri(), profile);
            }
        }

        for default in [
            &document.default_container_capability_class,
            &document.default_dataobject_capability_class,
        ] {
            if !profiles.contains_key(default) {
                return Err(Error::Configuration(format!(
                    "default capability class {} is not defined",
                    default
                )));
            }
        }

        info!(
            profiles = profiles.len(),
            delay_ms = config.transition_delay.as_millis() as u64,
            base_directory = ?config.base_directory,
            "Simulated backend ready"
        );

        Ok(Self {
            config,
            profiles,
            placed: DashMap::new(),
        })
    }

    /// Create from free-form backend properties
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        Self::new(SimulatedConfig::from_properties(properties)?)
    }

    pub fn transition_delay(&self) -> Duration {
        self.config.transition_delay
    }

    /// Profile type of the entry at `path` under the base directory
    async fn held_type(&self, path: &str) -> Result<Option<CapabilityType>> {
        let Some(base) = &self.config.base_directory else {
            return Ok(None);
        };
        match tokio::fs::metadata(base.join(path.trim_start_matches('/'))).await {
            Ok(meta) if meta.is_dir() => Ok(Some(CapabilityType::Container)),
            Ok(_) => Ok(Some(CapabilityType::Dataobject)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageBackend for SimulatedBackend {
    fn backend_type(&self) -> &str {
        SIMULATED_BACKEND_TYPE
    }

    async fn list_capabilities(&self) -> Result<Vec<BackendCapability>> {
        Ok(self
            .profiles
            .values()
            .map(|profile| profile.capability.clone())
            .collect())
    }

    fn default_profile(&self, capability_type: CapabilityType) -> String {
        match capability_type {
            CapabilityType::Container => {
                self.config.profiles.default_container_capability_class.clone()
            }
            CapabilityType::Dataobject => {
                self.config.profiles.default_dataobject_capability_class.clone()
            }
        }
    }

    fn has_profile(&self, uri: &str) -> bool {
        self.profiles.contains_key(uri)
    }

    fn allowed_transitions(&self, current: &str) -> Vec<String> {
        self.profiles
            .get(current)
            .map(|profile| profile.allowed.clone())
            .unwrap_or_default()
    }

    async fn request_transition(&self, path: &str, current: &str, target: &str) -> Result<Duration> {
        if !self.is_transition_allowed(current, target) {
            warn!(
                path = %path,
                current = %current,
                target = %target,
                "Target capabilities URI not supported"
            );
            return Err(Error::UnsupportedTransition {
                path: path.to_string(),
                current: current.to_string(),
                target: target.to_string(),
            });
        }

        debug!(path = %path, current = %current, target = %target, "Simulating QoS transition");
        if self.held_type(path).await?.is_some() {
            self.placed.insert(
                path.to_string(),
                Placed {
                    current: current.to_string(),
                    target: Some(target.to_string()),
                    due: Instant::now() + self.config.transition_delay,
                },
            );
        }
        Ok(self.config.transition_delay)
    }

    async fn get_current_status(&self, path: &str) -> Result<Option<ObjectStatus>> {
        let Some(capability_type) = self.held_type(path).await? else {
            self.placed.remove(path);
            return Ok(None);
        };

        let (current, target) = match self.placed.get_mut(path) {
            Some(mut placed) => {
                placed.settle();
                (placed.current.clone(), placed.target.clone())
            }
            None => (self.default_profile(capability_type), None),
        };

        Ok(Some(ObjectStatus {
            monitored_attributes: self.monitored_attributes(&current),
            export_attributes: self.export_attributes(capability_type),
            current_capabilities_uri: current,
            target_capabilities_uri: target,
        }))
    }

    fn monitored_attributes(&self, profile: &str) -> Metadata {
        let Some(found) = self.profiles.get(profile) else {
            warn!(profile = %profile, "Unknown capabilities URI");
            return Metadata::new();
        };

        let mut monitored = found.monitored.clone();
        if found.capability.capability_type == CapabilityType::Container {
            monitored.insert(
                "cdmi_default_dataobject_capability class".to_string(),
                Value::String(self.config.profiles.default_dataobject_capability_class.clone()),
            );
        }
        monitored
    }

    fn export_attributes(&self, capability_type: CapabilityType) -> Metadata {
        let mut exports = Metadata::new();
        if capability_type == CapabilityType::Container {
            exports.insert(
                "Network/WebHTTP".to_string(),
                json!({
                    "identifier": self.config.export_identifier,
                    "permissions": "oidc",
                }),
            );
        }
        exports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const CONTAINER_DEFAULT: &str = "/cdmi_capabilities/container/default";
    const CONTAINER_PROFILE1: &str = "/cdmi_capabilities/container/profile1";
    const OBJECT_DEFAULT: &str = "/cdmi_capabilities/dataobject/default";
    const OBJECT_PROFILE1: &str = "/cdmi_capabilities/dataobject/profile1";
    const OBJECT_PROFILE2: &str = "/cdmi_capabilities/dataobject/profile2";

    fn backend() -> SimulatedBackend {
        SimulatedBackend::from_properties(&BTreeMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_builtin_profiles() {
        let backend = backend();
        let capabilities = backend.list_capabilities().await.unwrap();
        assert_eq!(capabilities.len(), 5);

        let profile1 = capabilities
            .iter()
            .find(|c| c.uri() == OBJECT_PROFILE1)
            .unwrap();
        assert_eq!(profile1.capability_type, CapabilityType::Dataobject);
        assert_eq!(profile1.metadata["cdmi_data_redundancy"], "4");
        assert_eq!(profile1.capabilities["cdmi_latency"], "true");

        assert_eq!(backend.default_profile(CapabilityType::Container), CONTAINER_DEFAULT);
        assert_eq!(backend.default_profile(CapabilityType::Dataobject), OBJECT_DEFAULT);
        assert!(backend.has_profile(OBJECT_PROFILE2));
        assert!(!backend.has_profile("/cdmi_capabilities/dataobject/gold"));
        assert_eq!(backend.transition_delay(), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_allowed_transitions() {
        let backend = backend();

        assert!(backend.is_transition_allowed(CONTAINER_DEFAULT, CONTAINER_PROFILE1));
        assert!(backend.is_transition_allowed(CONTAINER_PROFILE1, CONTAINER_DEFAULT));
        assert!(backend.is_transition_allowed(OBJECT_DEFAULT, OBJECT_DEFAULT));
        assert!(backend.is_transition_allowed(OBJECT_PROFILE1, OBJECT_PROFILE2));
        assert!(!backend.is_transition_allowed(OBJECT_DEFAULT, OBJECT_PROFILE2));
        assert!(!backend.is_transition_allowed(CONTAINER_DEFAULT, OBJECT_PROFILE1));

        let delay = backend
            .request_transition("/a", OBJECT_DEFAULT, OBJECT_PROFILE1)
            .await
            .unwrap();
        assert_eq!(delay, Duration::from_millis(10_000));

        assert_matches!(
            backend.request_transition("/a", OBJECT_DEFAULT, OBJECT_PROFILE2).await,
            Err(Error::UnsupportedTransition { target, .. }) if target == OBJECT_PROFILE2
        );
    }

    #[test]
    fn test_monitored_attributes() {
        let backend = backend();

        let object = backend.monitored_attributes(OBJECT_PROFILE2);
        assert_eq!(object["cdmi_latency_provided"], "60000");
        assert!(object.contains_key("cdmi_capabilities_allowed_provided"));
        assert!(!object.contains_key("cdmi_latency"));

        let container = backend.monitored_attributes(CONTAINER_DEFAULT);
        assert_eq!(
            container["cdmi_default_dataobject_capability class"],
            OBJECT_DEFAULT
        );
        assert!(backend.monitored_attributes("/nope").is_empty());
    }

    #[test]
    fn test_export_attributes() {
        let backend = backend();
        let exports = backend.export_attributes(CapabilityType::Container);
        assert_eq!(
            exports["Network/WebHTTP"]["identifier"],
            "http://localhost/cdmi/browse"
        );
        assert_eq!(exports["Network/WebHTTP"]["permissions"], "oidc");
        assert!(backend.export_attributes(CapabilityType::Dataobject).is_empty());
    }

    #[test]
    fn test_properties() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "default_container_capability_class": "/cdmi_capabilities/container/bronze",
                "default_dataobject_capability_class": "/cdmi_capabilities/dataobject/bronze",
                "container_classes": {{ "bronze": {{}} }},
                "dataobject_classes": {{ "bronze": {{ "cdmi_capabilities_allowed": [] }} }}
            }}"#
        )
        .unwrap();

        let mut properties = BTreeMap::new();
        properties.insert(
            "capabilities_file".to_string(),
            file.path().display().to_string(),
        );
        properties.insert("transition_delay_ms".to_string(), "25".to_string());
        properties.insert("export_identifier".to_string(), "http://cdmi.example".to_string());

        let backend = SimulatedBackend::from_properties(&properties).unwrap();
        assert_eq!(backend.transition_delay(), Duration::from_millis(25));
        assert!(backend.has_profile("/cdmi_capabilities/dataobject/bronze"));
        assert!(backend
            .allowed_transitions("/cdmi_capabilities/dataobject/bronze")
            .is_empty());
        assert_eq!(
            backend.export_attributes(CapabilityType::Container)["Network/WebHTTP"]["identifier"],
            "http://cdmi.example"
        );
    }

    #[test]
    fn test_bad_properties() {
        let mut properties = BTreeMap::new();
        properties.insert("transition_delay_ms".to_string(), "soon".to_string());
        assert_matches!(
            SimulatedBackend::from_properties(&properties),
            Err(Error::Configuration(_))
        );

        let mut properties = BTreeMap::new();
        properties.insert("capabilities_file".to_string(), "/does/not/exist.json".to_string());
        assert_matches!(
            SimulatedBackend::from_properties(&properties),
            Err(Error::Configuration(_))
        );

        let mut document = ProfileDocument::builtin().unwrap();
        document.default_container_capability_class = "/cdmi_capabilities/container/gold".into();
        assert_matches!(
            SimulatedBackend::new(SimulatedConfig {
                profiles: document,
                transition_delay: Duration::ZERO,
                export_identifier: String::new(),
                base_directory: None,
            }),
            Err(Error::Configuration(_))
        );
    }

    #[tokio::test]
    async fn test_status_without_base_directory() {
        let backend = backend();
        assert!(backend.get_current_status("/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reports_entries_under_base_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("dir")).unwrap();
        std::fs::write(tmp.path().join("dir").join("file.txt"), "x").unwrap();

        let mut properties = BTreeMap::new();
        properties.insert("base_directory".to_string(), tmp.path().display().to_string());
        properties.insert("transition_delay_ms".to_string(), "30".to_string());
        let backend = SimulatedBackend::from_properties(&properties).unwrap();

        let dir = backend.get_current_status("/dir").await.unwrap().unwrap();
        assert_eq!(dir.current_capabilities_uri, CONTAINER_DEFAULT);
        assert!(dir.export_attributes.contains_key("Network/WebHTTP"));

        let file = backend.get_current_status("/dir/file.txt").await.unwrap().unwrap();
        assert_eq!(file.current_capabilities_uri, OBJECT_DEFAULT);
        assert!(!file.is_transitioning());
        assert!(backend.get_current_status("/nope").await.unwrap().is_none());

        backend
            .request_transition("/dir/file.txt", OBJECT_DEFAULT, OBJECT_PROFILE1)
            .await
            .unwrap();
        let moving = backend.get_current_status("/dir/file.txt").await.unwrap().unwrap();
        assert_eq!(moving.current_capabilities_uri, OBJECT_DEFAULT);
        assert_eq!(moving.target_capabilities_uri.as_deref(), Some(OBJECT_PROFILE1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = backend.get_current_status("/dir/file.txt").await.unwrap().unwrap();
        assert_eq!(settled.current_capabilities_uri, OBJECT_PROFILE1);
        assert!(!settled.is_transitioning());
        assert_eq!(settled.monitored_attributes["cdmi_data_redundancy_provided"], "4");
    }
}
