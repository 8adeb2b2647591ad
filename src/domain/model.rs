//! CDMI Object Model
//!
//! Typed entities persisted by the object stores. Every entity carries an
//! immutable `objectID` and an open attribute map; the `objectType` media
//! type selects the variant when a stored record is read back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// =============================================================================
// Constants
// =============================================================================

pub const CONTAINER_TYPE: &str = "application/cdmi-container";
pub const DATA_OBJECT_TYPE: &str = "application/cdmi-object";
pub const CAPABILITY_TYPE: &str = "application/cdmi-capability";
pub const DOMAIN_TYPE: &str = "application/cdmi-domain";

pub const ROOT_PATH: &str = "/";
pub const CAPABILITIES_ROOT: &str = "/cdmi_capabilities";
pub const CONTAINER_CAPABILITIES: &str = "/cdmi_capabilities/container";
pub const DATA_OBJECT_CAPABILITIES: &str = "/cdmi_capabilities/dataobject";
pub const DOMAINS_ROOT: &str = "/cdmi_domains";

/// Top-level name reserved for identifier lookups
pub const OBJECT_ID_SEGMENT: &str = "cdmi_objectid";

pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";
pub const DEFAULT_VALUE_ENCODING: &str = "utf-8";

/// System metadata keys
pub const META_CTIME: &str = "cdmi_ctime";
pub const META_MTIME: &str = "cdmi_mtime";
pub const META_SIZE: &str = "cdmi_size";

const OBJECT_TYPE_KEY: &str = "objectType";

/// String-keyed metadata / capability map
pub type Metadata = BTreeMap<String, Value>;

fn default_domain_uri() -> String {
    DOMAINS_ROOT.to_string()
}

fn default_container_capabilities() -> String {
    CONTAINER_CAPABILITIES.to_string()
}

fn default_data_object_capabilities() -> String {
    DATA_OBJECT_CAPABILITIES.to_string()
}

fn default_mimetype() -> String {
    DEFAULT_MIMETYPE.to_string()
}

fn default_value_encoding() -> String {
    DEFAULT_VALUE_ENCODING.to_string()
}

// =============================================================================
// Object Kind
// =============================================================================

/// Entity discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Container,
    DataObject,
    Capability,
    Domain,
    Generic,
}

impl ObjectKind {
    pub fn media_type(&self) -> &'static str {
        match self {
            ObjectKind::Container => CONTAINER_TYPE,
            ObjectKind::DataObject => DATA_OBJECT_TYPE,
            ObjectKind::Capability => CAPABILITY_TYPE,
            ObjectKind::Domain => DOMAIN_TYPE,
            ObjectKind::Generic => "application/json",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            CONTAINER_TYPE => Some(ObjectKind::Container),
            DATA_OBJECT_TYPE => Some(ObjectKind::DataObject),
            CAPABILITY_TYPE => Some(ObjectKind::Capability),
            DOMAIN_TYPE => Some(ObjectKind::Domain),
            _ => None,
        }
    }

    /// Kinds that hold children (directories in the filesystem store)
    pub fn holds_children(&self) -> bool {
        matches!(
            self,
            ObjectKind::Container | ObjectKind::Capability | ObjectKind::Domain
        )
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Container => write!(f, "container"),
            ObjectKind::DataObject => write!(f, "data object"),
            ObjectKind::Capability => write!(f, "capability"),
            ObjectKind::Domain => write!(f, "domain"),
            ObjectKind::Generic => write!(f, "generic object"),
        }
    }
}

/// Completion state of a create or copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionStatus {
    Processing,
    #[default]
    Complete,
}

// =============================================================================
// Entities
// =============================================================================

/// Hierarchical grouping node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "parentURI")]
    pub parent_uri: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(rename = "domainURI", default = "default_domain_uri")]
    pub domain_uri: String,
    #[serde(rename = "capabilitiesURI", default = "default_container_capabilities")]
    pub capabilities_uri: String,
    #[serde(rename = "completionStatus", default)]
    pub completion_status: CompletionStatus,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub childrenrange: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<Vec<String>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Leaf node holding content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "parentURI")]
    pub parent_uri: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(rename = "domainURI", default = "default_domain_uri")]
    pub domain_uri: String,
    #[serde(rename = "capabilitiesURI", default = "default_data_object_capabilities")]
    pub capabilities_uri: String,
    #[serde(rename = "completionStatus", default)]
    pub completion_status: CompletionStatus,
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_value_encoding")]
    pub valuetransferencoding: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Node of the capability tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "parentURI")]
    pub parent_uri: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(default)]
    pub capabilities: Metadata,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub childrenrange: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Account / tenant scoping node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "parentURI")]
    pub parent_uri: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub childrenrange: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Record with an unknown or missing `objectType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericObject {
    #[serde(rename = "objectID", default)]
    pub object_id: String,
    #[serde(skip)]
    pub object_type: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

// =============================================================================
// Placement / Request Templates
// =============================================================================

/// Addressing fields assigned by the hierarchy when an entity is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub object_id: String,
    pub object_name: String,
    pub parent_uri: String,
    pub parent_id: String,
}

/// Caller-supplied fields for a new container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRequest {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(rename = "domainURI", default, skip_serializing_if = "Option::is_none")]
    pub domain_uri: Option<String>,
    #[serde(rename = "capabilitiesURI", default, skip_serializing_if = "Option::is_none")]
    pub capabilities_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exports: Option<Value>,
}

/// Caller-supplied fields for a new data object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataObjectRequest {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuetransferencoding: Option<String>,
    #[serde(rename = "domainURI", default, skip_serializing_if = "Option::is_none")]
    pub domain_uri: Option<String>,
    #[serde(rename = "capabilitiesURI", default, skip_serializing_if = "Option::is_none")]
    pub capabilities_uri: Option<String>,
}

/// Caller-supplied fields for a capability node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    #[serde(default)]
    pub capabilities: Metadata,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Caller-supplied fields for a domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainRequest {
    #[serde(default)]
    pub metadata: Metadata,
}

impl Container {
    pub fn from_request(placement: Placement, request: &ContainerRequest) -> Self {
        Self {
            object_id: placement.object_id,
            object_name: placement.object_name,
            parent_uri: placement.parent_uri,
            parent_id: placement.parent_id,
            domain_uri: request.domain_uri.clone().unwrap_or_else(default_domain_uri),
            capabilities_uri: request
                .capabilities_uri
                .clone()
                .unwrap_or_else(default_container_capabilities),
            completion_status: CompletionStatus::Complete,
            metadata: request.metadata.clone(),
            children: Vec::new(),
            childrenrange: String::new(),
            exports: request.exports.clone(),
            snapshots: None,
            attributes: Map::new(),
        }
    }
}

impl DataObject {
    pub fn from_request(placement: Placement, request: &DataObjectRequest) -> Self {
        let mut object = Self {
            object_id: placement.object_id,
            object_name: placement.object_name,
            parent_uri: placement.parent_uri,
            parent_id: placement.parent_id,
            domain_uri: request.domain_uri.clone().unwrap_or_else(default_domain_uri),
            capabilities_uri: request
                .capabilities_uri
                .clone()
                .unwrap_or_else(default_data_object_capabilities),
            completion_status: CompletionStatus::Complete,
            mimetype: request.mimetype.clone().unwrap_or_else(default_mimetype),
            metadata: request.metadata.clone(),
            value: request.value.clone().unwrap_or_default(),
            valuetransferencoding: request
                .valuetransferencoding
                .clone()
                .unwrap_or_else(default_value_encoding),
            attributes: Map::new(),
        };
        object.refresh_size();
        object
    }

    /// Update `cdmi_size` from the current value
    pub fn refresh_size(&mut self) {
        self.metadata
            .insert(META_SIZE.to_string(), Value::from(self.value.len() as u64));
    }
}

impl Capability {
    pub fn from_request(placement: Placement, request: &CapabilityRequest) -> Self {
        Self {
            object_id: placement.object_id,
            object_name: placement.object_name,
            parent_uri: placement.parent_uri,
            parent_id: placement.parent_id,
            capabilities: request.capabilities.clone(),
            metadata: request.metadata.clone(),
            children: Vec::new(),
            childrenrange: String::new(),
            attributes: Map::new(),
        }
    }
}

impl Domain {
    pub fn from_request(placement: Placement, request: &DomainRequest) -> Self {
        Self {
            object_id: placement.object_id,
            object_name: placement.object_name,
            parent_uri: placement.parent_uri,
            parent_id: placement.parent_id,
            metadata: request.metadata.clone(),
            children: Vec::new(),
            childrenrange: String::new(),
            attributes: Map::new(),
        }
    }
}

// =============================================================================
// CdmiObject
// =============================================================================

/// Any stored entity
#[derive(Debug, Clone, PartialEq)]
pub enum CdmiObject {
    Container(Container),
    DataObject(DataObject),
    Capability(Capability),
    Domain(Domain),
    Generic(GenericObject),
}

impl CdmiObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            CdmiObject::Container(_) => ObjectKind::Container,
            CdmiObject::DataObject(_) => ObjectKind::DataObject,
            CdmiObject::Capability(_) => ObjectKind::Capability,
            CdmiObject::Domain(_) => ObjectKind::Domain,
            CdmiObject::Generic(_) => ObjectKind::Generic,
        }
    }

    pub fn object_id(&self) -> &str {
        match self {
            CdmiObject::Container(c) => &c.object_id,
            CdmiObject::DataObject(d) => &d.object_id,
            CdmiObject::Capability(c) => &c.object_id,
            CdmiObject::Domain(d) => &d.object_id,
            CdmiObject::Generic(g) => &g.object_id,
        }
    }

    fn addressing(&self) -> Option<(&str, &str)> {
        match self {
            CdmiObject::Container(c) => Some((&c.parent_uri, &c.object_name)),
            CdmiObject::DataObject(d) => Some((&d.parent_uri, &d.object_name)),
            CdmiObject::Capability(c) => Some((&c.parent_uri, &c.object_name)),
            CdmiObject::Domain(d) => Some((&d.parent_uri, &d.object_name)),
            CdmiObject::Generic(g) => {
                let parent = g.attributes.get("parentURI")?.as_str()?;
                let name = g.attributes.get("objectName")?.as_str()?;
                Some((parent, name))
            }
        }
    }

    pub fn object_name(&self) -> Option<&str> {
        self.addressing().map(|(_, name)| name)
    }

    pub fn parent_uri(&self) -> Option<&str> {
        self.addressing().map(|(parent, _)| parent)
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            CdmiObject::Container(c) => Some(&c.parent_id),
            CdmiObject::DataObject(d) => Some(&d.parent_id),
            CdmiObject::Capability(c) => Some(&c.parent_id),
            CdmiObject::Domain(d) => Some(&d.parent_id),
            CdmiObject::Generic(g) => g.attributes.get("parentID").and_then(Value::as_str),
        }
    }

    /// Path this entity is addressed by, derived from its parent URI and name
    pub fn path(&self) -> Option<String> {
        let (parent, name) = self.addressing()?;
        if name == ROOT_PATH {
            return Some(ROOT_PATH.to_string());
        }
        Some(join_path(parent, name))
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            CdmiObject::Container(c) => Some(&c.metadata),
            CdmiObject::DataObject(d) => Some(&d.metadata),
            CdmiObject::Capability(c) => Some(&c.metadata),
            CdmiObject::Domain(d) => Some(&d.metadata),
            CdmiObject::Generic(_) => None,
        }
    }

    pub fn metadata_mut(&mut self) -> Option<&mut Metadata> {
        match self {
            CdmiObject::Container(c) => Some(&mut c.metadata),
            CdmiObject::DataObject(d) => Some(&mut d.metadata),
            CdmiObject::Capability(c) => Some(&mut c.metadata),
            CdmiObject::Domain(d) => Some(&mut d.metadata),
            CdmiObject::Generic(_) => None,
        }
    }

    pub fn capabilities_uri(&self) -> Option<&str> {
        match self {
            CdmiObject::Container(c) => Some(&c.capabilities_uri),
            CdmiObject::DataObject(d) => Some(&d.capabilities_uri),
            _ => None,
        }
    }

    pub fn set_capabilities_uri(&mut self, uri: impl Into<String>) {
        match self {
            CdmiObject::Container(c) => c.capabilities_uri = uri.into(),
            CdmiObject::DataObject(d) => d.capabilities_uri = uri.into(),
            _ => {}
        }
    }

    pub fn children(&self) -> &[String] {
        match self {
            CdmiObject::Container(c) => &c.children,
            CdmiObject::Capability(c) => &c.children,
            CdmiObject::Domain(d) => &d.children,
            CdmiObject::DataObject(_) | CdmiObject::Generic(_) => &[],
        }
    }

    fn children_mut(&mut self) -> Option<(&mut Vec<String>, &mut String)> {
        match self {
            CdmiObject::Container(c) => Some((&mut c.children, &mut c.childrenrange)),
            CdmiObject::Capability(c) => Some((&mut c.children, &mut c.childrenrange)),
            CdmiObject::Domain(d) => Some((&mut d.children, &mut d.childrenrange)),
            CdmiObject::DataObject(_) | CdmiObject::Generic(_) => None,
        }
    }

    /// Append a child name if absent. Returns whether the listing changed.
    pub fn link_child(&mut self, name: &str) -> bool {
        match self.children_mut() {
            Some((children, range)) => {
                if children.iter().any(|c| c == name) {
                    return false;
                }
                children.push(name.to_string());
                *range = children_range(children.len());
                true
            }
            None => false,
        }
    }

    /// Remove a child name. Returns whether the listing changed.
    pub fn unlink_child(&mut self, name: &str) -> bool {
        match self.children_mut() {
            Some((children, range)) => {
                let before = children.len();
                children.retain(|c| c != name);
                *range = children_range(children.len());
                children.len() != before
            }
            None => false,
        }
    }

    /// Copy the child listing of another record onto this one
    pub fn adopt_children(&mut self, other: &CdmiObject) {
        let listing = other.children().to_vec();
        if let Some((children, range)) = self.children_mut() {
            *range = children_range(listing.len());
            *children = listing;
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize with the `objectType` discriminator
    pub fn to_json(&self) -> Result<Value> {
        let (mut value, object_type) = match self {
            CdmiObject::Container(c) => (serde_json::to_value(c)?, Some(CONTAINER_TYPE)),
            CdmiObject::DataObject(d) => (serde_json::to_value(d)?, Some(DATA_OBJECT_TYPE)),
            CdmiObject::Capability(c) => (serde_json::to_value(c)?, Some(CAPABILITY_TYPE)),
            CdmiObject::Domain(d) => (serde_json::to_value(d)?, Some(DOMAIN_TYPE)),
            CdmiObject::Generic(g) => (serde_json::to_value(g)?, g.object_type.as_deref()),
        };

        if let (Some(map), Some(object_type)) = (value.as_object_mut(), object_type) {
            map.insert(
                OBJECT_TYPE_KEY.to_string(),
                Value::String(object_type.to_string()),
            );
        }
        Ok(value)
    }

    /// Reconstruct the variant named by `objectType`
    pub fn from_json(value: Value) -> Result<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::Malformed(format!(
                    "expected a JSON object, found {}",
                    other
                )))
            }
        };

        let object_type = match map.remove(OBJECT_TYPE_KEY) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(Error::Malformed(format!(
                    "objectType must be a string, found {}",
                    other
                )))
            }
            None => None,
        };
        let body = Value::Object(map);

        let object = match object_type.as_deref().and_then(ObjectKind::from_media_type) {
            Some(ObjectKind::Container) => CdmiObject::Container(serde_json::from_value(body)?),
            Some(ObjectKind::DataObject) => CdmiObject::DataObject(serde_json::from_value(body)?),
            Some(ObjectKind::Capability) => CdmiObject::Capability(serde_json::from_value(body)?),
            Some(ObjectKind::Domain) => CdmiObject::Domain(serde_json::from_value(body)?),
            Some(ObjectKind::Generic) | None => {
                let mut generic: GenericObject = serde_json::from_value(body)?;
                generic.object_type = object_type;
                CdmiObject::Generic(generic)
            }
        };
        Ok(object)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json()?)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(value)
    }
}

macro_rules! impl_variant {
    ($variant:ident, $kind:expr) => {
        impl From<$variant> for CdmiObject {
            fn from(value: $variant) -> Self {
                CdmiObject::$variant(value)
            }
        }

        impl TryFrom<CdmiObject> for $variant {
            type Error = Error;

            fn try_from(object: CdmiObject) -> Result<Self> {
                match object {
                    CdmiObject::$variant(inner) => Ok(inner),
                    other => Err(Error::Malformed(format!(
                        "{} is a {}, not a {}",
                        other.path().unwrap_or_else(|| other.object_id().to_string()),
                        other.kind(),
                        $kind
                    ))),
                }
            }
        }
    };
}

impl_variant!(Container, ObjectKind::Container);
impl_variant!(DataObject, ObjectKind::DataObject);
impl_variant!(Capability, ObjectKind::Capability);
impl_variant!(Domain, ObjectKind::Domain);

// =============================================================================
// Helpers
// =============================================================================

/// Index span of a child listing: `""`, `"0"` or `"0-(n-1)"`
pub fn children_range(len: usize) -> String {
    match len {
        0 => String::new(),
        1 => "0".to_string(),
        n => format!("0-{}", n - 1),
    }
}

/// Current time as stored in system metadata
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Normalise a request path: leading `/`, no empty, trailing or dot segments
pub fn normalize_path(path: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(Error::invalid_path(path, "relative segments are not allowed"));
        }
        segments.push(segment);
    }

    if segments.first() == Some(&OBJECT_ID_SEGMENT) {
        return Err(Error::invalid_path(path, "reserved for identifier lookups"));
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Split a normalised path into parent path and name. `None` for the root.
pub fn split_path(path: &str) -> Option<(String, String)> {
    if path == ROOT_PATH {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT_PATH } else { &path[..idx] };
    Some((parent.to_string(), path[idx + 1..].to_string()))
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}
