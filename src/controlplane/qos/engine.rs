//! QoS Transition Engine
//!
//! Moves containers and data objects between backend profiles. The state of
//! an object lives with the object itself: `capabilitiesURI` is the current
//! profile and the `cdmi_capabilities_target` metadata entry is the pending
//! target. Every read-modify-write happens under the object's path lock, the
//! same lock the hierarchy takes, and completion runs on a background task
//! once the backend's delay has elapsed.

use super::state::QosState;
use crate::domain::model::{normalize_path, CdmiObject};
use crate::domain::ports::{CapabilityType, ObjectStatus, ObjectStoreRef, StorageBackendRef};
use crate::error::{Error, Result};
use crate::hierarchy::{Hierarchy, PathLocks};
use dashmap::DashSet;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pending target profile of an object
pub const META_CAPABILITIES_TARGET: &str = "cdmi_capabilities_target";
/// Suggested polling interval in milliseconds while a transition is pending
pub const META_POLLING_INTERVAL: &str = "cdmi_recommended_polling_interval";
/// Time the object entered its current profile
pub const META_ASSOCIATION_TIME: &str = "cdmi_capability_association_time";

/// Shortest wait before asking a busy backend again
const MIN_RETRY: Duration = Duration::from_millis(10);

/// Engine coordinating profile transitions with a storage backend
pub struct QosEngine {
    store: ObjectStoreRef,
    locks: Arc<PathLocks>,
    backend: StorageBackendRef,
    /// Identifiers of objects with a completion task in flight
    scheduled: DashSet<String>,
    /// Association time reported for objects that never moved
    started_at: String,
}

impl QosEngine {
    /// Create an engine sharing the hierarchy's store and lock table
    pub fn new(hierarchy: &Hierarchy, backend: StorageBackendRef) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::clone(hierarchy.store()),
            locks: hierarchy.locks(),
            backend,
            scheduled: DashSet::new(),
            started_at: association_time(),
        })
    }

    pub fn backend(&self) -> &StorageBackendRef {
        &self.backend
    }

    /// Number of transitions waiting for completion
    pub fn pending_transitions(&self) -> usize {
        self.scheduled.len()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Current profile, pending target and monitored attributes of the
    /// object at `path`.
    ///
    /// An object without a known profile is initialised to the backend's
    /// default for its type. A pending target recorded by an earlier run is
    /// rescheduled.
    pub async fn get_current_status(self: &Arc<Self>, path: &str) -> Result<ObjectStatus> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;

        let mut object = self.load(&path).await?;
        let capability_type = qos_type(&path, &object)?;
        let state = self.read_state(&path, &mut object, capability_type).await?;
        self.resume(&path, &object, &state);

        Ok(self.status(&object, &state, capability_type))
    }

    /// Start moving the object at `path` to the `target` profile.
    ///
    /// Fails with `UnsupportedTransition` before anything is scheduled when
    /// the backend does not allow the move, and with `TransitionInProgress`
    /// while an earlier request is still pending.
    pub async fn request_transition(
        self: &Arc<Self>,
        path: &str,
        target: &str,
    ) -> Result<ObjectStatus> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;

        let mut object = self.load(&path).await?;
        let capability_type = qos_type(&path, &object)?;
        let state = self.read_state(&path, &mut object, capability_type).await?;
        self.resume(&path, &object, &state);

        let next = state.begin(&path, target)?;
        let delay = self
            .backend
            .request_transition(&path, state.current(), target)
            .await?;

        if let Some(metadata) = object.metadata_mut() {
            metadata.insert(
                META_CAPABILITIES_TARGET.to_string(),
                Value::String(target.to_string()),
            );
            metadata.insert(
                META_POLLING_INTERVAL.to_string(),
                Value::String(delay.as_millis().to_string()),
            );
        }
        self.store.put(&path, &object).await?;

        info!(
            path = %path,
            current = %state.current(),
            target = %target,
            delay_ms = delay.as_millis() as u64,
            "QoS transition requested"
        );

        self.schedule(&path, object.object_id(), delay);
        Ok(self.status(&object, &next, capability_type))
    }

    // =========================================================================
    // Completion
    // =========================================================================

    fn schedule(self: &Arc<Self>, path: &str, object_id: &str, delay: Duration) {
        if !self.scheduled.insert(object_id.to_string()) {
            return;
        }

        let engine = Arc::clone(self);
        let path = path.to_string();
        let object_id = object_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = engine.complete_transition(&path, &object_id).await {
                warn!(path = %path, error = %e, "Failed to complete QoS transition");
            }
        });
    }

    /// Reschedule a pending transition nobody is waiting for
    fn resume(self: &Arc<Self>, path: &str, object: &CdmiObject, state: &QosState) {
        if !state.is_transitioning() || self.scheduled.contains(object.object_id()) {
            return;
        }

        debug!(path = %path, target = ?state.target(), "Resuming pending QoS transition");
        self.schedule(path, object.object_id(), polling_interval(object));
    }

    async fn complete_transition(self: &Arc<Self>, path: &str, object_id: &str) -> Result<()> {
        let outcome = {
            let _guard = self.locks.lock(path).await;
            let outcome = self.finish(path, object_id).await;
            self.scheduled.remove(object_id);
            outcome
        };

        if let Some(retry) = outcome? {
            debug!(path = %path, retry_ms = retry.as_millis() as u64, "Backend still moving object");
            self.schedule(path, object_id, retry);
        }
        Ok(())
    }

    /// Record the end of a transition. Returns a retry delay while the
    /// backend reports the object as still moving.
    async fn finish(&self, path: &str, object_id: &str) -> Result<Option<Duration>> {
        let mut object = match self.store.get_by_path(path).await? {
            Some(object) if object.object_id() == object_id => object,
            _ => {
                debug!(path = %path, "Object went away before its QoS transition completed");
                return Ok(None);
            }
        };

        let current = object.capabilities_uri().unwrap_or_default().to_string();
        let target = object
            .metadata()
            .and_then(|m| m.get(META_CAPABILITIES_TARGET))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(target) = target else {
            return Ok(None);
        };

        // A backend that tracks the object has the final word on its profile
        let reached = match self.backend.get_current_status(path).await? {
            Some(reported) if reported.is_transitioning() => {
                return Ok(Some(polling_interval(&object).max(MIN_RETRY)));
            }
            Some(reported) if self.backend.has_profile(&reported.current_capabilities_uri) => {
                reported.current_capabilities_uri
            }
            _ => target,
        };

        let state = QosState::from_parts(current.as_str(), Some(reached)).complete();
        object.set_capabilities_uri(state.current());
        if let Some(metadata) = object.metadata_mut() {
            metadata.remove(META_CAPABILITIES_TARGET);
            metadata.remove(META_POLLING_INTERVAL);
            metadata.insert(
                META_ASSOCIATION_TIME.to_string(),
                Value::String(association_time()),
            );
        }
        self.store.put(path, &object).await?;

        info!(
            path = %path,
            from = %current,
            to = %state.current(),
            "QoS transition finished"
        );
        Ok(None)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, path: &str) -> Result<CdmiObject> {
        self.store
            .get_by_path(path)
            .await?
            .ok_or_else(|| Error::not_found(path))
    }

    /// Derive the state of `object`, persisting the default profile when the
    /// recorded one is unknown to the backend
    async fn read_state(
        &self,
        path: &str,
        object: &mut CdmiObject,
        capability_type: CapabilityType,
    ) -> Result<QosState> {
        let recorded = object.capabilities_uri().unwrap_or_default();
        if !self.backend.has_profile(recorded) {
            let default = self.backend.default_profile(capability_type);
            debug!(path = %path, profile = %default, "Initialising QoS profile");
            object.set_capabilities_uri(default);
            self.store.put(path, object).await?;
        }

        let target = object
            .metadata()
            .and_then(|m| m.get(META_CAPABILITIES_TARGET))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(QosState::from_parts(
            object.capabilities_uri().unwrap_or_default(),
            target,
        ))
    }

    fn status(
        &self,
        object: &CdmiObject,
        state: &QosState,
        capability_type: CapabilityType,
    ) -> ObjectStatus {
        let stored = object.metadata().cloned().unwrap_or_default();
        let mut monitored = self.backend.monitored_attributes(state.current());

        monitored.insert(
            META_ASSOCIATION_TIME.to_string(),
            stored
                .get(META_ASSOCIATION_TIME)
                .cloned()
                .unwrap_or_else(|| Value::String(self.started_at.clone())),
        );
        if let Some(target) = state.target() {
            monitored.insert(
                META_CAPABILITIES_TARGET.to_string(),
                Value::String(target.to_string()),
            );
            if let Some(interval) = stored.get(META_POLLING_INTERVAL) {
                monitored.insert(META_POLLING_INTERVAL.to_string(), interval.clone());
            }
        }

        ObjectStatus {
            current_capabilities_uri: state.current().to_string(),
            target_capabilities_uri: state.target().map(str::to_string),
            monitored_attributes: monitored,
            export_attributes: self.backend.export_attributes(capability_type),
        }
    }
}

/// Fold a QoS status into the entity returned to a caller
pub fn apply_status(object: &mut CdmiObject, status: &ObjectStatus) {
    object.set_capabilities_uri(status.current_capabilities_uri.clone());
    if let Some(metadata) = object.metadata_mut() {
        for (key, value) in &status.monitored_attributes {
            metadata.insert(key.clone(), value.clone());
        }
    }
    if let CdmiObject::Container(container) = object {
        if !status.export_attributes.is_empty() {
            container.exports = Some(Value::Object(
                status.export_attributes.clone().into_iter().collect(),
            ));
        }
    }
}

fn qos_type(path: &str, object: &CdmiObject) -> Result<CapabilityType> {
    CapabilityType::for_kind(object.kind()).ok_or_else(|| {
        Error::Malformed(format!(
            "{} is a {}; QoS applies to containers and data objects",
            path,
            object.kind()
        ))
    })
}

/// Polling interval recorded with a pending transition
fn polling_interval(object: &CdmiObject) -> Duration {
    object
        .metadata()
        .and_then(|m| m.get(META_POLLING_INTERVAL))
        .and_then(|v| v.as_str())
        .and_then(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

fn association_time() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%MZ").to_string()
}
