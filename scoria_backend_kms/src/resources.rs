// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display session: enumerated resources, property tables, output choice.
//!
//! A [`DisplaySession`] is built once at startup. It enables the required
//! client capabilities, enumerates the display pipeline objects, and
//! caches each object's property table so later writes can address
//! properties by stable name instead of driver-assigned id.
//!
//! Property ids are only meaningful for the object they were enumerated
//! on and are not stable across boots; the cached tables are the sole
//! name → id authority for the lifetime of the session.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::atomic::AtomicRequest;
use crate::device::{
    BlobId, ConnectorDesc, ConnectorId, CrtcDesc, CrtcId, EncoderDesc, EncoderId, KmsDevice, Mode,
    ObjectKind, PlaneDesc, PlaneId, PlaneKind, PropertyId,
};
use crate::error::KmsError;

/// Name → id property table of one kernel object.
#[derive(Clone, Debug, Default)]
pub struct PropertyTable {
    by_name: HashMap<String, PropertyId>,
}

impl PropertyTable {
    /// Looks a property up by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }
}

/// The output path currently configured on the session.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Chosen connector.
    pub connector: ConnectorId,
    /// Encoder linking connector to CRTC.
    pub encoder: EncoderId,
    /// CRTC driving the scan-out timing.
    pub crtc: CrtcId,
    /// Primary plane scanned out on the CRTC.
    pub primary_plane: PlaneId,
    /// Active mode.
    pub mode: Mode,
    /// Kernel blob holding the active mode, referenced by `MODE_ID`.
    pub mode_blob: BlobId,
}

/// One opened display device with its enumerated pipeline.
#[derive(Debug)]
pub struct DisplaySession<D: KmsDevice> {
    device: D,
    connectors: Vec<ConnectorDesc>,
    encoders: Vec<EncoderDesc>,
    crtcs: Vec<CrtcDesc>,
    planes: Vec<PlaneDesc>,
    properties: HashMap<u32, PropertyTable>,
    config: Option<OutputConfig>,
    /// Set on (re)configuration, cleared by the first successful commit
    /// that carried the mode-set writes.
    modeset_needed: AtomicBool,
    /// Serializes atomic commits. The presentation thread is normally the
    /// only committer; the lock is the backstop that keeps a stray
    /// caller from interleaving property writes.
    commit_lock: Mutex<()>,
}

impl<D: KmsDevice> DisplaySession<D> {
    /// Opens a session: enables capabilities, enumerates resources, and
    /// caches property tables.
    ///
    /// Fails with [`KmsError::Resource`] when the device lacks atomic
    /// mode-setting or universal planes.
    pub fn open(device: D) -> Result<Self, KmsError> {
        device.enable_capabilities()?;

        let connectors = device.connectors()?;
        let encoders = device.encoders()?;
        let crtcs = device.crtcs()?;
        let planes = device.planes()?;

        let mut properties = HashMap::new();
        let objects = connectors
            .iter()
            .map(|c| (c.id.0, ObjectKind::Connector))
            .chain(crtcs.iter().map(|c| (c.id.0, ObjectKind::Crtc)))
            .chain(planes.iter().map(|p| (p.id.0, ObjectKind::Plane)));
        for (object, kind) in objects {
            let mut table = PropertyTable::default();
            for descriptor in device.object_properties(object, kind)? {
                table.by_name.insert(descriptor.name, descriptor.id);
            }
            properties.insert(object, table);
        }

        log::info!(
            "display session: {} connectors, {} encoders, {} crtcs, {} planes",
            connectors.len(),
            encoders.len(),
            crtcs.len(),
            planes.len(),
        );

        Ok(Self {
            device,
            connectors,
            encoders,
            crtcs,
            planes,
            properties,
            config: None,
            modeset_needed: AtomicBool::new(false),
            commit_lock: Mutex::new(()),
        })
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Enumerated connectors.
    #[must_use]
    pub fn connectors(&self) -> &[ConnectorDesc] {
        &self.connectors
    }

    /// Enumerated planes.
    #[must_use]
    pub fn planes(&self) -> &[PlaneDesc] {
        &self.planes
    }

    /// The configured output path, once [`configure`](Self::configure)
    /// has succeeded.
    #[must_use]
    pub fn config(&self) -> Option<&OutputConfig> {
        self.config.as_ref()
    }

    /// A full mode-set is still owed to the kernel.
    #[must_use]
    pub fn modeset_needed(&self) -> bool {
        self.modeset_needed.load(Ordering::Acquire)
    }

    pub(crate) fn clear_modeset_needed(&self) {
        self.modeset_needed.store(false, Ordering::Release);
    }

    pub(crate) fn commit_lock(&self) -> &Mutex<()> {
        &self.commit_lock
    }

    /// Starts an empty atomic request against this session.
    #[must_use]
    pub fn begin_request(&self) -> AtomicRequest<'_, D> {
        AtomicRequest::new(self)
    }

    /// Resolves a property by name on one object.
    ///
    /// Fails with [`KmsError::UnknownProperty`] when the object has no
    /// property of that name; the caller's commit must not proceed with a
    /// silently dropped write.
    pub fn property(&self, object: u32, name: &str) -> Result<PropertyId, KmsError> {
        self.properties
            .get(&object)
            .and_then(|table| table.lookup(name))
            .ok_or_else(|| KmsError::UnknownProperty {
                object,
                name: name.to_owned(),
            })
    }

    /// Picks the first connected connector, its preferred mode (or the
    /// first offered mode), and the first routable encoder/CRTC pair, then
    /// configures that path.
    pub fn configure_preferred(&mut self) -> Result<(), KmsError> {
        let (connector, mode) = self
            .connectors
            .iter()
            .find(|c| c.connected && !c.modes.is_empty())
            .map(|c| {
                let mode = c
                    .modes
                    .iter()
                    .find(|m| m.preferred)
                    .unwrap_or(&c.modes[0])
                    .clone();
                (c.id, mode)
            })
            .ok_or_else(|| {
                KmsError::Configuration("no connected connector with modes".to_owned())
            })?;
        let connector_desc = self
            .connectors
            .iter()
            .find(|c| c.id == connector)
            .ok_or_else(|| {
                KmsError::Configuration(format!("no connector with id {}", connector.0))
            })?;
        let (encoder, crtc) = self.route_connector(connector_desc)?;
        self.configure(connector, encoder, crtc, &mode)
    }

    /// Configures the output path `connector` → `encoder` → `crtc` plus a
    /// compatible primary plane for `mode`.
    ///
    /// Every link is validated against the enumerated compatibility sets
    /// (the encoder must be reachable from the connector, the CRTC from
    /// the encoder); a path the hardware cannot route is rejected up
    /// front rather than left for the kernel to refuse at commit time.
    /// Hardware is not touched here beyond uploading the mode blob — the
    /// next commit carries the actual mode change. Succeeding a second
    /// time replaces the previous configuration and re-arms the pending
    /// mode-set.
    pub fn configure(
        &mut self,
        connector: ConnectorId,
        encoder: EncoderId,
        crtc: CrtcId,
        mode: &Mode,
    ) -> Result<(), KmsError> {
        let connector_desc = self
            .connectors
            .iter()
            .find(|c| c.id == connector)
            .ok_or_else(|| {
                KmsError::Configuration(format!("no connector with id {}", connector.0))
            })?;
        if !connector_desc.modes.contains(mode) {
            return Err(KmsError::Configuration(format!(
                "connector {} does not offer mode {}",
                connector.0, mode.name
            )));
        }
        if !connector_desc.encoders.contains(&encoder) {
            return Err(KmsError::Configuration(format!(
                "encoder {} is not reachable from connector {}",
                encoder.0, connector.0
            )));
        }
        let encoder_desc = self
            .encoders
            .iter()
            .find(|e| e.id == encoder)
            .ok_or_else(|| KmsError::Configuration(format!("no encoder with id {}", encoder.0)))?;
        if !encoder_desc.compatible_crtcs.contains(&crtc) {
            return Err(KmsError::Configuration(format!(
                "crtc {} cannot drive encoder {}",
                crtc.0, encoder.0
            )));
        }
        let primary_plane = self.pick_primary_plane(crtc)?;

        let mode_blob = self.device.create_mode_blob(connector, mode)?;
        if let Some(previous) = self.config.take() {
            // Best effort; the new blob is already in place.
            if let Err(e) = self.device.destroy_blob(previous.mode_blob) {
                log::warn!("failed to destroy old mode blob: {e}");
            }
        }

        log::info!(
            "configured output: connector {} -> encoder {} -> crtc {} -> plane {}, mode {}@{}",
            connector.0,
            encoder.0,
            crtc.0,
            primary_plane.0,
            mode.name,
            mode.refresh_hz,
        );

        self.config = Some(OutputConfig {
            connector,
            encoder,
            crtc,
            primary_plane,
            mode: mode.clone(),
            mode_blob,
        });
        self.modeset_needed.store(true, Ordering::Release);
        Ok(())
    }

    /// Finds the first encoder reachable from `connector` that has at
    /// least one compatible CRTC, and the first such CRTC.
    fn route_connector(
        &self,
        connector: &ConnectorDesc,
    ) -> Result<(EncoderId, CrtcId), KmsError> {
        for &encoder_id in &connector.encoders {
            let Some(encoder) = self.encoders.iter().find(|e| e.id == encoder_id) else {
                continue;
            };
            for &crtc_id in &encoder.compatible_crtcs {
                if self.crtcs.iter().any(|c| c.id == crtc_id) {
                    return Ok((encoder_id, crtc_id));
                }
            }
        }
        Err(KmsError::Configuration(format!(
            "no encoder/CRTC route from connector {}",
            connector.id.0
        )))
    }

    fn pick_primary_plane(&self, crtc: CrtcId) -> Result<PlaneId, KmsError> {
        self.planes
            .iter()
            .find(|p| p.kind == PlaneKind::Primary && p.compatible_crtcs.contains(&crtc))
            .map(|p| p.id)
            .ok_or_else(|| {
                KmsError::Configuration(format!("no primary plane for crtc {}", crtc.0))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDevice;

    #[test]
    fn open_enables_capabilities_and_caches_properties() {
        let session = DisplaySession::open(FakeDevice::new()).unwrap();
        assert!(session.device().capabilities_enabled());
        // Property lookups resolve by name on every object class.
        session.property(FakeDevice::CONNECTOR, "CRTC_ID").unwrap();
        session.property(FakeDevice::CRTC, "MODE_ID").unwrap();
        session.property(FakeDevice::PLANE, "FB_ID").unwrap();
    }

    #[test]
    fn unknown_property_is_an_error_not_a_dropped_write() {
        let session = DisplaySession::open(FakeDevice::new()).unwrap();
        let err = session
            .property(FakeDevice::PLANE, "NO_SUCH_PROP")
            .unwrap_err();
        assert!(
            matches!(err, KmsError::UnknownProperty { object, .. } if object == FakeDevice::PLANE),
            "expected UnknownProperty, got {err:?}"
        );
    }

    #[test]
    fn configure_preferred_routes_the_whole_path() {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        session.configure_preferred().unwrap();
        let config = session.config().unwrap();
        assert_eq!(config.connector.0, FakeDevice::CONNECTOR);
        assert_eq!(config.encoder.0, FakeDevice::ENCODER);
        assert_eq!(config.crtc.0, FakeDevice::CRTC);
        assert_eq!(config.primary_plane.0, FakeDevice::PLANE);
        assert!(config.mode.preferred);
        assert!(session.modeset_needed());
    }

    #[test]
    fn configure_rejects_a_mode_the_connector_does_not_offer() {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        let alien = Mode {
            name: "640x480".to_owned(),
            width: 640,
            height: 480,
            refresh_hz: 60,
            preferred: false,
        };
        let err = session
            .configure(
                ConnectorId(FakeDevice::CONNECTOR),
                EncoderId(FakeDevice::ENCODER),
                CrtcId(FakeDevice::CRTC),
                &alien,
            )
            .unwrap_err();
        assert!(matches!(err, KmsError::Configuration(_)));
        assert!(session.config().is_none());
    }

    #[test]
    fn configure_rejects_an_encoder_the_connector_cannot_feed() {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        let mode = session.connectors()[0].modes[0].clone();
        let err = session
            .configure(
                ConnectorId(FakeDevice::CONNECTOR),
                EncoderId(99),
                CrtcId(FakeDevice::CRTC),
                &mode,
            )
            .unwrap_err();
        assert!(matches!(err, KmsError::Configuration(_)));
    }

    #[test]
    fn configure_rejects_a_crtc_the_encoder_cannot_use() {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        let mode = session.connectors()[0].modes[0].clone();
        let err = session
            .configure(
                ConnectorId(FakeDevice::CONNECTOR),
                EncoderId(FakeDevice::ENCODER),
                CrtcId(99),
                &mode,
            )
            .unwrap_err();
        assert!(matches!(err, KmsError::Configuration(_)));
    }

    #[test]
    fn reconfigure_destroys_the_old_mode_blob_and_rearms_modeset() {
        let mut session = DisplaySession::open(FakeDevice::new()).unwrap();
        session.configure_preferred().unwrap();
        let first_blob = session.config().unwrap().mode_blob;
        session.clear_modeset_needed();

        session.configure_preferred().unwrap();
        let second_blob = session.config().unwrap().mode_blob;
        assert_ne!(first_blob, second_blob);
        assert!(session.device().destroyed_blobs().contains(&first_blob));
        assert!(session.modeset_needed());
    }
}
