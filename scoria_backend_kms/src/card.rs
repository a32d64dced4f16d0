// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The real [`KmsDevice`] over a DRM card node.
//!
//! [`Card`] wraps an opened `/dev/dri/cardN` file and implements the
//! device seam with the `drm` crate's control API. This is the only
//! module that touches `drm` types; everything above it speaks the plain
//! ids of [`device`](crate::device).

use std::fs::{File, OpenOptions};
use std::num::NonZeroU32;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;

use drm::{ClientCapability, Device};
use drm::buffer::{DrmFourcc, DrmModifier, PlanarBuffer};
use drm::control::{
    Device as ControlDevice, Event, FbCmd2Flags, ModeTypeFlags, connector, crtc, framebuffer,
    plane, property,
};
use scoria_core::buffer::BufferLayout;
use scoria_core::time::TimePoint;

use crate::device::{
    BlobId, CommitFlags, ConnectorDesc, ConnectorId, CrtcDesc, CrtcId, DisplayEvent, EncoderDesc,
    EncoderId, FramebufferId, KmsDevice, Mode, ObjectKind, PlaneDesc, PlaneId, PlaneKind,
    PropertyDescriptor, PropertyId, PropertyUpdate,
};
use crate::error::KmsError;

/// An opened DRM card node.
#[derive(Debug)]
pub struct Card {
    file: File,
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl Device for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Opens a card node, e.g. `/dev/dri/card0`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KmsError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| KmsError::Resource(format!("cannot open {}: {e}", path.display())))?;
        log::info!("opened display device {}", path.display());
        Ok(Self { file })
    }
}

fn nonzero(id: u32) -> Result<NonZeroU32, KmsError> {
    NonZeroU32::new(id)
        .ok_or_else(|| KmsError::Configuration("kernel object id zero".to_owned()))
}

fn convert_mode(raw: &drm::control::Mode) -> Mode {
    let (width, height) = raw.size();
    Mode {
        name: raw.name().to_string_lossy().into_owned(),
        width,
        height,
        refresh_hz: raw.vrefresh(),
        preferred: raw.mode_type().contains(ModeTypeFlags::PREFERRED),
    }
}

/// Adapter giving a [`BufferLayout`] the planar-buffer shape the `drm`
/// crate expects for `ADDFB2`.
struct LayoutBuffer<'a> {
    layout: &'a BufferLayout,
    fourcc: DrmFourcc,
}

impl PlanarBuffer for LayoutBuffer<'_> {
    fn size(&self) -> (u32, u32) {
        (self.layout.width, self.layout.height)
    }

    fn format(&self) -> DrmFourcc {
        self.fourcc
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.layout.modifier.map(DrmModifier::from)
    }

    fn pitches(&self) -> [u32; 4] {
        let mut pitches = [0; 4];
        for (slot, plane) in pitches.iter_mut().zip(&self.layout.planes) {
            *slot = plane.pitch;
        }
        pitches
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        let mut handles = [None; 4];
        for (slot, plane) in handles.iter_mut().zip(&self.layout.planes) {
            *slot = NonZeroU32::new(plane.handle).map(drm::buffer::Handle::from);
        }
        handles
    }

    fn offsets(&self) -> [u32; 4] {
        let mut offsets = [0; 4];
        for (slot, plane) in offsets.iter_mut().zip(&self.layout.planes) {
            *slot = plane.offset;
        }
        offsets
    }
}

impl Card {
    fn crtc_ids_from_filter(
        &self,
        filter: drm::control::CrtcListFilter,
    ) -> Result<Vec<CrtcId>, KmsError> {
        let resources = self.resource_handles().map_err(KmsError::Io)?;
        Ok(resources
            .filter_crtcs(filter)
            .into_iter()
            .map(|handle| CrtcId(handle.into()))
            .collect())
    }

    fn plane_kind(&self, handle: plane::Handle) -> Result<PlaneKind, KmsError> {
        // DRM_PLANE_TYPE_*: 0 overlay, 1 primary, 2 cursor.
        let props = self.object_properties(handle.into(), ObjectKind::Plane)?;
        let kind = props
            .iter()
            .find(|prop| prop.name == "type")
            .map(|prop| prop.value);
        Ok(match kind {
            Some(1) => PlaneKind::Primary,
            Some(2) => PlaneKind::Cursor,
            _ => PlaneKind::Overlay,
        })
    }
}

impl KmsDevice for Card {
    fn enable_capabilities(&self) -> Result<(), KmsError> {
        for capability in [ClientCapability::UniversalPlanes, ClientCapability::Atomic] {
            self.set_client_capability(capability, true).map_err(|e| {
                KmsError::Resource(format!("device lacks {capability:?} support: {e}"))
            })?;
        }
        Ok(())
    }

    fn connectors(&self) -> Result<Vec<ConnectorDesc>, KmsError> {
        let resources = self.resource_handles().map_err(KmsError::Io)?;
        let mut connectors = Vec::new();
        for &handle in resources.connectors() {
            let info = self.get_connector(handle, false).map_err(KmsError::Io)?;
            connectors.push(ConnectorDesc {
                id: ConnectorId(handle.into()),
                encoders: info
                    .encoders()
                    .iter()
                    .map(|&encoder| EncoderId(encoder.into()))
                    .collect(),
                modes: info.modes().iter().map(convert_mode).collect(),
                connected: info.state() == connector::State::Connected,
                interface: format!("{:?}", info.interface()),
            });
        }
        Ok(connectors)
    }

    fn encoders(&self) -> Result<Vec<EncoderDesc>, KmsError> {
        let resources = self.resource_handles().map_err(KmsError::Io)?;
        let mut encoders = Vec::new();
        for &handle in resources.encoders() {
            let info = self.get_encoder(handle).map_err(KmsError::Io)?;
            encoders.push(EncoderDesc {
                id: EncoderId(handle.into()),
                compatible_crtcs: self.crtc_ids_from_filter(info.possible_crtcs())?,
            });
        }
        Ok(encoders)
    }

    fn crtcs(&self) -> Result<Vec<CrtcDesc>, KmsError> {
        let resources = self.resource_handles().map_err(KmsError::Io)?;
        Ok(resources
            .crtcs()
            .iter()
            .map(|&handle| CrtcDesc {
                id: CrtcId(handle.into()),
            })
            .collect())
    }

    fn planes(&self) -> Result<Vec<PlaneDesc>, KmsError> {
        let mut planes = Vec::new();
        for handle in self.plane_handles().map_err(KmsError::Io)? {
            let info = self.get_plane(handle).map_err(KmsError::Io)?;
            planes.push(PlaneDesc {
                id: PlaneId(handle.into()),
                compatible_crtcs: self.crtc_ids_from_filter(info.possible_crtcs())?,
                kind: self.plane_kind(handle)?,
            });
        }
        Ok(planes)
    }

    fn object_properties(
        &self,
        object: u32,
        kind: ObjectKind,
    ) -> Result<Vec<PropertyDescriptor>, KmsError> {
        let raw = nonzero(object)?;
        let value_set = match kind {
            ObjectKind::Connector => self
                .get_properties(connector::Handle::from(raw))
                .map_err(KmsError::Io)?,
            ObjectKind::Crtc => self
                .get_properties(crtc::Handle::from(raw))
                .map_err(KmsError::Io)?,
            ObjectKind::Plane => self
                .get_properties(plane::Handle::from(raw))
                .map_err(KmsError::Io)?,
        };

        let (ids, values) = value_set.as_props_and_values();
        let mut properties = Vec::with_capacity(ids.len());
        for (&id, &value) in ids.iter().zip(values.iter()) {
            let info = self.get_property(id).map_err(KmsError::Io)?;
            properties.push(PropertyDescriptor {
                id: PropertyId(id.into()),
                name: info.name().to_string_lossy().into_owned(),
                value,
            });
        }
        Ok(properties)
    }

    fn create_mode_blob(&self, connector: ConnectorId, mode: &Mode) -> Result<BlobId, KmsError> {
        let handle = connector::Handle::from(nonzero(connector.0)?);
        let info = self.get_connector(handle, false).map_err(KmsError::Io)?;
        let raw = info
            .modes()
            .iter()
            .find(|candidate| convert_mode(candidate) == *mode)
            .ok_or_else(|| {
                KmsError::Configuration(format!(
                    "mode {} not offered by connector {}",
                    mode.name, connector.0
                ))
            })?;
        match self.create_property_blob(raw).map_err(KmsError::Io)? {
            property::Value::Blob(id) => Ok(BlobId(id)),
            other => Err(KmsError::Configuration(format!(
                "mode blob creation returned non-blob value {other:?}"
            ))),
        }
    }

    fn destroy_blob(&self, blob: BlobId) -> Result<(), KmsError> {
        self.destroy_property_blob(blob.0).map_err(KmsError::Io)
    }

    fn create_framebuffer(&self, layout: &BufferLayout) -> Result<FramebufferId, KmsError> {
        let fourcc = DrmFourcc::try_from(layout.fourcc)
            .map_err(|e| KmsError::Framebuffer(format!("unrecognized fourcc: {e}")))?;
        let buffer = LayoutBuffer {
            layout,
            fourcc,
        };
        let flags = if layout.modifier.is_some() {
            FbCmd2Flags::MODIFIERS
        } else {
            FbCmd2Flags::empty()
        };
        let handle = self
            .add_planar_framebuffer(&buffer, flags)
            .map_err(|e| KmsError::Framebuffer(format!("kernel rejected framebuffer: {e}")))?;
        Ok(FramebufferId(handle.into()))
    }

    fn destroy_framebuffer(&self, fb: FramebufferId) -> Result<(), KmsError> {
        let handle = framebuffer::Handle::from(nonzero(fb.0)?);
        ControlDevice::destroy_framebuffer(self, handle).map_err(KmsError::Io)
    }

    fn atomic_commit(
        &self,
        flags: CommitFlags,
        updates: &[PropertyUpdate],
    ) -> Result<(), KmsError> {
        let mut request = drm::control::atomic::AtomicModeReq::new();
        for update in updates {
            let raw = nonzero(update.object)?;
            let prop = property::Handle::from(nonzero(update.property.0)?);
            let value = property::Value::Unknown(update.value);
            match update.kind {
                ObjectKind::Connector => {
                    request.add_property(connector::Handle::from(raw), prop, value);
                }
                ObjectKind::Crtc => {
                    request.add_property(crtc::Handle::from(raw), prop, value);
                }
                ObjectKind::Plane => {
                    request.add_property(plane::Handle::from(raw), prop, value);
                }
            }
        }

        let mut raw_flags = drm::control::AtomicCommitFlags::empty();
        if flags.contains(CommitFlags::ALLOW_MODESET) {
            raw_flags |= drm::control::AtomicCommitFlags::ALLOW_MODESET;
        }
        if flags.contains(CommitFlags::PAGE_FLIP_EVENT) {
            raw_flags |= drm::control::AtomicCommitFlags::PAGE_FLIP_EVENT;
        }
        if flags.contains(CommitFlags::NONBLOCK) {
            raw_flags |= drm::control::AtomicCommitFlags::NONBLOCK;
        }

        log::trace!("atomic commit: {} writes, flags {flags:?}", updates.len());
        ControlDevice::atomic_commit(self, raw_flags, request).map_err(KmsError::CommitRejected)
    }

    fn drain_events(&self) -> Result<Vec<DisplayEvent>, KmsError> {
        let events = match self.receive_events() {
            Ok(events) => events,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(KmsError::Io(e)),
        };
        let mut out = Vec::new();
        for event in events {
            match event {
                Event::PageFlip(flip) => out.push(DisplayEvent::PageFlip {
                    crtc: CrtcId(flip.crtc.into()),
                    timestamp: TimePoint(
                        u64::try_from(flip.duration.as_nanos()).unwrap_or(u64::MAX),
                    ),
                }),
                // Plain vblank and unknown events are not requested by
                // this runtime; nothing waits on them.
                _ => log::trace!("ignoring non-flip display event"),
            }
        }
        Ok(out)
    }

    fn event_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.file.as_fd())
    }
}
