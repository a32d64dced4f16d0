// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The kernel-device seam.
//!
//! [`KmsDevice`] is the narrow set of kernel mode-setting operations the
//! runtime consumes, expressed over plain ids and values. The real
//! implementation is [`Card`](crate::card::Card); tests drive the same
//! code paths with an in-memory fake. Everything above this trait —
//! session, atomic builder, framebuffer cache, presentation loop — is
//! device-agnostic.
//!
//! Ids are raw kernel object ids wrapped in per-kind newtypes; property
//! ids are driver-assigned and not stable across boots, which is why the
//! layers above address properties by name against cached tables.

use core::fmt;
use std::os::fd::BorrowedFd;

use bitflags::bitflags;
use scoria_core::buffer::BufferLayout;
use scoria_core::time::TimePoint;

use crate::error::KmsError;

/// Kernel connector object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(pub u32);

/// Kernel encoder object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderId(pub u32);

/// Kernel CRTC (timing controller) object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrtcId(pub u32);

/// Kernel plane object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneId(pub u32);

/// Kernel property id, valid only for the object it was read from.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(pub u32);

/// Kernel framebuffer object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Kernel property-blob id (e.g. a mode blob).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub u64);

macro_rules! debug_id {
    ($ty:ident) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({})"), self.0)
            }
        }
    };
}

debug_id!(ConnectorId);
debug_id!(EncoderId);
debug_id!(CrtcId);
debug_id!(PlaneId);
debug_id!(PropertyId);
debug_id!(FramebufferId);
debug_id!(BlobId);

/// A display timing configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mode {
    /// Human-readable name, e.g. `1920x1080`.
    pub name: String,
    /// Horizontal active pixels.
    pub width: u16,
    /// Vertical active pixels.
    pub height: u16,
    /// Vertical refresh in Hz.
    pub refresh_hz: u32,
    /// Marked preferred by the connector.
    pub preferred: bool,
}

/// Which kind of kernel object a property write addresses.
///
/// The kernel property ioctls are typed per object class; carrying the
/// kind lets the device map a raw id back to the right handle type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A connector.
    Connector,
    /// A CRTC.
    Crtc,
    /// A plane.
    Plane,
}

/// One property as enumerated on an object: driver id, stable name,
/// current value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Driver-assigned id.
    pub id: PropertyId,
    /// Stable human-readable name.
    pub name: String,
    /// Value at enumeration time.
    pub value: u64,
}

/// A connector as enumerated from the kernel.
#[derive(Clone, Debug)]
pub struct ConnectorDesc {
    /// Object id.
    pub id: ConnectorId,
    /// Encoders this connector can feed.
    pub encoders: Vec<EncoderId>,
    /// Supported modes, kernel order.
    pub modes: Vec<Mode>,
    /// A display is attached.
    pub connected: bool,
    /// Interface name, e.g. `HDMI-A`.
    pub interface: String,
}

/// An encoder as enumerated from the kernel.
#[derive(Clone, Debug)]
pub struct EncoderDesc {
    /// Object id.
    pub id: EncoderId,
    /// CRTCs this encoder can be driven by.
    pub compatible_crtcs: Vec<CrtcId>,
}

/// A CRTC as enumerated from the kernel.
#[derive(Clone, Copy, Debug)]
pub struct CrtcDesc {
    /// Object id.
    pub id: CrtcId,
}

/// Scan-out role of a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    /// The base scan-out plane of a CRTC.
    Primary,
    /// Composited above the primary.
    Overlay,
    /// Hardware cursor.
    Cursor,
}

/// A plane as enumerated from the kernel.
#[derive(Clone, Debug)]
pub struct PlaneDesc {
    /// Object id.
    pub id: PlaneId,
    /// CRTCs this plane can scan out on.
    pub compatible_crtcs: Vec<CrtcId>,
    /// Scan-out role, from the plane's `type` property.
    pub kind: PlaneKind,
}

/// One queued property write: `(object, property, value)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyUpdate {
    /// Addressed object.
    pub object: u32,
    /// Object kind, for handle typing at the ioctl boundary.
    pub kind: ObjectKind,
    /// Property id on that object.
    pub property: PropertyId,
    /// Raw 64-bit value.
    pub value: u64,
}

bitflags! {
    /// Flags for one atomic commit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CommitFlags: u32 {
        /// The commit may perform a full mode set.
        const ALLOW_MODESET = 1 << 0;
        /// Request an asynchronous page-flip completion event.
        const PAGE_FLIP_EVENT = 1 << 1;
        /// Do not block in the kernel waiting for the flip.
        const NONBLOCK = 1 << 2;
    }
}

/// An asynchronous completion event read from the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    /// A page flip completed; the new buffer is being scanned out.
    PageFlip {
        /// CRTC the flip happened on.
        crtc: CrtcId,
        /// When scan-out of the new buffer began.
        timestamp: TimePoint,
    },
    /// A vertical-blank event not tied to a flip.
    Vblank {
        /// CRTC the vblank occurred on.
        crtc: CrtcId,
        /// Vblank timestamp.
        timestamp: TimePoint,
    },
}

/// The kernel mode-setting operations the runtime needs.
///
/// All methods take `&self`; the single presentation thread is the only
/// caller of mutating operations, and implementations that buffer state
/// (fakes) use interior mutability.
pub trait KmsDevice {
    /// Enables the atomic and universal-planes client capabilities.
    ///
    /// Both are hard requirements; failure means the device cannot host a
    /// session at all.
    fn enable_capabilities(&self) -> Result<(), KmsError>;

    /// Enumerates connectors, kernel order.
    fn connectors(&self) -> Result<Vec<ConnectorDesc>, KmsError>;

    /// Enumerates encoders, kernel order.
    fn encoders(&self) -> Result<Vec<EncoderDesc>, KmsError>;

    /// Enumerates CRTCs, kernel order.
    fn crtcs(&self) -> Result<Vec<CrtcDesc>, KmsError>;

    /// Enumerates planes, kernel order.
    fn planes(&self) -> Result<Vec<PlaneDesc>, KmsError>;

    /// Reads the full property table of one object.
    fn object_properties(
        &self,
        object: u32,
        kind: ObjectKind,
    ) -> Result<Vec<PropertyDescriptor>, KmsError>;

    /// Uploads `mode` (which must be one of `connector`'s modes) as a
    /// kernel property blob.
    fn create_mode_blob(&self, connector: ConnectorId, mode: &Mode) -> Result<BlobId, KmsError>;

    /// Destroys a previously created property blob.
    fn destroy_blob(&self, blob: BlobId) -> Result<(), KmsError>;

    /// Creates a framebuffer object for a buffer with the given layout.
    fn create_framebuffer(&self, layout: &BufferLayout) -> Result<FramebufferId, KmsError>;

    /// Destroys a framebuffer object.
    fn destroy_framebuffer(&self, fb: FramebufferId) -> Result<(), KmsError>;

    /// Applies all `updates` in one atomic operation — every write lands
    /// or none does.
    fn atomic_commit(
        &self,
        flags: CommitFlags,
        updates: &[PropertyUpdate],
    ) -> Result<(), KmsError>;

    /// Drains any ready completion events without blocking.
    fn drain_events(&self) -> Result<Vec<DisplayEvent>, KmsError>;

    /// The fd to poll for event readiness, when the device has one.
    fn event_fd(&self) -> Option<BorrowedFd<'_>>;
}
