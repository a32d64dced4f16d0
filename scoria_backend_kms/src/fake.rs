// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory [`KmsDevice`] and scan-out buffer doubles for tests.
//!
//! [`FakeDevice`] models a minimal single-output pipeline (one connector,
//! one encoder, one CRTC, one primary plane) with realistic property
//! tables, records every atomic commit, and signals page-flip completions
//! through a real eventfd so the queue's poll integration is exercised
//! end to end.

use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;

use rustix::event::{EventfdFlags, eventfd};
use scoria_core::buffer::{BufferId, BufferLayout, BufferPlane, ScanoutBuffer};
use scoria_core::time::TimePoint;

use crate::device::{
    BlobId, CommitFlags, ConnectorDesc, ConnectorId, CrtcDesc, CrtcId, DisplayEvent, EncoderDesc,
    EncoderId, FramebufferId, KmsDevice, Mode, ObjectKind, PlaneDesc, PlaneId, PlaneKind,
    PropertyDescriptor, PropertyId, PropertyUpdate,
};
use crate::error::KmsError;

/// One atomic commit as observed by the fake.
#[derive(Clone, Debug)]
pub struct RecordedCommit {
    pub flags: CommitFlags,
    pub updates: Vec<PropertyUpdate>,
    pub rejected: bool,
}

#[derive(Debug, Default)]
struct State {
    capabilities_enabled: bool,
    commits: Vec<RecordedCommit>,
    reject_next_commit: bool,
    blobs_created: u64,
    destroyed_blobs: Vec<BlobId>,
    framebuffers_created: u32,
    destroyed_framebuffers: Vec<FramebufferId>,
    pending_events: Vec<DisplayEvent>,
}

/// Scriptable single-output device.
#[derive(Debug)]
pub struct FakeDevice {
    state: Mutex<State>,
    wake: OwnedFd,
}

impl FakeDevice {
    pub const CONNECTOR: u32 = 1;
    pub const ENCODER: u32 = 2;
    pub const CRTC: u32 = 3;
    pub const PLANE: u32 = 4;

    pub fn new() -> Self {
        let wake = eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK)
            .unwrap_or_else(|e| panic!("eventfd: {e}"));
        Self {
            state: Mutex::new(State::default()),
            wake,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capabilities_enabled(&self) -> bool {
        self.lock().capabilities_enabled
    }

    /// Every commit attempted so far, rejected ones included.
    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.lock().commits.clone()
    }

    /// Makes the next atomic commit fail with [`KmsError::CommitRejected`].
    pub fn reject_next_commit(&self) {
        self.lock().reject_next_commit = true;
    }

    pub fn framebuffers_created(&self) -> u32 {
        self.lock().framebuffers_created
    }

    pub fn destroyed_framebuffers(&self) -> Vec<FramebufferId> {
        self.lock().destroyed_framebuffers.clone()
    }

    pub fn destroyed_blobs(&self) -> Vec<BlobId> {
        self.lock().destroyed_blobs.clone()
    }

    /// Queues a page-flip completion on the CRTC and makes the event fd
    /// readable, as the kernel would after scan-out switches buffers.
    pub fn signal_flip(&self, timestamp: TimePoint) {
        self.lock().pending_events.push(DisplayEvent::PageFlip {
            crtc: CrtcId(Self::CRTC),
            timestamp,
        });
        let _ = rustix::io::write(&self.wake, &1_u64.to_ne_bytes());
    }

    fn modes() -> Vec<Mode> {
        vec![
            Mode {
                name: "1920x1080".to_owned(),
                width: 1920,
                height: 1080,
                refresh_hz: 60,
                preferred: true,
            },
            Mode {
                name: "1280x720".to_owned(),
                width: 1280,
                height: 720,
                refresh_hz: 60,
                preferred: false,
            },
        ]
    }
}

fn descriptor(id: u32, name: &str) -> PropertyDescriptor {
    PropertyDescriptor {
        id: PropertyId(id),
        name: name.to_owned(),
        value: 0,
    }
}

impl KmsDevice for FakeDevice {
    fn enable_capabilities(&self) -> Result<(), KmsError> {
        self.lock().capabilities_enabled = true;
        Ok(())
    }

    fn connectors(&self) -> Result<Vec<ConnectorDesc>, KmsError> {
        Ok(vec![ConnectorDesc {
            id: ConnectorId(Self::CONNECTOR),
            encoders: vec![EncoderId(Self::ENCODER)],
            modes: Self::modes(),
            connected: true,
            interface: "HDMIA".to_owned(),
        }])
    }

    fn encoders(&self) -> Result<Vec<EncoderDesc>, KmsError> {
        Ok(vec![EncoderDesc {
            id: EncoderId(Self::ENCODER),
            compatible_crtcs: vec![CrtcId(Self::CRTC)],
        }])
    }

    fn crtcs(&self) -> Result<Vec<CrtcDesc>, KmsError> {
        Ok(vec![CrtcDesc {
            id: CrtcId(Self::CRTC),
        }])
    }

    fn planes(&self) -> Result<Vec<PlaneDesc>, KmsError> {
        Ok(vec![PlaneDesc {
            id: PlaneId(Self::PLANE),
            compatible_crtcs: vec![CrtcId(Self::CRTC)],
            kind: PlaneKind::Primary,
        }])
    }

    fn object_properties(
        &self,
        object: u32,
        _kind: ObjectKind,
    ) -> Result<Vec<PropertyDescriptor>, KmsError> {
        Ok(match object {
            Self::CONNECTOR => vec![descriptor(100, "CRTC_ID")],
            Self::CRTC => vec![descriptor(200, "MODE_ID"), descriptor(201, "ACTIVE")],
            Self::PLANE => vec![
                descriptor(300, "FB_ID"),
                descriptor(301, "CRTC_ID"),
                descriptor(302, "SRC_X"),
                descriptor(303, "SRC_Y"),
                descriptor(304, "SRC_W"),
                descriptor(305, "SRC_H"),
                descriptor(306, "CRTC_X"),
                descriptor(307, "CRTC_Y"),
                descriptor(308, "CRTC_W"),
                descriptor(309, "CRTC_H"),
                descriptor(310, "type"),
            ],
            _ => {
                return Err(KmsError::Configuration(format!(
                    "no fake object with id {object}"
                )));
            }
        })
    }

    fn create_mode_blob(&self, _connector: ConnectorId, _mode: &Mode) -> Result<BlobId, KmsError> {
        let mut state = self.lock();
        state.blobs_created += 1;
        Ok(BlobId(1000 + state.blobs_created))
    }

    fn destroy_blob(&self, blob: BlobId) -> Result<(), KmsError> {
        self.lock().destroyed_blobs.push(blob);
        Ok(())
    }

    fn create_framebuffer(&self, _layout: &BufferLayout) -> Result<FramebufferId, KmsError> {
        let mut state = self.lock();
        state.framebuffers_created += 1;
        Ok(FramebufferId(500 + state.framebuffers_created))
    }

    fn destroy_framebuffer(&self, fb: FramebufferId) -> Result<(), KmsError> {
        self.lock().destroyed_framebuffers.push(fb);
        Ok(())
    }

    fn atomic_commit(
        &self,
        flags: CommitFlags,
        updates: &[PropertyUpdate],
    ) -> Result<(), KmsError> {
        let mut state = self.lock();
        let rejected = std::mem::take(&mut state.reject_next_commit);
        state.commits.push(RecordedCommit {
            flags,
            updates: updates.to_vec(),
            rejected,
        });
        if rejected {
            Err(KmsError::CommitRejected(io::Error::other(
                "scripted rejection",
            )))
        } else {
            Ok(())
        }
    }

    fn drain_events(&self) -> Result<Vec<DisplayEvent>, KmsError> {
        let mut buf = [0_u8; 8];
        let _ = rustix::io::read(&self.wake, &mut buf);
        Ok(std::mem::take(&mut self.lock().pending_events))
    }

    fn event_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.wake.as_fd())
    }
}

/// A scan-out buffer with a fixed identity and a plausible layout.
#[derive(Debug)]
pub struct TestBuffer {
    id: BufferId,
}

impl TestBuffer {
    pub fn new(id: u64) -> Self {
        Self { id: BufferId(id) }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }
}

impl ScanoutBuffer for TestBuffer {
    fn identity(&self) -> BufferId {
        self.id
    }

    fn layout(&self) -> BufferLayout {
        BufferLayout {
            width: 1920,
            height: 1080,
            // 'XR24': XRGB8888.
            fourcc: 0x3432_5258,
            modifier: None,
            planes: vec![BufferPlane {
                handle: 17,
                pitch: 1920 * 4,
                offset: 0,
            }],
        }
    }
}
