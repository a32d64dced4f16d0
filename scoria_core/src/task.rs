// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The task sum type and the outbound engine contract.
//!
//! Every unit of work crossing into the presentation thread is one
//! [`Task`] variant — a closed set matched exhaustively, so a dispatch
//! site can never read the wrong payload for a kind. Producers submit
//! tasks through [`TaskQueue`](crate::queue::TaskQueue); the presentation
//! loop dispatches most of them straight to the host engine through
//! [`EngineCallbacks`].

use core::fmt;
use std::sync::Arc;

use crate::buffer::{BufferId, ScanoutBuffer};
use crate::pointer::PointerSample;
use crate::time::TimePoint;

/// Opaque continuation token a frame producer attaches to a submission and
/// receives back when that frame is confirmed on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Baton(pub i64);

/// Identifies an engine-registered external texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub i64);

/// Handle correlating a platform-message response with its request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResponseHandle(pub u64);

/// Opaque deferred unit of work owned by the engine; the runtime only
/// carries it to the presentation thread and hands it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EngineTask(pub u64);

/// Physical orientation of the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// Natural portrait.
    #[default]
    PortraitUp,
    /// Rotated a quarter turn counter-clockwise from portrait.
    LandscapeLeft,
    /// Upside down.
    PortraitDown,
    /// Rotated a quarter turn clockwise from portrait.
    LandscapeRight,
}

impl Orientation {
    /// Clockwise rotation in degrees relative to [`Orientation::PortraitUp`].
    #[must_use]
    pub const fn angle(self) -> u16 {
        match self {
            Self::PortraitUp => 0,
            Self::LandscapeLeft => 90,
            Self::PortraitDown => 180,
            Self::LandscapeRight => 270,
        }
    }
}

/// A frame the engine wants shown: the buffer to scan out and the baton to
/// return once the flip for it is confirmed.
#[derive(Clone)]
pub struct FrameSubmission {
    /// The rendered buffer.
    pub buffer: Arc<dyn ScanoutBuffer>,
    /// Returned through [`EngineCallbacks::frame_presented`].
    pub baton: Baton,
}

impl fmt::Debug for FrameSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSubmission")
            .field("buffer", &self.buffer.identity())
            .field("baton", &self.baton)
            .finish()
    }
}

/// A producer-supplied callback run on the presentation thread.
pub type TaskFn = Box<dyn FnOnce() + Send>;

/// One unit of cross-thread work.
///
/// Delivered to the single consumer in non-decreasing target-time order
/// with FIFO tie-break; see [`TaskQueue`](crate::queue::TaskQueue).
pub enum Task {
    /// The engine asks when the next vblank will be serviced.
    VblankRequest {
        /// Token to return with the reply.
        baton: Baton,
    },
    /// A vblank (or page-flip) timestamp traveling back to the engine
    /// through the ordered channel.
    VblankReply {
        /// When scan-out of the frame began.
        timestamp: TimePoint,
        /// Token from the originating request or submission.
        baton: Baton,
    },
    /// The display orientation changed.
    OrientationUpdate(Orientation),
    /// A platform message bound for the engine.
    PlatformMessage {
        /// Channel name.
        channel: String,
        /// Message payload, owned.
        payload: Vec<u8>,
        /// Present when the sender expects a response.
        response: Option<ResponseHandle>,
    },
    /// A response to an earlier engine-originated platform message.
    MessageResponse {
        /// Handle from the original message.
        handle: ResponseHandle,
        /// Response payload, owned.
        payload: Vec<u8>,
    },
    /// Producer-supplied callback, run on the presentation thread.
    Callback(TaskFn),
    /// Register an external texture with the engine.
    RegisterTexture(TextureId),
    /// Unregister an external texture.
    UnregisterTexture(TextureId),
    /// A new frame is available on an external texture.
    TextureFrameAvailable(TextureId),
    /// An engine-owned deferred unit of work, handed back on dispatch.
    EngineTask(EngineTask),
    /// A rendered frame to scan out.
    SubmitFrame(FrameSubmission),
    /// The renderer destroyed a buffer for good; scan-out state tied to
    /// its identity can be torn down.
    RetireBuffer(BufferId),
    /// Normalized pointer samples from one input poll.
    PointerBatch(Vec<PointerSample>),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VblankRequest { baton } => {
                f.debug_struct("VblankRequest").field("baton", baton).finish()
            }
            Self::VblankReply { timestamp, baton } => f
                .debug_struct("VblankReply")
                .field("timestamp", timestamp)
                .field("baton", baton)
                .finish(),
            Self::OrientationUpdate(orientation) => {
                f.debug_tuple("OrientationUpdate").field(orientation).finish()
            }
            Self::PlatformMessage {
                channel, response, ..
            } => f
                .debug_struct("PlatformMessage")
                .field("channel", channel)
                .field("response", response)
                .finish(),
            Self::MessageResponse { handle, .. } => {
                f.debug_struct("MessageResponse").field("handle", handle).finish()
            }
            Self::Callback(_) => f.write_str("Callback"),
            Self::RegisterTexture(id) => f.debug_tuple("RegisterTexture").field(id).finish(),
            Self::UnregisterTexture(id) => f.debug_tuple("UnregisterTexture").field(id).finish(),
            Self::TextureFrameAvailable(id) => {
                f.debug_tuple("TextureFrameAvailable").field(id).finish()
            }
            Self::EngineTask(task) => f.debug_tuple("EngineTask").field(task).finish(),
            Self::SubmitFrame(submission) => f.debug_tuple("SubmitFrame").field(submission).finish(),
            Self::RetireBuffer(buffer) => f.debug_tuple("RetireBuffer").field(buffer).finish(),
            Self::PointerBatch(samples) => {
                f.debug_tuple("PointerBatch").field(&samples.len()).finish()
            }
        }
    }
}

/// Outbound callbacks from the presentation thread to the host engine.
///
/// The presentation loop is generic over this trait; tests use recording
/// doubles. All methods run on the presentation thread.
pub trait EngineCallbacks {
    /// A submitted frame is confirmed on screen; `timestamp` is when its
    /// scan-out began.
    fn frame_presented(&mut self, baton: Baton, timestamp: TimePoint);

    /// A platform message arrived for the engine.
    fn message_received(&mut self, channel: &str, payload: &[u8], response: Option<ResponseHandle>);

    /// A response to an engine-originated message arrived.
    fn message_response(&mut self, handle: ResponseHandle, payload: &[u8]);

    /// The display orientation changed.
    fn orientation_changed(&mut self, orientation: Orientation);

    /// Run an engine-owned deferred task.
    fn run_engine_task(&mut self, task: EngineTask);

    /// An external texture was registered.
    fn texture_registered(&mut self, id: TextureId) {
        let _ = id;
    }

    /// An external texture was unregistered.
    fn texture_unregistered(&mut self, id: TextureId) {
        let _ = id;
    }

    /// A new frame is available on an external texture.
    fn texture_frame_available(&mut self, id: TextureId) {
        let _ = id;
    }

    /// Normalized pointer samples from one input poll.
    fn pointer_events(&mut self, samples: &[PointerSample]) {
        let _ = samples;
    }

    /// A previously scanned-out buffer is no longer referenced by the
    /// display pipeline and may be reused by the renderer.
    fn buffer_released(&mut self, buffer: &Arc<dyn ScanoutBuffer>) {
        let _ = buffer;
    }
}
