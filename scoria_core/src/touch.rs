// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multitouch slot tracking and device classification.
//!
//! A multitouch device reports up to N simultaneous contacts, each tagged
//! with a kernel tracking id. [`TouchTracker`] owns N slots and turns raw
//! per-slot reports into [`PointerSample`]s with the correct phase grammar:
//!
//! ```text
//! Add → (Hover | Down) → Move* → Up → Remove
//! ```
//!
//! The ordering rule that matters most: when a tracking id vanishes, its
//! slot emits `Up` then `Remove` before it may carry a new id. Skipping
//! that hand-off is the classic way to leak a phantom contact into the
//! engine.
//!
//! An input thread turns each device poll into samples and posts them to
//! the presentation thread as one batch:
//!
//! ```
//! use scoria_core::queue::TaskQueue;
//! use scoria_core::task::Task;
//! use scoria_core::time;
//! use scoria_core::touch::{SlotReport, TouchTracker};
//!
//! let queue = TaskQueue::new()?;
//! let mut tracker = TouchTracker::new(10, 1);
//! let samples = tracker.advance(
//!     &[SlotReport { slot: 0, tracking_id: Some(5), x: 120.0, y: 80.0, touching: true }],
//!     time::now(),
//! );
//! queue.post(Task::PointerBatch(samples));
//! # Ok::<(), std::io::Error>(())
//! ```

use crate::pointer::{PointerButtons, PointerKind, PointerPhase, PointerSample};
use crate::time::TimePoint;

/// What a pointing device is, derived from its capability bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Relative device driving the shared cursor.
    Mouse,
    /// Indirect touch device; also drives the shared cursor.
    Touchpad,
    /// Direct touch device with per-contact pointers.
    Touchscreen,
}

/// Capability bits of an input device, read once at open time.
///
/// Replaces per-event bitmap probing: the device layer fills this from the
/// evdev capability ioctls and classification is a plain lookup from then
/// on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Reports `EV_REL` relative axes.
    pub relative_axes: bool,
    /// Reports `ABS_MT_*` multitouch axes.
    pub multitouch: bool,
    /// Reports plain `EV_ABS` axes.
    pub absolute_axes: bool,
    /// Has the `BTN_TOUCH` contact bit.
    pub touch_button: bool,
    /// Contacts map directly onto the display (touchscreen, not touchpad).
    pub direct: bool,
    /// Maximum simultaneous contacts; 1 for plain pointer devices.
    pub max_contacts: usize,
}

/// Classifies a device from its capabilities.
#[must_use]
pub const fn classify_device(caps: &DeviceCaps) -> DeviceClass {
    if caps.multitouch {
        if caps.direct {
            DeviceClass::Touchscreen
        } else {
            DeviceClass::Touchpad
        }
    } else if caps.relative_axes {
        DeviceClass::Mouse
    } else if caps.absolute_axes && caps.touch_button {
        // Single-touch resistive panels: abs axes + BTN_TOUCH, no MT.
        DeviceClass::Touchscreen
    } else {
        DeviceClass::Mouse
    }
}

/// One per-slot observation from an input poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotReport {
    /// Hardware slot index.
    pub slot: usize,
    /// Kernel tracking id currently bound to the slot, `None` when the
    /// contact ended.
    pub tracking_id: Option<i32>,
    /// Horizontal position in output pixels.
    pub x: f64,
    /// Vertical position in output pixels.
    pub y: f64,
    /// `true` when the contact touches the surface (hover-capable devices
    /// may report an id without contact).
    pub touching: bool,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    tracking_id: Option<i32>,
    pointer_id: i32,
    x: f64,
    y: f64,
    down: bool,
}

/// Per-device table of contact slots.
///
/// Slot count is fixed at the hardware maximum. Each slot carries a stable
/// externally-visible pointer id (`id_base + slot index`) that persists
/// across contacts.
#[derive(Clone, Debug)]
pub struct TouchTracker {
    slots: Vec<Slot>,
}

impl TouchTracker {
    /// Creates a tracker with `max_contacts` slots; external pointer ids
    /// start at `id_base`.
    #[must_use]
    pub fn new(max_contacts: usize, id_base: i32) -> Self {
        let slots = (0..max_contacts)
            .map(|index| Slot {
                tracking_id: None,
                pointer_id: id_base + i32::try_from(index).unwrap_or(i32::MAX),
                x: 0.0,
                y: 0.0,
                down: false,
            })
            .collect();
        Self { slots }
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Tracking id currently bound to `slot`, if any.
    #[must_use]
    pub fn tracking_id(&self, slot: usize) -> Option<i32> {
        self.slots.get(slot).and_then(|s| s.tracking_id)
    }

    /// Consumes one poll's slot reports and emits the resulting samples.
    ///
    /// Reports for out-of-range slots are ignored. A tracking-id change
    /// within one report (kernel recycled the id between polls) closes the
    /// old contact before opening the new one.
    pub fn advance(&mut self, reports: &[SlotReport], timestamp: TimePoint) -> Vec<PointerSample> {
        let mut samples = Vec::new();
        for report in reports {
            let Some(slot) = self.slots.get_mut(report.slot) else {
                continue;
            };
            match (slot.tracking_id, report.tracking_id) {
                (None, None) => {}
                (None, Some(id)) => {
                    begin_contact(slot, id, report, timestamp, &mut samples);
                }
                (Some(current), Some(id)) if current == id => {
                    slot.x = report.x;
                    slot.y = report.y;
                    match (slot.down, report.touching) {
                        (false, true) => {
                            slot.down = true;
                            samples.push(slot_sample(slot, PointerPhase::Down, timestamp));
                        }
                        (true, false) => {
                            slot.down = false;
                            samples.push(slot_sample(slot, PointerPhase::Up, timestamp));
                        }
                        (true, true) => {
                            samples.push(slot_sample(slot, PointerPhase::Move, timestamp));
                        }
                        (false, false) => {
                            samples.push(slot_sample(slot, PointerPhase::Hover, timestamp));
                        }
                    }
                }
                (Some(_), Some(id)) => {
                    // Recycled id: the previous contact must finish its
                    // up/remove hand-off before the slot is reused.
                    end_contact(slot, timestamp, &mut samples);
                    begin_contact(slot, id, report, timestamp, &mut samples);
                }
                (Some(_), None) => {
                    end_contact(slot, timestamp, &mut samples);
                }
            }
        }
        samples
    }

    /// Aborts every active contact, emitting `Cancel` then `Remove`.
    ///
    /// Used when the device disappears mid-gesture.
    pub fn cancel_all(&mut self, timestamp: TimePoint) -> Vec<PointerSample> {
        let mut samples = Vec::new();
        for slot in &mut self.slots {
            if slot.tracking_id.is_some() {
                samples.push(slot_sample(slot, PointerPhase::Cancel, timestamp));
                samples.push(slot_sample(slot, PointerPhase::Remove, timestamp));
                slot.tracking_id = None;
                slot.down = false;
            }
        }
        samples
    }
}

fn begin_contact(
    slot: &mut Slot,
    id: i32,
    report: &SlotReport,
    timestamp: TimePoint,
    samples: &mut Vec<PointerSample>,
) {
    slot.tracking_id = Some(id);
    slot.x = report.x;
    slot.y = report.y;
    slot.down = report.touching;
    samples.push(slot_sample(slot, PointerPhase::Add, timestamp));
    let phase = if report.touching {
        PointerPhase::Down
    } else {
        PointerPhase::Hover
    };
    samples.push(slot_sample(slot, phase, timestamp));
}

fn end_contact(slot: &mut Slot, timestamp: TimePoint, samples: &mut Vec<PointerSample>) {
    if slot.down {
        slot.down = false;
        samples.push(slot_sample(slot, PointerPhase::Up, timestamp));
    }
    samples.push(slot_sample(slot, PointerPhase::Remove, timestamp));
    slot.tracking_id = None;
}

fn slot_sample(slot: &Slot, phase: PointerPhase, timestamp: TimePoint) -> PointerSample {
    let buttons = if slot.down {
        PointerButtons::TOUCH
    } else {
        PointerButtons::empty()
    };
    PointerSample {
        kind: PointerKind::Touch,
        pointer_id: slot.pointer_id,
        phase,
        x: slot.x,
        y: slot.y,
        buttons,
        timestamp,
    }
}
