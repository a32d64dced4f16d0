// Copyright 2026 the Scoria Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Normalized pointer model.
//!
//! Raw input devices (mice, touchpads, touchscreens) are reduced to a
//! stream of [`PointerSample`]s: a stable pointer identity, a
//! [`PointerPhase`], a position, and the accumulated button state. The
//! phase grammar per pointer is
//! `Add → (Hover | Down) → Move* → Up → Remove`, with `Cancel` allowed to
//! cut a contact short.
//!
//! All mice and touchpads drive the single shared [`MouseState`] slot;
//! button state is accumulated across devices, last writer wins.

use core::fmt;

use bitflags::bitflags;

use crate::time::TimePoint;

/// Stable pointer identity of the shared mouse slot.
pub const MOUSE_POINTER_ID: i32 = 0;

/// What kind of device produced a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Mouse or touchpad driving the shared cursor.
    Mouse,
    /// Direct-touch contact.
    Touch,
}

/// Lifecycle phase of a pointer sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerPhase {
    /// The pointer became known to the system.
    Add,
    /// In range, no button/contact active.
    Hover,
    /// Contact or primary button went active.
    Down,
    /// Moved while active.
    Move,
    /// Contact or last button went inactive.
    Up,
    /// The pointer left the system; its slot may be reused afterwards.
    Remove,
    /// The contact was aborted without an orderly up.
    Cancel,
}

bitflags! {
    /// Currently pressed pointer buttons, accumulated across devices.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PointerButtons: u16 {
        /// Left / primary.
        const PRIMARY = 1 << 0;
        /// Right / secondary.
        const SECONDARY = 1 << 1;
        /// Middle.
        const MIDDLE = 1 << 2;
        /// Back (thumb).
        const BACK = 1 << 3;
        /// Forward (thumb).
        const FORWARD = 1 << 4;
        /// Synthetic touch-contact bit.
        const TOUCH = 1 << 8;
    }
}

// Linux evdev button codes; see input-event-codes.h.
const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;
const BTN_SIDE: u16 = 0x113;
const BTN_EXTRA: u16 = 0x114;
const BTN_FORWARD: u16 = 0x115;
const BTN_BACK: u16 = 0x116;
const BTN_TOUCH: u16 = 0x14a;

/// Maps an evdev button code to a pointer button, if it is one.
#[must_use]
pub const fn button_from_code(code: u16) -> Option<PointerButtons> {
    match code {
        BTN_LEFT => Some(PointerButtons::PRIMARY),
        BTN_RIGHT => Some(PointerButtons::SECONDARY),
        BTN_MIDDLE => Some(PointerButtons::MIDDLE),
        BTN_SIDE | BTN_BACK => Some(PointerButtons::BACK),
        BTN_EXTRA | BTN_FORWARD => Some(PointerButtons::FORWARD),
        BTN_TOUCH => Some(PointerButtons::TOUCH),
        _ => None,
    }
}

/// One normalized pointer event.
#[derive(Clone, Copy, PartialEq)]
pub struct PointerSample {
    /// Producing device category.
    pub kind: PointerKind,
    /// Stable externally-visible pointer identity.
    pub pointer_id: i32,
    /// Lifecycle phase.
    pub phase: PointerPhase,
    /// Horizontal position in output pixels.
    pub x: f64,
    /// Vertical position in output pixels.
    pub y: f64,
    /// Button state at sample time.
    pub buttons: PointerButtons,
    /// When the sample was produced.
    pub timestamp: TimePoint,
}

impl fmt::Debug for PointerSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PointerSample({:?} #{} {:?} at {:.1},{:.1})",
            self.kind, self.pointer_id, self.phase, self.x, self.y
        )
    }
}

/// The single shared mouse cursor.
///
/// Every mouse and touchpad updates the same instance; whichever device
/// wrote last defines the cursor position and the button mask.
#[derive(Clone, Debug, Default)]
pub struct MouseState {
    x: f64,
    y: f64,
    buttons: PointerButtons,
    announced: bool,
}

impl MouseState {
    /// Creates a cursor at the origin with no buttons pressed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Current accumulated button mask.
    #[must_use]
    pub fn buttons(&self) -> PointerButtons {
        self.buttons
    }

    /// Announces the cursor to the engine; the first caller gets the
    /// `Add` sample, later callers get `None`.
    pub fn announce(&mut self, timestamp: TimePoint) -> Option<PointerSample> {
        if self.announced {
            return None;
        }
        self.announced = true;
        Some(self.sample(PointerPhase::Add, timestamp))
    }

    /// Applies relative motion clamped to `0..=max_x` / `0..=max_y`.
    ///
    /// Phase is `Move` while any button is held, `Hover` otherwise.
    pub fn apply_motion(
        &mut self,
        dx: f64,
        dy: f64,
        max_x: f64,
        max_y: f64,
        timestamp: TimePoint,
    ) -> PointerSample {
        self.x = (self.x + dx).clamp(0.0, max_x);
        self.y = (self.y + dy).clamp(0.0, max_y);
        let phase = if self.buttons.is_empty() {
            PointerPhase::Hover
        } else {
            PointerPhase::Move
        };
        self.sample(phase, timestamp)
    }

    /// Applies one button press or release.
    ///
    /// Phase is `Down` on the empty→pressed transition, `Up` on
    /// pressed→empty, and `Move` for button changes while others remain
    /// held.
    pub fn apply_button(
        &mut self,
        button: PointerButtons,
        pressed: bool,
        timestamp: TimePoint,
    ) -> PointerSample {
        let was_empty = self.buttons.is_empty();
        self.buttons.set(button, pressed);
        let phase = match (was_empty, self.buttons.is_empty()) {
            (true, false) => PointerPhase::Down,
            (false, true) => PointerPhase::Up,
            _ => PointerPhase::Move,
        };
        self.sample(phase, timestamp)
    }

    fn sample(&self, phase: PointerPhase, timestamp: TimePoint) -> PointerSample {
        PointerSample {
            kind: PointerKind::Mouse,
            pointer_id: MOUSE_POINTER_ID,
            phase,
            x: self.x,
            y: self.y,
            buttons: self.buttons,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MouseState, PointerButtons, PointerPhase, button_from_code,
    };
    use crate::time::TimePoint;

    const T: TimePoint = TimePoint(1);

    #[test]
    fn button_codes_map_to_flags() {
        assert_eq!(button_from_code(0x110), Some(PointerButtons::PRIMARY));
        assert_eq!(button_from_code(0x111), Some(PointerButtons::SECONDARY));
        assert_eq!(button_from_code(0x112), Some(PointerButtons::MIDDLE));
        assert_eq!(button_from_code(0x14a), Some(PointerButtons::TOUCH));
        assert_eq!(button_from_code(0x1), None, "KEY_ESC is not a pointer button");
    }

    #[test]
    fn announce_emits_add_exactly_once() {
        let mut mouse = MouseState::new();
        let first = mouse.announce(T);
        assert_eq!(first.map(|s| s.phase), Some(PointerPhase::Add));
        assert_eq!(mouse.announce(T), None, "second announce must be silent");
    }

    #[test]
    fn motion_without_buttons_hovers() {
        let mut mouse = MouseState::new();
        let sample = mouse.apply_motion(10.0, 5.0, 1920.0, 1080.0, T);
        assert_eq!(sample.phase, PointerPhase::Hover);
        assert_eq!((sample.x, sample.y), (10.0, 5.0));
    }

    #[test]
    fn motion_is_clamped_to_output_bounds() {
        let mut mouse = MouseState::new();
        let sample = mouse.apply_motion(-50.0, 5000.0, 1920.0, 1080.0, T);
        assert_eq!((sample.x, sample.y), (0.0, 1080.0));
    }

    #[test]
    fn button_transitions_follow_down_move_up() {
        let mut mouse = MouseState::new();
        let down = mouse.apply_button(PointerButtons::PRIMARY, true, T);
        assert_eq!(down.phase, PointerPhase::Down);

        let chord = mouse.apply_button(PointerButtons::SECONDARY, true, T);
        assert_eq!(chord.phase, PointerPhase::Move, "chord press is not a new down");

        let partial = mouse.apply_button(PointerButtons::PRIMARY, false, T);
        assert_eq!(partial.phase, PointerPhase::Move);

        let up = mouse.apply_button(PointerButtons::SECONDARY, false, T);
        assert_eq!(up.phase, PointerPhase::Up);
        assert!(mouse.buttons().is_empty());
    }

    #[test]
    fn buttons_accumulate_across_writers() {
        // Two devices share the slot; each only touches its own bit.
        let mut mouse = MouseState::new();
        let _ = mouse.apply_button(PointerButtons::PRIMARY, true, T);
        let sample = mouse.apply_button(PointerButtons::MIDDLE, true, T);
        assert_eq!(
            sample.buttons,
            PointerButtons::PRIMARY | PointerButtons::MIDDLE
        );
    }

    #[test]
    fn moving_while_held_reports_move() {
        let mut mouse = MouseState::new();
        let _ = mouse.apply_button(PointerButtons::PRIMARY, true, T);
        let sample = mouse.apply_motion(1.0, 1.0, 100.0, 100.0, T);
        assert_eq!(sample.phase, PointerPhase::Move);
    }
}
