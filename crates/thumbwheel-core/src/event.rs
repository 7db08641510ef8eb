//! Pointer event model and the decoder for raw Linux `input_event` records
//!
//! Only button presses/releases and relative X/Y motion survive decoding.
//! Sync reports, wheel axes, key auto-repeat and unknown button codes are
//! dropped here and never reach the coordinator.

use std::fmt;
use std::mem::size_of;

use bytes::Buf;

use crate::click::ScrollDirection;

const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;

const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;

const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;
const BTN_SIDE: u16 = 0x113;
const BTN_EXTRA: u16 = 0x114;

const TIMEVAL_SIZE: usize = size_of::<libc::timeval>();

/// Size of one `struct input_event` on this platform
pub const RECORD_SIZE: usize = TIMEVAL_SIZE + 2 + 2 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Move,
    ButtonDown,
    ButtonUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    None,
    Left,
    Right,
    Middle,
    ThumbDown,
    ThumbUp,
}

impl Button {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            BTN_LEFT => Some(Button::Left),
            BTN_RIGHT => Some(Button::Right),
            BTN_MIDDLE => Some(Button::Middle),
            BTN_SIDE => Some(Button::ThumbDown),
            BTN_EXTRA => Some(Button::ThumbUp),
            _ => None,
        }
    }

    /// Thumb buttons are the only ones that start or end a scroll session
    pub fn is_thumb(self) -> bool {
        matches!(self, Button::ThumbDown | Button::ThumbUp)
    }

    pub fn direction(self) -> Option<ScrollDirection> {
        match self {
            Button::ThumbUp => Some(ScrollDirection::Up),
            Button::ThumbDown => Some(ScrollDirection::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::None => "-",
            Button::Left => "left",
            Button::Right => "right",
            Button::Middle => "middle",
            Button::ThumbDown => "thumbdown",
            Button::ThumbUp => "thumbup",
        };
        f.write_str(name)
    }
}

/// A decoded pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: EventKind,
    /// Meaningful only for button events
    pub button: Button,
    /// Meaningful only for moves
    pub dx: i8,
    pub dy: i8,
}

impl PointerEvent {
    pub fn moved(dx: i8, dy: i8) -> Self {
        Self {
            kind: EventKind::Move,
            button: Button::None,
            dx,
            dy,
        }
    }

    pub fn down(button: Button) -> Self {
        Self {
            kind: EventKind::ButtonDown,
            button,
            dx: 0,
            dy: 0,
        }
    }

    pub fn up(button: Button) -> Self {
        Self {
            kind: EventKind::ButtonUp,
            button,
            dx: 0,
            dy: 0,
        }
    }

    pub fn is_move(&self) -> bool {
        self.kind == EventKind::Move
    }
}

impl fmt::Display for PointerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Move => write!(f, "mousemove dx={} dy={}", self.dx, self.dy),
            EventKind::ButtonDown => write!(f, "mousedown {}", self.button),
            EventKind::ButtonUp => write!(f, "mouseup {}", self.button),
        }
    }
}

/// Decode one raw `input_event` record
///
/// Returns `None` for records that carry nothing the coordinator acts on,
/// including truncated ones.
pub fn decode(record: &[u8]) -> Option<PointerEvent> {
    if record.len() < RECORD_SIZE {
        return None;
    }

    let mut buf = &record[TIMEVAL_SIZE..RECORD_SIZE];
    let ev_type = buf.get_u16_ne();
    let code = buf.get_u16_ne();
    let value = buf.get_i32_ne();

    match ev_type {
        EV_KEY => {
            let button = Button::from_code(code)?;
            match value {
                1 => Some(PointerEvent::down(button)),
                0 => Some(PointerEvent::up(button)),
                // auto-repeat
                _ => None,
            }
        }
        EV_REL => {
            let delta = value.clamp(i8::MIN as i32, i8::MAX as i32) as i8;
            match code {
                REL_X => Some(PointerEvent::moved(delta, 0)),
                REL_Y => Some(PointerEvent::moved(0, delta)),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn encode_record(ev_type: u16, code: u16, value: i32) -> Vec<u8> {
    let mut record = vec![0u8; TIMEVAL_SIZE];
    record.extend_from_slice(&ev_type.to_ne_bytes());
    record.extend_from_slice(&code.to_ne_bytes());
    record.extend_from_slice(&value.to_ne_bytes());
    record
}
