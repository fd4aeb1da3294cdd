//! Gamepad state tracking and per-frame polling.
//!
//! The platform layer reports raw axis and button snapshots into a fixed
//! array of joystick slots. Axes are zeroed against the values captured when
//! the stick attached (cheap drift calibration), reported as deltas with a
//! dead zone; buttons are edge-detected against the previous frame's
//! bitmask.

use crate::bus::{Bus, InputEvent, MessageSource, SourceKind};
use log::*;

pub const NR_JOYS: usize = 4;
pub const JOY_THINGS_MAX: usize = 64;
pub const DEAD_ZONE: f64 = 0.2;

// DualShock-style mapping.
const AXIS_LX: usize = 0;
const AXIS_LY: usize = 1;
const AXIS_LT: usize = 2;
const AXIS_RX: usize = 3;
const AXIS_RY: usize = 4;
const AXIS_RT: usize = 5;

const BTN_B: usize = 0;
const BTN_A: usize = 1;
const BTN_X: usize = 2;
const BTN_Y: usize = 3;
const BTN_LB: usize = 4;
const BTN_RB: usize = 5;
const BTN_MINUS: usize = 8;
const BTN_PLUS: usize = 9;
const BTN_HOME: usize = 10;
const BTN_STICKL: usize = 11;
const BTN_STICKR: usize = 12;
const BTN_UP: usize = 13;
const BTN_RIGHT: usize = 14;
const BTN_DOWN: usize = 15;
const BTN_LEFT: usize = 16;

/// State transition of one button between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Press,
    Hold,
    Release,
    None,
}

impl ButtonEdge {
    fn derive(was: bool, is: bool) -> Self {
        match (was, is) {
            (false, true) => ButtonEdge::Press,
            (true, true) => ButtonEdge::Hold,
            (true, false) => ButtonEdge::Release,
            (false, false) => ButtonEdge::None,
        }
    }

    pub fn active(self) -> bool {
        matches!(self, ButtonEdge::Press | ButtonEdge::Hold)
    }
}

struct Joystick {
    name: String,
    axes: Vec<f64>,
    /// Per-axis zero captured when the device attached.
    axes_init: Vec<f64>,
    buttons: Vec<bool>,
    /// Previous poll's button bitmask, for edge detection.
    button_state: u64,
    source: MessageSource,
}

impl Joystick {
    fn empty(slot: usize) -> Self {
        Self {
            name: String::new(),
            axes: Vec::new(),
            axes_init: Vec::new(),
            buttons: Vec::new(),
            button_state: 0,
            source: MessageSource {
                kind: SourceKind::Joystick,
                name: format!("joystick{slot}"),
                desc: "gamepad",
            },
        }
    }

    fn present(&self) -> bool {
        !self.name.is_empty()
    }

    fn axis_delta(&self, axis: usize) -> f64 {
        let value = self.axes.get(axis).copied().unwrap_or(0.0)
            - self.axes_init.get(axis).copied().unwrap_or(0.0);
        if value.abs() < DEAD_ZONE {
            0.0
        } else {
            value
        }
    }
}

pub struct JoystickSet {
    joys: Vec<Joystick>,
}

impl Default for JoystickSet {
    fn default() -> Self {
        Self::new()
    }
}

impl JoystickSet {
    pub fn new() -> Self {
        Self {
            joys: (0..NR_JOYS).map(Joystick::empty).collect(),
        }
    }

    /// Attaches, renames or detaches (empty name) a joystick slot.
    pub fn name_update(&mut self, slot: usize, name: Option<&str>) {
        let Some(joy) = self.joys.get_mut(slot) else {
            return;
        };
        let name = name.unwrap_or("");

        // same name, assuming same joystick
        if joy.name == name {
            return;
        }

        debug!("joystick{slot}: '{name}'");
        joy.name = name.to_string();
        joy.axes.clear();
        joy.axes_init.clear();
        joy.buttons.clear();
        joy.button_state = 0;
    }

    /// Reports an axis snapshot. The first report after attach becomes the
    /// per-axis zero.
    pub fn axes_update(&mut self, slot: usize, axes: &[f64]) {
        let Some(joy) = self.joys.get_mut(slot) else {
            return;
        };
        if !joy.present() {
            return;
        }
        let axes = &axes[..axes.len().min(JOY_THINGS_MAX)];

        if joy.axes_init.is_empty() {
            joy.axes_init = axes.to_vec();
        }
        joy.axes = axes.to_vec();
    }

    pub fn buttons_update(&mut self, slot: usize, buttons: &[bool]) {
        let Some(joy) = self.joys.get_mut(slot) else {
            return;
        };
        if !joy.present() {
            return;
        }
        joy.buttons = buttons[..buttons.len().min(JOY_THINGS_MAX)].to_vec();
    }

    pub fn present(&self, slot: usize) -> bool {
        self.joys.get(slot).is_some_and(Joystick::present)
    }

    /// Turns each attached joystick's current state into at most one input
    /// event on the bus.
    pub fn poll(&mut self, bus: &Bus) {
        for joy in self.joys.iter_mut() {
            if !joy.present() {
                continue;
            }

            let mut event = InputEvent::default();
            let mut active = 0usize;

            for (axis, value) in [
                (AXIS_LX, &mut event.delta_lx),
                (AXIS_LY, &mut event.delta_ly),
                (AXIS_RX, &mut event.delta_rx),
                (AXIS_RY, &mut event.delta_ry),
                (AXIS_LT, &mut event.trigger_l),
                (AXIS_RT, &mut event.trigger_r),
            ] {
                let delta = joy.axis_delta(axis);
                if delta != 0.0 {
                    *value = delta as f32;
                    active += 1;
                }
            }
            if event.delta_rx > 0.0 {
                event.yaw_right = true;
            } else if event.delta_rx < 0.0 {
                event.yaw_left = true;
            }

            let mut state = 0u64;
            for (bit, held) in [
                (BTN_LEFT, &mut event.left),
                (BTN_RIGHT, &mut event.right),
                (BTN_UP, &mut event.up),
                (BTN_DOWN, &mut event.down),
                (BTN_A, &mut event.pad_a),
                (BTN_B, &mut event.pad_b),
                (BTN_X, &mut event.pad_x),
                (BTN_Y, &mut event.pad_y),
                (BTN_LB, &mut event.pad_lb),
                (BTN_RB, &mut event.pad_rb),
                (BTN_MINUS, &mut event.pad_min),
                (BTN_PLUS, &mut event.pad_plus),
                (BTN_HOME, &mut event.pad_home),
                (BTN_STICKL, &mut event.stick_l),
                (BTN_STICKR, &mut event.stick_r),
            ] {
                let down = joy.buttons.get(bit).copied().unwrap_or(false);
                let was = joy.button_state & (1 << bit) != 0;
                let edge = ButtonEdge::derive(was, down);
                if down {
                    state |= 1 << bit;
                }
                if edge.active() {
                    *held = true;
                    active += 1;
                }
            }
            joy.button_state = state;

            if active > 0 {
                crate::input::send_input(bus, event, Some(joy.source.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Flow, Payload, Topic};
    use std::{cell::RefCell, rc::Rc};

    fn event_collector(bus: &Bus) -> Rc<RefCell<Vec<InputEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Topic::Input, move |message| {
            if let Payload::Input(event) = &message.payload {
                sink.borrow_mut().push(*event);
            }
            Flow::Handled
        });
        seen
    }

    #[test]
    fn axes_zeroed_at_attach_with_dead_zone() {
        let bus = Bus::new();
        let seen = event_collector(&bus);
        let mut joys = JoystickSet::new();

        joys.name_update(0, Some("pad"));
        // attach-time drift of 0.1 becomes the zero
        joys.axes_update(0, &[0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
        joys.poll(&bus);
        assert!(seen.borrow().is_empty());

        // 0.25 off-zero on the same axis is under the 0.2 dead zone once
        // the 0.1 drift is subtracted
        joys.axes_update(0, &[0.25, 0.0, 0.0, 0.0, 0.0, 0.0]);
        joys.poll(&bus);
        assert!(seen.borrow().is_empty());

        joys.axes_update(0, &[0.9, 0.0, 0.0, 0.0, 0.0, 0.0]);
        joys.poll(&bus);
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert!((events[0].delta_lx - 0.8).abs() < 1e-6);
    }

    #[test]
    fn button_edges_press_hold_release() {
        let bus = Bus::new();
        let seen = event_collector(&bus);
        let mut joys = JoystickSet::new();
        joys.name_update(0, Some("pad"));

        let mut buttons = vec![false; 17];
        buttons[BTN_UP] = true;
        joys.buttons_update(0, &buttons);
        joys.poll(&bus); // press
        joys.poll(&bus); // hold
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow().iter().all(|e| e.up));

        buttons[BTN_UP] = false;
        joys.buttons_update(0, &buttons);
        joys.poll(&bus); // release: not an active edge, no event
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn absent_slots_are_silent() {
        let bus = Bus::new();
        let seen = event_collector(&bus);
        let mut joys = JoystickSet::new();
        joys.axes_update(0, &[1.0; 6]);
        joys.poll(&bus);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn right_stick_produces_yaw() {
        let bus = Bus::new();
        let seen = event_collector(&bus);
        let mut joys = JoystickSet::new();
        joys.name_update(0, Some("pad"));
        joys.axes_update(0, &[0.0; 6]);

        let mut axes = [0.0; 6];
        axes[AXIS_RX] = -0.7;
        joys.axes_update(0, &axes);
        joys.poll(&bus);

        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert!(events[0].yaw_left);
        assert!(!events[0].yaw_right);
    }
}
