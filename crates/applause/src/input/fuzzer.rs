//! The input fuzzer: synthesizes random events for CI soak runs.
//!
//! Disabled until a `toggle_fuzzer` command arrives. Each enabled frame it
//! either takes a short random pause or emits one event with a handful of
//! random buttons and axes set. Events that would interfere with the soak
//! itself (exit, fullscreen, resize, verbosity) are masked out.

use crate::bus::{
    Bus, CommandFlags, Flow, InputEvent, MessageSource, Payload, SourceKind, Topic,
};
use rand::Rng;
use std::{cell::Cell, rc::Rc};

fn fuzzer_source() -> MessageSource {
    MessageSource {
        kind: SourceKind::Fuzzer,
        name: "fuzzer".into(),
        desc: "random input generator",
    }
}

pub struct Fuzzer {
    enabled: Rc<Cell<bool>>,
    paused: u32,
}

impl Fuzzer {
    pub fn new(bus: &Bus) -> Self {
        let enabled = Rc::new(Cell::new(false));
        let flag = enabled.clone();
        bus.subscribe(Topic::Command, move |message| {
            if let Payload::Command(cmd) = &message.payload {
                if cmd.flags.contains(CommandFlags::TOGGLE_FUZZER) {
                    flag.set(!flag.get());
                }
            }
            Flow::Handled
        });

        Self { enabled, paused: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn step(&mut self, bus: &Bus) {
        self.step_with(bus, &mut rand::thread_rng());
    }

    pub fn step_with(&mut self, bus: &Bus, rng: &mut impl Rng) {
        if !self.enabled.get() {
            return;
        }
        if self.paused > 0 {
            self.paused -= 1;
            return;
        }
        // occasionally insert a random pause instead of an event
        if rng.gen_ratio(1, 2) {
            self.paused = rng.gen_range(0..16);
            return;
        }

        let mut event = InputEvent::default();

        let buttons: &mut [&mut bool] = &mut [
            &mut event.left,
            &mut event.right,
            &mut event.up,
            &mut event.down,
            &mut event.pad_a,
            &mut event.pad_b,
            &mut event.pad_x,
            &mut event.pad_y,
            &mut event.zoom,
            &mut event.pitch_up,
            &mut event.pitch_down,
            &mut event.yaw_left,
            &mut event.yaw_right,
            &mut event.focus_next,
            &mut event.focus_prev,
            &mut event.focus_cancel,
            &mut event.menu_toggle,
            &mut event.dash,
            &mut event.debug_action,
        ];
        for _ in 0..rng.gen_range(1..=4) {
            let pick = rng.gen_range(0..buttons.len());
            *buttons[pick] = true;
        }

        for _ in 0..rng.gen_range(0..=3) {
            match rng.gen_range(0..6) {
                0 => event.delta_lx = rng.gen_range(-1.0..1.0),
                1 => event.delta_ly = rng.gen_range(-1.0..1.0),
                2 => event.delta_rx = rng.gen_range(-1.0..1.0),
                3 => event.delta_ry = rng.gen_range(-1.0..1.0),
                4 => event.trigger_l = rng.gen_range(-1.0..1.0),
                _ => event.trigger_r = rng.gen_range(-1.0..1.0),
            }
        }

        // never fuzz the soak run itself out from under us
        event.exit = false;
        event.fullscreen = false;
        event.resize = false;
        event.verboser = false;
        event.volume_up = false;
        event.volume_down = false;

        crate::input::send_input(bus, event, Some(fuzzer_source()));
    }
}
