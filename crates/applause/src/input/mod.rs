//! The input pipeline.
//!
//! Platform sources (keyboard, mouse, touch) inject [`InputEvent`]s into a
//! queue that the orchestrator drains onto the message bus once per frame,
//! before anything reads input state. Joysticks are polled into the same
//! queue; the fuzzer synthesizes events for soak testing when enabled.

use crate::bus::{Bus, InputEvent, Message, MessageSource, SourceKind};
use std::collections::VecDeque;

pub mod fuzzer;
pub mod joystick;

pub use fuzzer::Fuzzer;
pub use joystick::{ButtonEdge, JoystickSet, NR_JOYS};

/// Sends one input event to the bus, tagged with its source.
pub fn send_input(bus: &Bus, event: InputEvent, source: Option<MessageSource>) {
    bus.send(Message::input(event, source));
}

pub fn keyboard_source() -> MessageSource {
    MessageSource {
        kind: SourceKind::Keyboard,
        name: "keyboard".into(),
        desc: "platform keyboard",
    }
}

pub struct InputPipeline {
    queue: VecDeque<(InputEvent, Option<MessageSource>)>,
    pub joysticks: JoystickSet,
    pub fuzzer: Fuzzer,
}

impl InputPipeline {
    /// Wires the pipeline up; the fuzzer subscribes its enable toggle to the
    /// command topic.
    pub fn new(bus: &Bus) -> Self {
        Self {
            queue: VecDeque::new(),
            joysticks: JoystickSet::new(),
            fuzzer: Fuzzer::new(bus),
        }
    }

    /// Entry point for platform event sources.
    pub fn inject(&mut self, event: InputEvent, source: Option<MessageSource>) {
        self.queue.push_back((event, source));
    }

    /// Runs the fuzzer for this frame (no-op unless toggled on).
    pub fn fuzzer_step(&mut self, bus: &Bus) {
        self.fuzzer.step(bus);
    }

    /// Polls the joysticks and drains everything queued onto the bus.
    pub fn dispatch(&mut self, bus: &Bus) {
        self.joysticks.poll(bus);
        while let Some((event, source)) = self.queue.pop_front() {
            send_input(bus, event, source);
        }
    }
}
