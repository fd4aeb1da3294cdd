//! The in-process message bus.
//!
//! Typed topics, ordered delivery, stop/continue propagation. Everything
//! above the containers talks through here: input events, engine commands,
//! shipped log records and debug-draw primitives.
//!
//! The bus is single-threaded by construction. A handler is free to
//! subscribe, unsubscribe or send while a dispatch is in progress; sends
//! issued from inside a handler are queued and fanned out immediately after
//! the current dispatch completes, preserving FIFO order per topic.

use applause_utils::{counter, Timespec64};
use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;
use glam::{Vec3, Vec4};
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

/// Message topics. Bounded; one subscriber list each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Render,
    Input,
    Command,
    Log,
    DebugDraw,
}

impl Topic {
    pub const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Topic::Render => 0,
            Topic::Input => 1,
            Topic::Command => 2,
            Topic::Log => 3,
            Topic::DebugDraw => 4,
        }
    }
}

/// Where a message came from; attached for debugging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Keyboard,
    Joystick,
    Client,
    Server,
    Fuzzer,
}

#[derive(Debug, Clone)]
pub struct MessageSource {
    pub kind: SourceKind,
    pub name: String,
    pub desc: &'static str,
}

/// A platform-agnostic input event. Discrete buttons as booleans, stick and
/// trigger axes as floats, pointer coordinates last. Immutable at dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputEvent {
    pub left: bool,
    pub right: bool,
    pub down: bool,
    pub up: bool,
    pub pad_a: bool,
    pub pad_b: bool,
    pub pad_x: bool,
    pub pad_y: bool,
    pub stick_l: bool,
    pub stick_r: bool,
    pub pad_lb: bool,
    pub pad_rb: bool,
    pub pad_min: bool,
    pub pad_plus: bool,
    pub pad_home: bool,
    pub tab: bool,
    pub enter: bool,
    pub space: bool,
    pub back: bool,
    pub zoom: bool,
    pub pitch_up: bool,
    pub pitch_down: bool,
    pub yaw_left: bool,
    pub yaw_right: bool,
    pub focus_next: bool,
    pub focus_prev: bool,
    pub focus_cancel: bool,
    pub verboser: bool,
    pub autopilot: bool,
    pub fullscreen: bool,
    pub resize: bool,
    pub volume_up: bool,
    pub volume_down: bool,
    pub menu_toggle: bool,
    pub mouse_move: bool,
    pub mouse_click: bool,
    pub exit: bool,
    pub dash: bool,
    pub debug_action: bool,

    pub delta_lx: f32,
    pub delta_ly: f32,
    pub delta_rx: f32,
    pub delta_ry: f32,
    pub trigger_l: f32,
    pub trigger_r: f32,
    pub x: u32,
    pub y: u32,
}

bitflags! {
    /// The command flag word, shared with the wire format.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        const TOGGLE_MODALITY = 1 << 0;
        const GLOBAL_EXIT     = 1 << 1;
        const STATUS          = 1 << 2;
        const CONNECT         = 1 << 3;
        const RESTART         = 1 << 4;
        const LOG_FOLLOWS     = 1 << 5;
        const TOGGLE_FUZZER   = 1 << 6;
        const TOGGLE_NOISE    = 1 << 7;
        const SOUND_READY     = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommandMsg {
    pub flags: CommandFlags,
    pub fps: u32,
    pub sys_seconds: u32,
    pub world_seconds: u32,
    pub time: Timespec64,
}

/// A log record shipped over the bus / wire.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMsg {
    pub ts: Timespec64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugDrawShape {
    Line,
    Aabb,
    Circle { radius: f32 },
    Disc { radius: f32 },
    Text { text: String },
    Grid { cell: u32 },
}

/// One immediate-mode visualization primitive; lives exactly one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugDraw {
    pub v0: Vec3,
    pub v1: Vec3,
    pub shape: DebugDrawShape,
    pub color: Vec4,
    pub thickness: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Render,
    Input(InputEvent),
    Command(CommandMsg),
    Log(LogMsg),
    DebugDraw(DebugDraw),
}

impl Payload {
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Render => Topic::Render,
            Payload::Input(_) => Topic::Input,
            Payload::Command(_) => Topic::Command,
            Payload::Log(_) => Topic::Log,
            Payload::DebugDraw(_) => Topic::DebugDraw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub source: Option<MessageSource>,
    pub payload: Payload,
}

impl Message {
    pub fn command(cmd: CommandMsg) -> Self {
        Self {
            source: None,
            payload: Payload::Command(cmd),
        }
    }

    pub fn input(event: InputEvent, source: Option<MessageSource>) -> Self {
        Self {
            source,
            payload: Payload::Input(event),
        }
    }
}

/// What a handler wants done with the rest of the fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering to later subscribers.
    Handled,
    /// Terminate delivery of this message.
    Stop,
}

/// The or-ed outcome of one send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub delivered: u32,
    pub stopped: bool,
    /// The send happened inside a handler and was queued instead of
    /// dispatched synchronously.
    pub deferred: bool,
}

/// Token returned by [`Bus::subscribe`]; feed to [`Bus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubToken(u64);

type Handler = Rc<RefCell<dyn FnMut(&Message) -> Flow>>;

struct Subscriber {
    token: u64,
    handler: Handler,
}

struct Inner {
    topics: [Vec<Subscriber>; Topic::COUNT],
    pending: VecDeque<Message>,
    dispatching: bool,
}

/// Cheap cloneable handle to the bus. One per engine; subsystems keep a
/// clone.
#[derive(Clone)]
pub struct Bus {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                topics: Default::default(),
                pending: VecDeque::new(),
                dispatching: false,
            })),
        }
    }

    /// Appends a handler to `topic`'s list. Delivery happens in subscription
    /// order.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl FnMut(&Message) -> Flow + 'static,
    ) -> SubToken {
        let token = counter::next();
        self.inner.borrow_mut().topics[topic.index()].push(Subscriber {
            token,
            handler: Rc::new(RefCell::new(handler)),
        });
        SubToken(token)
    }

    pub fn unsubscribe(&self, token: SubToken) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        for list in inner.topics.iter_mut() {
            if let Some(at) = list.iter().position(|sub| sub.token == token.0) {
                list.remove(at);
                return Ok(());
            }
        }
        Err(Error::new(ErrorKind::NotFound))
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.borrow().topics[topic.index()].len()
    }

    /// Delivers `message` to its topic's subscribers in order. Never fails;
    /// handler outcomes are or-ed into the returned [`Dispatch`].
    pub fn send(&self, message: Message) -> Dispatch {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                inner.pending.push_back(message);
                return Dispatch {
                    deferred: true,
                    ..Dispatch::default()
                };
            }
            inner.dispatching = true;
        }

        let result = self.dispatch_one(&message);

        // Handlers may have queued further sends; fan them out now, in order.
        loop {
            let next = self.inner.borrow_mut().pending.pop_front();
            match next {
                Some(queued) => {
                    self.dispatch_one(&queued);
                }
                None => break,
            }
        }

        self.inner.borrow_mut().dispatching = false;
        result
    }

    fn dispatch_one(&self, message: &Message) -> Dispatch {
        let topic = message.payload.topic();

        // Snapshot the list so handlers can (un)subscribe mid-dispatch
        // without invalidating this iteration.
        let snapshot: Vec<(u64, Handler)> = self.inner.borrow().topics[topic.index()]
            .iter()
            .map(|sub| (sub.token, sub.handler.clone()))
            .collect();

        let mut result = Dispatch::default();
        for (token, handler) in snapshot {
            let still_there = self.inner.borrow().topics[topic.index()]
                .iter()
                .any(|sub| sub.token == token);
            if !still_there {
                continue;
            }

            let flow = (&mut *handler.borrow_mut())(message);
            result.delivered += 1;
            if flow == Flow::Stop {
                result.stopped = true;
                break;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn command() -> Message {
        Message::command(CommandMsg::default())
    }

    #[test]
    fn fan_out_in_subscription_order() {
        let bus = Bus::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let calls = calls.clone();
            bus.subscribe(Topic::Command, move |_| {
                calls.borrow_mut().push(name);
                Flow::Handled
            });
        }

        let outcome = bus.send(command());
        assert_eq!(outcome.delivered, 3);
        assert!(!outcome.stopped);
        assert_eq!(*calls.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn stop_propagation_halts_delivery() {
        let bus = Bus::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let c1 = calls.clone();
        bus.subscribe(Topic::Command, move |_| {
            c1.borrow_mut().push("a");
            Flow::Handled
        });
        let c2 = calls.clone();
        bus.subscribe(Topic::Command, move |_| {
            c2.borrow_mut().push("b");
            Flow::Stop
        });
        let c3 = calls.clone();
        bus.subscribe(Topic::Command, move |_| {
            c3.borrow_mut().push("c");
            Flow::Handled
        });

        let outcome = bus.send(command());
        assert!(outcome.stopped);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(*calls.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn unsubscribe_removes_exactly_one() {
        let bus = Bus::new();
        let token = bus.subscribe(Topic::Input, |_| Flow::Handled);
        assert_eq!(bus.subscriber_count(Topic::Input), 1);
        bus.unsubscribe(token).unwrap();
        assert_eq!(bus.subscriber_count(Topic::Input), 0);
        assert!(bus.unsubscribe(token).is_err());
    }

    #[test]
    fn reentrant_send_is_deferred_not_lost() {
        let bus = Bus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_bus = bus.clone();
        let l1 = log.clone();
        bus.subscribe(Topic::Command, move |m| {
            let Payload::Command(cmd) = &m.payload else {
                return Flow::Handled;
            };
            l1.borrow_mut().push(cmd.fps);
            if cmd.fps == 1 {
                let outcome = inner_bus.send(Message::command(CommandMsg {
                    fps: 2,
                    ..CommandMsg::default()
                }));
                assert!(outcome.deferred);
            }
            Flow::Handled
        });

        bus.send(Message::command(CommandMsg {
            fps: 1,
            ..CommandMsg::default()
        }));
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn handler_can_unsubscribe_later_handler() {
        let bus = Bus::new();
        let hits = Rc::new(RefCell::new(0u32));

        let h = hits.clone();
        let victim_slot: Rc<RefCell<Option<SubToken>>> = Rc::new(RefCell::new(None));
        let slot = victim_slot.clone();
        let bus2 = bus.clone();
        bus.subscribe(Topic::Command, move |_| {
            if let Some(victim) = slot.borrow_mut().take() {
                bus2.unsubscribe(victim).unwrap();
            }
            Flow::Handled
        });
        let victim = bus.subscribe(Topic::Command, move |_| {
            *h.borrow_mut() += 1;
            Flow::Handled
        });
        *victim_slot.borrow_mut() = Some(victim);

        bus.send(command());
        assert_eq!(*hits.borrow(), 0);
    }
}
