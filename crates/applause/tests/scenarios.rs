//! End-to-end behavior of the clock, timers, command fan-out and the
//! orchestrated frame, driven deterministically.

use applause::bus::{Bus, CommandFlags, CommandMsg, Flow, Message, Payload, Topic};
use applause::engine::{Engine, EngineConfig, NoHooks, TimerAction, Timers};
use applause::scene::{FlatTerrain, Model, Scene, TextureSet};
use glam::Vec3;
use std::{cell::RefCell, rc::Rc};

/// Timer at 0.5 s: thirty frames at 60 FPS stay short of it, the first
/// frame past half a second fires it exactly once.
#[test]
fn timer_at_half_a_second() {
    let mut timers = Timers::new();
    let counter = Rc::new(RefCell::new(0u32));

    let count = counter.clone();
    timers
        .set(0.0, 0.5, None, move |_| {
            *count.borrow_mut() += 1;
            TimerAction::Done
        })
        .unwrap();

    let frame_dt = 1.0 / 60.0;
    for frame in 0..30 {
        timers.run(frame as f64 * frame_dt); // up to 0.483 s
    }
    assert_eq!(*counter.borrow(), 0);

    timers.run(30.0 * frame_dt); // 0.5 s elapsed
    assert_eq!(*counter.borrow(), 1);

    // one-shot: staying past the expiry does not re-fire
    timers.run(1.0);
    assert_eq!(*counter.borrow(), 1);
}

/// Message fan-out: A, B, C in subscription order; then B stops
/// propagation and C goes quiet.
#[test]
fn command_fan_out_and_stop() {
    let bus = Bus::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let stop_at_b = Rc::new(RefCell::new(false));

    let log = calls.clone();
    bus.subscribe(Topic::Command, move |_| {
        log.borrow_mut().push('A');
        Flow::Handled
    });
    let log = calls.clone();
    let stop = stop_at_b.clone();
    bus.subscribe(Topic::Command, move |_| {
        log.borrow_mut().push('B');
        if *stop.borrow() {
            Flow::Stop
        } else {
            Flow::Handled
        }
    });
    let log = calls.clone();
    bus.subscribe(Topic::Command, move |_| {
        log.borrow_mut().push('C');
        Flow::Handled
    });

    bus.send(Message::command(CommandMsg::default()));
    assert_eq!(*calls.borrow(), vec!['A', 'B', 'C']);

    calls.borrow_mut().clear();
    *stop_at_b.borrow_mut() = true;
    bus.send(Message::command(CommandMsg::default()));
    assert_eq!(*calls.borrow(), vec!['A', 'B']);
}

/// Character terrain snap through the full frame: flat terrain at 2.0, a
/// non-carrier character parked at y=10 ends the frame at ground level.
#[test]
fn character_terrain_snap_through_frame() {
    let mut engine = Engine::headless(EngineConfig {
        quiet: true,
        phys: true,
        width: 640,
        height: 480,
        ..EngineConfig::default()
    })
    .unwrap();

    let mut scene = Scene::new(&engine.bus);
    scene.terrain = Some(Box::new(FlatTerrain(2.0)));
    let txm = scene.add_model(Model::new("hero"), TextureSet::new("cloth"));
    let ch = scene.character_new(txm).unwrap();
    scene.control = Some(ch);
    scene.character_mut(ch).unwrap().pos.y = 10.0;

    engine.frame(&mut scene, &mut NoHooks);

    let character = scene.character(ch).unwrap();
    assert_eq!(character.pos.y, 2.0);
    assert!(character.moved > 0);
}

/// Motion expressed in units per second is converted per-frame exactly
/// once, during the frame.
#[test]
fn motion_is_per_second_inside_the_frame() {
    let mut engine = Engine::headless(EngineConfig {
        quiet: true,
        width: 640,
        height: 480,
        ..EngineConfig::default()
    })
    .unwrap();

    let mut scene = Scene::new(&engine.bus);
    scene.terrain = Some(Box::new(FlatTerrain(0.0)));
    let txm = scene.add_model(Model::new("hero"), TextureSet::new("cloth"));
    let ch = scene.character_new(txm).unwrap();
    scene.control = Some(ch);
    scene.character_mut(ch).unwrap().motion = Vec3::new(6.0, 0.0, 0.0);

    engine.frame(&mut scene, &mut NoHooks);

    let character = scene.character(ch).unwrap();
    let expected = 6.0 / engine.fps.fine_f64() as f32;
    assert!((character.pos.x - expected).abs() < 1e-6);
    assert_eq!(character.motion, Vec3::ZERO);
}

/// Exit-after-N: the countdown is driven by status messages; after the
/// third one, the next frame observes the exit request.
#[test]
fn exit_after_three_status_messages() {
    let mut engine = Engine::headless(EngineConfig {
        quiet: true,
        exit_timeout: Some(3),
        width: 640,
        height: 480,
        ..EngineConfig::default()
    })
    .unwrap();
    let mut scene = Scene::new(&engine.bus);

    engine.frame(&mut scene, &mut NoHooks);
    assert!(!engine.display.exit_requested());

    // one status heartbeat per wall-clock second, three seconds' worth
    for _ in 0..2 {
        engine.bus.send(Message::command(CommandMsg {
            flags: CommandFlags::STATUS,
            ..CommandMsg::default()
        }));
    }
    engine.frame(&mut scene, &mut NoHooks);
    assert!(!engine.display.exit_requested());

    engine.bus.send(Message::command(CommandMsg {
        flags: CommandFlags::STATUS,
        ..CommandMsg::default()
    }));
    engine.frame(&mut scene, &mut NoHooks);
    assert!(engine.display.exit_requested());
}

/// The exit input event requests termination of the main loop.
#[test]
fn run_terminates_on_exit_input() {
    let mut engine = Engine::headless(EngineConfig {
        quiet: true,
        input: true,
        width: 640,
        height: 480,
        ..EngineConfig::default()
    })
    .unwrap();
    let mut scene = Scene::new(&engine.bus);

    engine.input.inject(
        applause::bus::InputEvent {
            exit: true,
            ..Default::default()
        },
        None,
    );

    let outcome = engine.run(&mut scene, &mut NoHooks);
    assert_eq!(outcome, applause::engine::RunOutcome::Exit);
    assert!(scene.frames_total >= 1);
}

/// Debug draw messages sent during a frame are consumed by that frame's
/// render and do not survive into the next.
#[test]
fn debug_draw_lives_one_frame() {
    let mut engine = Engine::headless(EngineConfig {
        quiet: true,
        width: 640,
        height: 480,
        ..EngineConfig::default()
    })
    .unwrap();
    let mut scene = Scene::new(&engine.bus);

    engine.bus.send(Message {
        source: None,
        payload: Payload::DebugDraw(applause::bus::DebugDraw {
            v0: Vec3::ZERO,
            v1: Vec3::ONE,
            shape: applause::bus::DebugDrawShape::Aabb,
            color: glam::Vec4::ONE,
            thickness: 1.0,
        }),
    });

    engine.frame(&mut scene, &mut NoHooks);
    assert_eq!(scene.debug_draw_count(), 0);
}
