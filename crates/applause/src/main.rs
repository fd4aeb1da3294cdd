use applause::{
    cli,
    engine::{Engine, EngineConfig, NoHooks, RunOutcome},
    scene::{model::Model, model::TextureSet, GridTerrain, Scene},
};
use clap::Parser;
use log::*;
use std::process::ExitCode;

/// A minimal scene exercising the whole update protocol: generated terrain,
/// a few placed entities, and a camera-followed control character. Actual
/// games supply their own through the same calls.
fn sample_scene(engine: &Engine) -> Scene {
    let mut scene = Scene::new(&engine.bus);
    scene.speed = 4.0;
    scene.terrain = Some(Box::new(GridTerrain::generate(
        0.0,
        0.0,
        0.0,
        1000.0,
        64,
        0.15,
        &mut rand::thread_rng(),
    )));

    let scenery = scene.add_model(Model::new("pillar"), TextureSet::new("stone"));
    for at in [-4.0f32, 0.0, 4.0] {
        if let Ok(entity) = scene.entity_new(scenery) {
            let entity = scene.entity_mut(entity).unwrap();
            entity.pos.x = at;
            entity.pos.z = -6.0;
        }
    }

    let hero = scene.add_model(Model::new("hero"), TextureSet::new("cloth"));
    if let Ok(ch) = scene.character_new(hero) {
        scene.control = Some(ch);
        scene.camera_mut().ch = Some(ch);
        scene.camera_mut().pitch = 30.0;
    }

    scene
}

fn main() -> ExitCode {
    let args = cli::Args::parse();

    let cfg = EngineConfig {
        input: true,
        font: true,
        phys: true,
        sound: true,
        settings: true,
        title: "Applause".into(),
        width: 1280,
        height: 720,
        fullscreen: args.fullscreen,
        exit_timeout: args.exitafter,
        server_addr: args.server,
        abort_on_error: args.aoe,
        base_url: args.base_url,
        ..EngineConfig::default()
    };

    let mut engine = match Engine::headless(cfg) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("applause: init failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("welcome to applause {}", applause::VERSION);

    let mut scene = sample_scene(&engine);
    let outcome = engine.run(&mut scene, &mut NoHooks);
    drop(scene);

    match outcome {
        RunOutcome::Exit => {
            engine.shutdown(0);
            ExitCode::SUCCESS
        }
        RunOutcome::Restart => {
            engine.shutdown(0);
            // only returns on failure
            let err = Engine::restart_exec();
            eprintln!("applause: {err}");
            ExitCode::FAILURE
        }
    }
}
