//! The headless server: accepts game clients over plain TCP or WebSocket,
//! captures their shipped logs to per-client files, forwards status updates
//! to every peer and rebroadcasts `restart` commands. On a restart command
//! it restarts itself too, coming back up with the same arguments.

use anyhow::Context;
use applause::{
    bus::{CommandFlags, CommandMsg, Flow, Payload, Topic},
    engine::{Engine, EngineConfig},
    net::{NetConfig, Networking},
};
use applause_utils::AnyResult;
use clap::Parser;
use log::*;
use std::{cell::RefCell, path::PathBuf, process::ExitCode, rc::Rc};

#[derive(Debug, Parser)]
#[clap(name = "Applause Server", about)]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    /// Address to listen on.
    ip: String,

    #[clap(long, default_value_t = 21044)]
    /// Plain TCP port.
    port: u16,

    #[clap(long, default_value_t = 21045)]
    /// WebSocket port for browser clients.
    ws_port: u16,

    #[clap(long, value_name = "DIR")]
    /// Where to put per-client log capture files (defaults to the system
    /// temp directory).
    log_dir: Option<PathBuf>,
}

/// Runs the serve loop; Ok(true) means a restart was requested.
fn serve(args: Args, engine: &Engine) -> AnyResult<bool> {
    let mut net_cfg = NetConfig {
        server_ip: args.ip,
        server_port: args.port,
        server_wsport: args.ws_port,
        ..NetConfig::default()
    };
    if let Some(dir) = args.log_dir {
        net_cfg.log_dir = dir;
    }

    let mut net =
        Networking::server(net_cfg, &engine.bus).context("couldn't set up listeners")?;

    // Commands decoded off client connections land on the bus; collect the
    // ones the serve loop reacts to.
    let inbox: Rc<RefCell<Vec<CommandMsg>>> = Rc::new(RefCell::new(Vec::new()));
    let mailbox = inbox.clone();
    engine.bus.subscribe(Topic::Command, move |message| {
        if let Payload::Command(cmd) = &message.payload {
            mailbox.borrow_mut().push(*cmd);
        }
        Flow::Handled
    });

    info!("applause-server {} up", applause::VERSION);

    let mut restart = false;
    'serve: loop {
        net.poll().context("poll failed")?;

        let drained: Vec<CommandMsg> = inbox.borrow_mut().drain(..).collect();
        for cmd in drained {
            // A client's status heartbeat is fanned out to every peer.
            if cmd.flags.contains(CommandFlags::STATUS) {
                net.broadcast_command(&cmd);
            }
            if cmd.flags.contains(CommandFlags::RESTART) {
                restart = true;
                break 'serve;
            }
            if cmd.flags.contains(CommandFlags::GLOBAL_EXIT) {
                break 'serve;
            }
        }
    }

    net.shutdown();
    Ok(restart)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let engine = match Engine::headless(EngineConfig {
        debug: true,
        ..EngineConfig::default()
    }) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("applause-server: init failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    match serve(args, &engine) {
        Ok(restart) => {
            engine.shutdown(0);
            if restart {
                debug!("### restarting server ###");
                let err = Engine::restart_exec();
                eprintln!("applause-server: {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("applause-server: {err:#}");
            engine.shutdown(1);
            ExitCode::FAILURE
        }
    }
}
