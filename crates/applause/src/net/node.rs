//! Per-connection network nodes and the frame poll.
//!
//! Three roles share one node type: `Listen` accepts connections, `Server`
//! is an accepted client on the server side, `Client` is the game's
//! outbound connection. Nodes move `Init -> Handshake -> Running`, with
//! `Error` as a terminal drain swept on the next poll; `Sync` is reserved
//! for future clock synchronization and never entered.
//!
//! All writes go through a per-node queue; partial sends keep the buffer at
//! the queue head and resume from the unsent offset when the socket is
//! writable again.

use crate::bus::{Bus, CommandFlags, CommandMsg, Message, MessageSource, Payload, SourceKind};
use crate::error::{Error, ErrorKind, Result};
use crate::logger::{self, LogEntry};
use crate::net::{wire, ws};
use crate::track::ClassGuard;
use applause_utils::Timespec64;
use ahash::AHashMap;
use log::*;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::{
    collections::VecDeque,
    fs::File,
    io::{self, Read, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::mpsc::{self, Receiver},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct NetConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub server_wsport: u16,
    /// Where the server drops per-client log capture files.
    pub log_dir: PathBuf,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            server_ip: "127.0.0.1".into(),
            server_port: 21044,
            server_wsport: 21045,
            log_dir: std::env::temp_dir(),
        }
    }
}

/// Who this node is, not who it talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetMode {
    Listen,
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    Init,
    Handshake,
    /// Reserved for multiplayer clock sync; skipped today.
    #[allow(dead_code)]
    Sync,
    Running,
    Error,
}

struct Queued {
    buf: Vec<u8>,
    sent: usize,
}

enum Sock {
    Listener(TcpListener),
    Stream(TcpStream),
}

struct Node {
    sock: Sock,
    mode: NetMode,
    state: NodeState,
    src: Option<MessageSource>,

    /// Mostly for the future, if someone wants to implement multiplayer:
    /// the peer's wall clock at handshake and our offset from it.
    local_time: Timespec64,
    remote_time: Timespec64,
    remote_delta: Timespec64,

    /// Buffered protocol bytes (partial messages).
    input: Vec<u8>,
    /// Buffered undecoded WebSocket bytes (partial frames).
    wsinput: Vec<u8>,

    websocket: bool,
    /// This connection starts with an HTTP upgrade.
    ws_handshake: bool,
    /// Latch WebSocket framing once the 101 reply has fully drained.
    ws_after_flush: bool,

    out_queue: VecDeque<Queued>,
    /// Capture file for the peer's shipped log records.
    log_file: Option<File>,
    _class: ClassGuard,
}

impl Node {
    fn new(sock: Sock, mode: NetMode) -> Self {
        Self {
            sock,
            mode,
            state: NodeState::Init,
            src: None,
            local_time: Timespec64::ZERO,
            remote_time: Timespec64::ZERO,
            remote_delta: Timespec64::ZERO,
            input: Vec::new(),
            wsinput: Vec::new(),
            websocket: false,
            ws_handshake: false,
            ws_after_flush: false,
            out_queue: VecDeque::new(),
            log_file: None,
            _class: ClassGuard::new("network_node"),
        }
    }

    fn name(&self) -> &str {
        match &self.src {
            Some(src) => &src.name,
            None => match self.mode {
                NetMode::Client => "<client>",
                NetMode::Server => "<server>",
                NetMode::Listen => "<listen>",
            },
        }
    }

    fn queue_outmsg(&mut self, data: Vec<u8>) {
        let data = if self.websocket {
            ws::ws_encode(&data)
        } else {
            data
        };
        self.out_queue.push_back(Queued { buf: data, sent: 0 });
    }

    /// Drains as much of the out queue as the socket accepts. Partial sends
    /// are kept at the head and resumed from the unsent offset.
    fn flush(&mut self) {
        let label = self.name().to_string();
        let Sock::Stream(stream) = &mut self.sock else {
            return;
        };
        while let Some(front) = self.out_queue.front_mut() {
            match stream.write(&front.buf[front.sent..]) {
                Ok(0) => break,
                Ok(n) => {
                    front.sent += n;
                    if front.sent == front.buf.len() {
                        self.out_queue.pop_front();
                    } else {
                        trace!("short send on '{label}': {}/{}", front.sent, front.buf.len());
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!("send to '{label}' failed: {err}");
                    self.state = NodeState::Error;
                    break;
                }
            }
        }

        if self.out_queue.is_empty() && self.ws_after_flush {
            self.websocket = true;
            self.ws_after_flush = false;
            self.ws_handshake = false;
            // Anything the peer pipelined behind the upgrade request is
            // already framed.
            if !self.input.is_empty() {
                self.wsinput = std::mem::take(&mut self.input);
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(file) = &mut self.log_file {
            let _ = writeln!(file, " --- connection closed ---");
        }
    }
}

/// What message handling asks the poll loop to do once the node borrow is
/// released.
enum Action {
    BroadcastRestart,
}

/// Outcome of handling the front of a node's input buffer.
enum Handled {
    Consumed(usize),
    NeedMore,
}

pub struct Networking {
    cfg: NetConfig,
    mode: NetMode,
    poll: Poll,
    events: Events,
    nodes: AHashMap<usize, Node>,
    next_token: usize,
    bus: Bus,
    timeout: Duration,
    /// Ring-sink bridge: the logger flushes entries in here, the poll ships
    /// them out.
    log_rx: Option<Receiver<LogEntry>>,
    /// Entries waiting for a running connection; bounded, oldest evicted.
    log_buffer: VecDeque<LogEntry>,
    sink_token: Option<u64>,
    restart_received: bool,
}

const LOG_BUFFER_MAX: usize = 512;

impl Networking {
    /// Game-side networking: connect to the server and ship the log ring.
    pub fn client(cfg: NetConfig, bus: &Bus) -> Result<Self> {
        let mut net = Self::create(cfg, NetMode::Client, bus, Duration::ZERO)?;

        let (tx, rx) = mpsc::channel();
        net.log_rx = Some(rx);
        net.sink_token = Some(logger::ring_sink_add(Level::Trace, 1, move |entry| {
            let _ = tx.send(entry.clone());
        }));

        net.connect_client()?;
        Ok(net)
    }

    /// Server-side networking: listen on the plain and WebSocket ports.
    pub fn server(cfg: NetConfig, bus: &Bus) -> Result<Self> {
        let mut net = Self::create(cfg, NetMode::Server, bus, Duration::from_millis(100))?;
        let plain = net.cfg.server_port;
        let wsport = net.cfg.server_wsport;
        net.listen(plain, false)?;
        net.listen(wsport, true)?;
        debug!("networking initialized (listening on {plain}/{wsport})");
        Ok(net)
    }

    fn create(cfg: NetConfig, mode: NetMode, bus: &Bus, timeout: Duration) -> Result<Self> {
        Ok(Self {
            cfg,
            mode,
            poll: Poll::new()?,
            events: Events::with_capacity(64),
            nodes: AHashMap::new(),
            next_token: 1,
            bus: bus.clone(),
            timeout,
            log_rx: None,
            log_buffer: VecDeque::new(),
            sink_token: None,
            restart_received: false,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A `restart` command arrived from the server; the orchestrator reacts
    /// by re-executing the process.
    pub fn restart_received(&self) -> bool {
        self.restart_received
    }

    /// Number of connected peers in the running state (server side).
    pub fn running_peers(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.mode == NetMode::Server && n.state == NodeState::Running)
            .count()
    }

    fn address(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.cfg.server_ip, port)
            .parse()
            .map_err(|_| Error::new(ErrorKind::InvalidArguments))
    }

    fn listen(&mut self, port: u16, ws: bool) -> Result<()> {
        let addr = self.address(port)?;
        let mut listener =
            TcpListener::bind(addr).map_err(|_| Error::new(ErrorKind::SockBindFailed))?;
        let token = self.next_token;
        self.next_token += 1;
        self.poll
            .registry()
            .register(&mut listener, Token(token), Interest::READABLE)
            .map_err(|_| Error::new(ErrorKind::SockListenFailed))?;

        let mut node = Node::new(Sock::Listener(listener), NetMode::Listen);
        node.ws_handshake = ws;
        node.state = NodeState::Running;
        self.nodes.insert(token, node);
        Ok(())
    }

    fn connect_client(&mut self) -> Result<()> {
        let addr = self.address(self.cfg.server_port)?;
        let mut stream = TcpStream::connect(addr)?;
        let token = self.next_token;
        self.next_token += 1;
        self.poll.registry().register(
            &mut stream,
            Token(token),
            Interest::READABLE | Interest::WRITABLE,
        )?;

        debug!("connecting to {addr}");
        let mut node = Node::new(Sock::Stream(stream), NetMode::Client);
        node.src = Some(MessageSource {
            kind: SourceKind::Server,
            name: addr.to_string(),
            desc: "log/command server",
        });
        self.nodes.insert(token, node);
        Ok(())
    }

    fn accept_from(&mut self, listener_token: usize) {
        loop {
            let (ws, accepted) = {
                let Some(node) = self.nodes.get_mut(&listener_token) else {
                    return;
                };
                let Sock::Listener(listener) = &mut node.sock else {
                    return;
                };
                (node.ws_handshake, listener.accept())
            };

            match accepted {
                Ok((mut stream, peer)) => {
                    let token = self.next_token;
                    self.next_token += 1;
                    if self
                        .poll
                        .registry()
                        .register(
                            &mut stream,
                            Token(token),
                            Interest::READABLE | Interest::WRITABLE,
                        )
                        .is_err()
                    {
                        continue;
                    }

                    let mut child = Node::new(Sock::Stream(stream), NetMode::Server);
                    child.state = NodeState::Handshake;
                    child.ws_handshake = ws;
                    child.src = Some(MessageSource {
                        kind: SourceKind::Client,
                        name: peer.ip().to_string(),
                        desc: "remote client",
                    });
                    debug!("new client '{}'", child.name());
                    self.nodes.insert(token, child);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    debug!("accept failed: {err}");
                    return;
                }
            }
        }
    }

    /// One frame's worth of socket work. Never blocks longer than the
    /// configured timeout (zero on clients, 100 ms on the headless server).
    pub fn poll(&mut self) -> Result<()> {
        // A dropped client connection comes back on the next poll.
        if self.mode == NetMode::Client
            && !self.nodes.values().any(|n| n.mode == NetMode::Client)
        {
            let _ = self.connect_client();
        }

        self.poll
            .poll(&mut self.events, Some(self.timeout))
            .map_err(|_| Error::new(ErrorKind::SockIoFailed))?;

        let mut actions = Vec::new();
        let mut dead = Vec::new();
        let tokens: Vec<usize> = self.events.iter().map(|e| e.token().0).collect();
        let readable: Vec<bool> = self.events.iter().map(|e| e.is_readable()).collect();
        let writable: Vec<bool> = self.events.iter().map(|e| e.is_writable()).collect();

        for (at, token) in tokens.iter().copied().enumerate() {
            let Some(node) = self.nodes.get(&token) else {
                continue;
            };

            // First, new incoming connections.
            if node.mode == NetMode::Listen {
                if readable[at] {
                    self.accept_from(token);
                }
                continue;
            }

            // Connection establishment on the client side.
            if writable[at] {
                if let Some(node) = self.nodes.get_mut(&token) {
                    if node.mode == NetMode::Client && node.state == NodeState::Init {
                        node.state = NodeState::Handshake;
                    }
                }
            }

            // Second, new data on existing connections.
            if readable[at] {
                match self.read_node(token) {
                    Ok(true) => {
                        self.process_node(token, &mut actions);
                    }
                    Ok(false) => {}
                    Err(_) => {
                        debug!("peer went away");
                        dead.push(token);
                        continue;
                    }
                }
            }
        }

        // Client handshake: introduce ourselves with a `connect` command.
        self.client_handshake();

        // Ship buffered log entries (client role).
        self.ship_logs();

        // Fourth, send out queued data; partial sends stay queued.
        for node in self.nodes.values_mut() {
            node.flush();
        }

        for action in actions {
            match action {
                Action::BroadcastRestart => self.broadcast_restart(),
            }
        }

        // Sweep errored and closed nodes.
        for (token, node) in self.nodes.iter() {
            if node.state == NodeState::Error {
                dead.push(*token);
            }
        }
        dead.sort_unstable();
        dead.dedup();
        for token in dead {
            self.drop_node(token);
        }

        Ok(())
    }

    /// Reads everything available; Ok(true) when new bytes arrived, Err on
    /// hangup.
    fn read_node(&mut self, token: usize) -> Result<bool> {
        let Some(node) = self.nodes.get_mut(&token) else {
            return Ok(false);
        };
        let Sock::Stream(stream) = &mut node.sock else {
            return Ok(false);
        };

        let mut scratch = [0u8; 4096];
        let mut collected = Vec::new();
        loop {
            match stream.read(&mut scratch) {
                Ok(0) => {
                    if collected.is_empty() {
                        return Err(Error::new(ErrorKind::SockIoFailed));
                    }
                    break;
                }
                Ok(n) => collected.extend_from_slice(&scratch[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(Error::new(ErrorKind::SockIoFailed)),
            }
        }

        if collected.is_empty() {
            return Ok(false);
        }
        trace!(
            "new data on '{}': {} bytes (+{}/{} left over)",
            node.name(),
            collected.len(),
            node.input.len(),
            node.wsinput.len()
        );

        // HTTP upgrade phase of a WebSocket connection.
        if node.ws_handshake && !node.websocket {
            node.input.extend_from_slice(&collected);
            Self::try_ws_upgrade(node);
            return Ok(false);
        }

        if node.websocket {
            node.wsinput.extend_from_slice(&collected);
        } else {
            node.input.extend_from_slice(&collected);
        }
        Ok(true)
    }

    fn try_ws_upgrade(node: &mut Node) {
        let Some(end) = node
            .input
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
        else {
            return; // headers still incomplete
        };

        let request = String::from_utf8_lossy(&node.input[..end + 4]).into_owned();
        node.input.drain(..end + 4);
        match ws::handshake_response(&request) {
            Ok(reply) => {
                node.queue_outmsg(reply.into_bytes());
                node.ws_after_flush = true;
            }
            Err(err) => {
                debug!("bad websocket handshake from '{}': {err}", node.name());
                node.state = NodeState::Error;
            }
        }
    }

    /// Decodes frames/messages buffered on a node. Runs the two-stage
    /// pipeline: socket bytes -> (optional WebSocket decode) -> protocol
    /// messages; short reads leave the remainder cached for the next poll.
    fn process_node(&mut self, token: usize, actions: &mut Vec<Action>) {
        loop {
            // Stage 0: peel complete WebSocket frames into the message
            // buffer.
            {
                let Some(node) = self.nodes.get_mut(&token) else {
                    return;
                };
                if node.websocket {
                    loop {
                        match ws::ws_decode(&node.wsinput) {
                            Ok(ws::WsDecode::NeedMore) => break,
                            Ok(ws::WsDecode::Frame {
                                opcode,
                                payload,
                                consumed,
                                ..
                            }) => {
                                node.wsinput.drain(..consumed);
                                if opcode == ws::OP_CLOSE {
                                    node.state = NodeState::Error;
                                    return;
                                }
                                node.input.extend_from_slice(&payload);
                            }
                            Err(err) => {
                                debug!("frame error on '{}': {err}", node.name());
                                node.state = NodeState::Error;
                                return;
                            }
                        }
                    }
                }
                if node.input.is_empty() {
                    return;
                }
            }

            // Stage 1: one WebSocket frame may carry several protocol
            // messages; loop until a short read.
            let mut progressed = false;
            loop {
                let outcome = self.handle_node_input(token, actions);
                match outcome {
                    Some(Handled::Consumed(n)) => {
                        if let Some(node) = self.nodes.get_mut(&token) {
                            node.input.drain(..n);
                            progressed = true;
                            if node.input.is_empty() || node.state == NodeState::Error {
                                break;
                            }
                        } else {
                            return;
                        }
                    }
                    Some(Handled::NeedMore) | None => break,
                }
            }

            if !progressed {
                return;
            }
        }
    }

    /// Dispatches the front of a node's input buffer according to its role
    /// and state.
    fn handle_node_input(&mut self, token: usize, actions: &mut Vec<Action>) -> Option<Handled> {
        let node = self.nodes.get_mut(&token)?;

        match node.mode {
            NetMode::Client => {
                let (cmd, used) = match wire::decode_command(&node.input) {
                    Ok(done) => done,
                    Err(_) => return Some(Handled::NeedMore),
                };
                let src = node.src.clone();
                if cmd.flags.contains(CommandFlags::RESTART) {
                    info!("server requested restart");
                    self.restart_received = true;
                }
                self.bus.send(Message {
                    source: src,
                    payload: Payload::Command(cmd),
                });
                Some(Handled::Consumed(used))
            }
            NetMode::Server => match node.state {
                NodeState::Handshake => Self::handle_server_handshake(&self.cfg, node, actions),
                NodeState::Running => {
                    Self::handle_server_command(node, &self.bus, actions)
                }
                _ => Some(Handled::Consumed(node.input.len())),
            },
            NetMode::Listen => Some(Handled::Consumed(node.input.len())),
        }
    }

    fn handle_server_handshake(
        cfg: &NetConfig,
        node: &mut Node,
        actions: &mut Vec<Action>,
    ) -> Option<Handled> {
        let (cmd, used) = match wire::decode_command(&node.input) {
            Ok(done) => done,
            Err(_) => return Some(Handled::NeedMore),
        };

        if !cmd.flags.contains(CommandFlags::CONNECT) {
            // protocol violation; drain this peer
            debug!("handshake without connect from '{}'", node.name());
            node.state = NodeState::Error;
            return Some(Handled::Consumed(used));
        }

        // Decode the trailing log record before committing anything, so a
        // short read retries the whole frame cleanly.
        let mut total = used;
        let mut record = None;
        if cmd.flags.contains(CommandFlags::LOG_FOLLOWS) {
            match wire::decode_log_record(&node.input[used..]) {
                Ok((decoded, log_used)) => {
                    record = Some(decoded);
                    total += log_used;
                }
                Err(_) => return Some(Handled::NeedMore),
            }
        }

        node.remote_time = cmd.time;
        node.local_time = Timespec64::now();
        node.remote_delta = node.local_time.diff(node.remote_time);
        node.state = NodeState::Running;
        node.log_file = open_capture_file(cfg, node);
        debug!(
            "'{}' connected: local {}.{:09} remote {}.{:09} delta {}.{:09}",
            node.name(),
            node.local_time.sec,
            node.local_time.nsec,
            node.remote_time.sec,
            node.remote_time.nsec,
            node.remote_delta.sec,
            node.remote_delta.nsec
        );

        if let Some(record) = record {
            append_capture(node, &record);
        }
        if cmd.flags.contains(CommandFlags::RESTART) {
            actions.push(Action::BroadcastRestart);
        }

        Some(Handled::Consumed(total))
    }

    /// Handles one command message from a running peer; returns bytes
    /// consumed.
    fn handle_server_command(
        node: &mut Node,
        bus: &Bus,
        actions: &mut Vec<Action>,
    ) -> Option<Handled> {
        let (cmd, mut used) = match wire::decode_command(&node.input) {
            Ok(done) => done,
            Err(_) => return Some(Handled::NeedMore),
        };

        if cmd.flags.contains(CommandFlags::LOG_FOLLOWS) {
            let (record, log_used) = match wire::decode_log_record(&node.input[used..]) {
                Ok(done) => done,
                Err(_) => return Some(Handled::NeedMore),
            };
            append_capture(node, &record);
            used += log_used;
        } else {
            // an actual command for this process: put it on the bus
            bus.send(Message {
                source: node.src.clone(),
                payload: Payload::Command(cmd),
            });
        }

        if cmd.flags.contains(CommandFlags::RESTART) {
            actions.push(Action::BroadcastRestart);
        }

        Some(Handled::Consumed(used))
    }

    fn client_handshake(&mut self) {
        for node in self.nodes.values_mut() {
            if node.mode == NetMode::Client && node.state == NodeState::Handshake {
                debug!("introducing ourselves to '{}'", node.name());
                let cmd = CommandMsg {
                    flags: CommandFlags::CONNECT,
                    time: Timespec64::now(),
                    ..CommandMsg::default()
                };
                node.queue_outmsg(wire::encode_command(&cmd));
                node.state = NodeState::Running;
            }
        }
    }

    /// Adapts buffered ring-sink entries into `log_follows` frames on the
    /// client connection. While disconnected, entries wait in a bounded
    /// buffer, oldest evicted on overflow.
    fn ship_logs(&mut self) {
        let Some(rx) = &self.log_rx else {
            return;
        };
        while let Ok(entry) = rx.try_recv() {
            if self.log_buffer.len() == LOG_BUFFER_MAX {
                self.log_buffer.pop_front();
            }
            self.log_buffer.push_back(entry);
        }

        let Some(client) = self
            .nodes
            .values_mut()
            .find(|n| n.mode == NetMode::Client && n.state == NodeState::Running)
        else {
            return;
        };

        while let Some(entry) = self.log_buffer.pop_front() {
            let file = entry.file.rsplit(['/', '\\']).next().unwrap_or("?");
            let text = format!("[{}:{} @{}] {}", file, entry.line, entry.module, entry.msg);
            let frame = wire::encode_command_with_log(
                CommandMsg {
                    time: Timespec64::now(),
                    ..CommandMsg::default()
                },
                entry.ts,
                &text,
            );
            client.queue_outmsg(frame);
        }
    }

    /// Queues a command to every running peer.
    pub fn broadcast_command(&mut self, cmd: &CommandMsg) {
        let wire = wire::encode_command(cmd);
        for node in self.nodes.values_mut() {
            if node.mode != NetMode::Listen && node.state == NodeState::Running {
                trace!("sending to '{}'", node.name());
                node.queue_outmsg(wire.clone());
            }
        }
    }

    pub fn broadcast_restart(&mut self) {
        debug!("broadcasting restart");
        self.broadcast_command(&CommandMsg {
            flags: CommandFlags::RESTART,
            ..CommandMsg::default()
        });
    }

    fn drop_node(&mut self, token: usize) {
        if let Some(mut node) = self.nodes.remove(&token) {
            debug!("dropping node '{}'", node.name());
            match &mut node.sock {
                Sock::Listener(listener) => {
                    let _ = self.poll.registry().deregister(listener);
                }
                Sock::Stream(stream) => {
                    let _ = self.poll.registry().deregister(stream);
                }
            }
        }
    }

    /// Flushes remaining queues and tears the node set down.
    pub fn shutdown(&mut self) {
        // give queued data (including a just-broadcast restart) a chance
        for _ in 0..10 {
            let _ = self.poll();
            if self
                .nodes
                .values()
                .all(|node| node.out_queue.is_empty())
            {
                break;
            }
        }

        let tokens: Vec<usize> = self.nodes.keys().copied().collect();
        for token in tokens {
            self.drop_node(token);
        }
        if let Some(token) = self.sink_token.take() {
            logger::ring_sink_del(token);
        }
    }
}

impl Drop for Networking {
    fn drop(&mut self) {
        if let Some(token) = self.sink_token.take() {
            logger::ring_sink_del(token);
        }
    }
}

fn open_capture_file(cfg: &NetConfig, node: &Node) -> Option<File> {
    let stamp = chrono::DateTime::from_timestamp(node.remote_time.sec as i64, 0)
        .map(|utc| utc.format("%F_%H-%M-%S").to_string())
        .unwrap_or_else(|| "epoch".into());
    let name = format!(
        "applause-{}-{}.{:09}",
        node.name(),
        stamp,
        node.remote_time.nsec
    );
    let path = cfg.log_dir.join(name);
    debug!("using log file '{}'", path.display());
    match File::create(&path) {
        Ok(file) => Some(file),
        Err(err) => {
            warn!("couldn't open '{}': {err}", path.display());
            None
        }
    }
}

fn append_capture(node: &mut Node, record: &crate::bus::LogMsg) {
    if record.msg.is_empty() {
        return;
    }
    if let Some(file) = &mut node.log_file {
        let _ = write!(file, "[{}.{:09}] {}", record.ts.sec, record.ts.nsec, record.msg);
        if !record.msg.ends_with('\n') {
            let _ = writeln!(file);
        }
        let _ = file.flush();
    }
}
