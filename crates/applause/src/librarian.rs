//! The resource librarian.
//!
//! Assets are addressed by `(kind, name)` and resolved to concrete paths or
//! URLs relative to a configurable base. Requests hand back refcounted
//! handles and complete through a callback, exactly once per handle. The
//! actual I/O sits behind [`Fetcher`], so the desktop build reads the file
//! system synchronously while a browser build can satisfy requests
//! asynchronously; deferred completions are pumped at the top of the next
//! frame, never in the middle of one.

use crate::error::{Error, ErrorKind, Result};
use crate::track::ClassGuard;
use log::*;
use std::{
    cell::RefCell,
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Config,
    Asset,
    Shader,
    State,
}

/// Which shader dialect the librarian serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderTarget {
    #[default]
    Desktop,
    Es,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Requested,
    Loaded,
    Error,
}

/// A pending or completed asset request. Shared, refcounted; the buffer is
/// released with the last reference.
pub struct HandleData {
    pub name: String,
    pub kind: ResourceKind,
    pub buf: Vec<u8>,
    pub state: HandleState,
    _class: ClassGuard,
}

pub type LibHandle = Rc<RefCell<HandleData>>;

type Completion = Box<dyn FnOnce(&LibHandle)>;

/// Platform-swappable request backend.
pub trait Fetcher {
    /// Starts fetching `uri` into `handle`. `done` must be invoked exactly
    /// once, either here or from a later [`Fetcher::pump`].
    fn fetch(&mut self, uri: PathBuf, handle: LibHandle, done: Completion);

    /// Runs deferred completions. Called between frames.
    fn pump(&mut self) {}
}

fn read_into(uri: &Path, handle: &LibHandle) {
    match fs::read(uri) {
        Ok(buf) => {
            let mut data = handle.borrow_mut();
            data.buf = buf;
            data.state = HandleState::Loaded;
        }
        Err(err) => {
            debug!("couldn't read '{}': {err}", uri.display());
            let mut data = handle.borrow_mut();
            data.buf = Vec::new();
            data.state = HandleState::Error;
        }
    }
}

/// Desktop backend: blocking whole-file reads, completion runs inline.
#[derive(Default)]
pub struct SyncFsFetcher;

impl Fetcher for SyncFsFetcher {
    fn fetch(&mut self, uri: PathBuf, handle: LibHandle, done: Completion) {
        read_into(&uri, &handle);
        done(&handle);
    }
}

/// Deferred backend modelling the browser's async fetch: requests queue up
/// and complete on [`Fetcher::pump`], between frames. Handles stay in the
/// `Requested` state until then.
#[derive(Default)]
pub struct QueuedFetcher {
    pending: VecDeque<(PathBuf, LibHandle, Completion)>,
}

impl Fetcher for QueuedFetcher {
    fn fetch(&mut self, uri: PathBuf, handle: LibHandle, done: Completion) {
        self.pending.push_back((uri, handle, done));
    }

    fn pump(&mut self) {
        while let Some((uri, handle, done)) = self.pending.pop_front() {
            read_into(&uri, &handle);
            done(&handle);
        }
    }
}

pub struct Librarian {
    base_url: PathBuf,
    shader_target: ShaderTarget,
    backend: Box<dyn Fetcher>,
}

impl Librarian {
    pub fn new(base_url: Option<&str>) -> Self {
        Self::with_backend(base_url, Box::new(SyncFsFetcher))
    }

    pub fn with_backend(base_url: Option<&str>, backend: Box<dyn Fetcher>) -> Self {
        let base_url = match base_url {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from("."),
        };
        Self {
            base_url,
            shader_target: ShaderTarget::default(),
            backend,
        }
    }

    pub fn set_shader_target(&mut self, target: ShaderTarget) {
        self.shader_target = target;
    }

    /// Maps `(kind, name)` to a concrete location. `State` resolves to a
    /// per-user writable path; everything else is relative to the base URL.
    pub fn figure_uri(&self, kind: ResourceKind, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArguments));
        }

        let uri = match kind {
            ResourceKind::Config => self.base_url.join("config").join(name),
            ResourceKind::Asset => self.base_url.join("asset").join(name),
            ResourceKind::Shader => {
                let dialect = match self.shader_target {
                    ShaderTarget::Desktop => "glsl",
                    ShaderTarget::Es => "glsl-es",
                };
                self.base_url.join("asset").join(dialect).join(name)
            }
            ResourceKind::State => state_dir()
                .ok_or_else(|| Error::new(ErrorKind::NotSupported))?
                .join(state_file_name(name)),
        };
        Ok(uri)
    }

    /// Requests an asset. The returned handle is also passed to `done`,
    /// which runs exactly once, possibly before this returns (sync backend).
    /// The callback may drop its handle reference right away; typical
    /// consumers copy what they need out of the buffer.
    pub fn request(
        &mut self,
        kind: ResourceKind,
        name: &str,
        done: impl FnOnce(&LibHandle) + 'static,
    ) -> Result<LibHandle> {
        let uri = self.figure_uri(kind, name)?;
        let handle: LibHandle = Rc::new(RefCell::new(HandleData {
            name: name.to_string(),
            kind,
            buf: Vec::new(),
            state: HandleState::Requested,
            _class: ClassGuard::new("lib_handle"),
        }));

        self.backend.fetch(uri, handle.clone(), Box::new(done));
        Ok(handle)
    }

    /// Synchronous convenience read, bypassing the backend. Used by the
    /// settings loader and other init-time consumers.
    pub fn read_file(&self, kind: ResourceKind, name: &str) -> Result<Vec<u8>> {
        let uri = self.figure_uri(kind, name)?;
        fs::read(&uri).map_err(Error::from)
    }

    /// Writable counterpart of [`Librarian::read_file`]; only `State`
    /// resources may be written.
    pub fn write_file(&self, kind: ResourceKind, name: &str, contents: &[u8]) -> Result<()> {
        if kind != ResourceKind::State {
            return Err(Error::new(ErrorKind::InvalidOperation));
        }
        let uri = self.figure_uri(kind, name)?;
        if let Some(parent) = uri.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&uri, contents)?;
        Ok(())
    }

    /// Runs deferred fetch completions.
    pub fn pump(&mut self) {
        self.backend.pump();
    }
}

#[cfg(windows)]
fn state_dir() -> Option<PathBuf> {
    std::env::var_os("LOCALAPPDATA").map(PathBuf::from)
}

#[cfg(not(windows))]
fn state_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn state_file_name(name: &str) -> String {
    name.to_string()
}

#[cfg(not(windows))]
fn state_file_name(name: &str) -> String {
    format!(".{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn uri_prefixes_by_kind() {
        let lib = Librarian::new(Some("/data"));
        assert_eq!(
            lib.figure_uri(ResourceKind::Config, "engine.toml").unwrap(),
            PathBuf::from("/data/config/engine.toml")
        );
        assert_eq!(
            lib.figure_uri(ResourceKind::Asset, "tree.glb").unwrap(),
            PathBuf::from("/data/asset/tree.glb")
        );
        assert_eq!(
            lib.figure_uri(ResourceKind::Shader, "model.vert").unwrap(),
            PathBuf::from("/data/asset/glsl/model.vert")
        );

        let mut lib = lib;
        lib.set_shader_target(ShaderTarget::Es);
        assert_eq!(
            lib.figure_uri(ResourceKind::Shader, "model.vert").unwrap(),
            PathBuf::from("/data/asset/glsl-es/model.vert")
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let lib = Librarian::new(None);
        assert!(lib.figure_uri(ResourceKind::Asset, "").is_err());
    }

    #[test]
    fn missing_file_reports_error_state() {
        let mut lib = Librarian::new(Some("/nonexistent-base"));
        let called = Rc::new(Cell::new(0));
        let count = called.clone();
        let handle = lib
            .request(ResourceKind::Asset, "missing.bin", move |h| {
                count.set(count.get() + 1);
                assert_eq!(h.borrow().state, HandleState::Error);
                assert!(h.borrow().buf.is_empty());
            })
            .unwrap();
        assert_eq!(called.get(), 1);
        assert_eq!(handle.borrow().state, HandleState::Error);
    }

    #[test]
    fn queued_backend_defers_until_pump() {
        let mut lib = Librarian::with_backend(
            Some("/nonexistent-base"),
            Box::new(QueuedFetcher::default()),
        );
        let called = Rc::new(Cell::new(false));
        let flag = called.clone();
        let handle = lib
            .request(ResourceKind::Asset, "missing.bin", move |_| {
                flag.set(true);
            })
            .unwrap();

        // still pending: refcount keeps it alive, state is untouched
        assert!(!called.get());
        assert_eq!(handle.borrow().state, HandleState::Requested);

        lib.pump();
        assert!(called.get());
        assert_eq!(handle.borrow().state, HandleState::Error);
    }

    #[test]
    fn sync_fetch_reads_real_files() {
        let dir = std::env::temp_dir().join("applause-librarian-test");
        std::fs::create_dir_all(dir.join("asset")).unwrap();
        std::fs::write(dir.join("asset/blob.bin"), b"payload").unwrap();

        let mut lib = Librarian::new(dir.to_str());
        let handle = lib
            .request(ResourceKind::Asset, "blob.bin", |h| {
                assert_eq!(h.borrow().state, HandleState::Loaded);
            })
            .unwrap();
        assert_eq!(handle.borrow().buf, b"payload");
    }
}
