// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control channel: a unix stream socket serving one client at a time.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use interface_manager::ShutdownToken;

#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use crate::{Command, CommandHandler, FrameReader};

/// How often an idle listener or connection looks at the shutdown token.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to create directory for control socket {0}: {1}")]
    Directory(PathBuf, #[source] io::Error),
    #[error("Failed to bind control socket {0}: {1}")]
    Bind(PathBuf, #[source] io::Error),
    #[error("Failed to spawn control thread: {0}")]
    Spawn(#[source] io::Error),
}

/// How a client connection ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The client closed the connection between frames
    Closed,
    /// The client sent a malformed frame or the stream failed
    Dropped,
    Shutdown,
}

pub struct ControlListener {
    path: PathBuf,
    listener: UnixListener,
}

impl ControlListener {
    /// Bind the control socket at `path`, replacing any stale socket file.
    pub fn bind(path: &Path) -> Result<Self, ListenerError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| ListenerError::Directory(dir.to_path_buf(), e))?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed stale control socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ListenerError::Bind(path.to_path_buf(), e)),
        }
        let listener =
            UnixListener::bind(path).map_err(|e| ListenerError::Bind(path.to_path_buf(), e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ListenerError::Bind(path.to_path_buf(), e))?;
        info!("Control channel listening at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve clients, one at a time, until shutdown is requested.
    pub fn serve<H: CommandHandler + ?Sized>(&self, handler: &H, shutdown: &ShutdownToken) {
        while !shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    info!("Control client connected");
                    let end = serve_client(stream, handler, shutdown);
                    info!("Control client gone ({end:?})");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    shutdown.wait_timeout(SHUTDOWN_CHECK);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("Failed to accept control connection: {e}");
                    shutdown.wait_timeout(SHUTDOWN_CHECK);
                }
            }
        }
        debug!("Control listener stopped");
    }

    /// Serve clients in a thread of its own.
    pub fn spawn<H: CommandHandler + 'static>(
        self,
        handler: Arc<H>,
        shutdown: ShutdownToken,
    ) -> Result<JoinHandle<()>, ListenerError> {
        std::thread::Builder::new()
            .name("relay-ctl".to_string())
            .spawn(move || self.serve(handler.as_ref(), &shutdown))
            .map_err(ListenerError::Spawn)
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove control socket {}: {e}", self.path.display());
        }
    }
}

/// Read and apply frames from one client until it goes away.
///
/// A command the handler rejects is logged and the connection stays open. A malformed frame
/// or a stream error closes the connection.
pub fn serve_client<H: CommandHandler + ?Sized>(
    stream: UnixStream,
    handler: &H,
    shutdown: &ShutdownToken,
) -> Disconnect {
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(SHUTDOWN_CHECK)))
    {
        error!("Failed to set up control connection: {e}");
        return Disconnect::Dropped;
    }
    let mut reader = FrameReader::new(stream);
    loop {
        if shutdown.is_requested() {
            return Disconnect::Shutdown;
        }
        match reader.read_frame() {
            Ok(None) => return Disconnect::Closed,
            Ok(Some(frame)) => {
                let command = Command::from(frame);
                debug!("Received frame {frame}: {command}");
                if let Err(e) = command.execute(handler) {
                    warn!("Failed to {command}: {e}");
                }
            }
            Err(e) if e.is_timeout() => {}
            Err(e) => {
                warn!("Closing control connection: {e}");
                return Disconnect::Dropped;
            }
        }
    }
}
