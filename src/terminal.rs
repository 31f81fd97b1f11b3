//! PTY-backed duplex byte stream a session drives its remote shell through.

use crate::error::{Error, Result};
use crate::reader::spawn_reader;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::Write;
use std::sync::mpsc::Receiver;

// The management CLI pages long output unless the window claims to be this
// tall. Column count is left for the slave side to pick.
const PTY_ROWS: u16 = 32768;
const PTY_COLS: u16 = 0;

/// A program running inside a locally-allocated PTY.
///
/// The remote side of the stream is whatever the spawned command connects to,
/// normally the system `ssh` client. The slave keeps echo enabled: the
/// management shells this crate drives refuse to emit content otherwise, so
/// response parsing always discards the echoed command line instead.
pub struct Terminal {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl Terminal {
    /// Spawn `command` in a fresh PTY, returning the terminal and the receiver
    /// fed by its dedicated reader thread.
    pub fn spawn(command: &str, args: &[String]) -> Result<(Self, Receiver<Vec<u8>>)> {
        let pty_system = portable_pty::native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(Error::connection)?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::connection(format!("failed to spawn {command}: {e}")))?;

        let writer = pair.master.take_writer().map_err(Error::connection)?;
        let reader = pair.master.try_clone_reader().map_err(Error::connection)?;

        let terminal = Terminal {
            master: pair.master,
            child,
            writer,
        };

        Ok((terminal, spawn_reader(reader)))
    }

    /// Write raw bytes to the remote side.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::connection(format!("send failed: {e}")))
    }

    /// Write a line terminated by a newline.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.send(&bytes)
    }

    /// Whether the spawned program is still running.
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Resize the PTY window.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(Error::connection)
    }

    /// Release the automation handle and the transport, in that order. Both
    /// releases are attempted even if the first fails, and both failures are
    /// reported together.
    pub fn shutdown(&mut self) -> Result<()> {
        let killed = if self.is_running() {
            self.child.kill()
        } else {
            Ok(())
        };
        let waited = self.child.wait().map(|_| ());

        let mut failures = Vec::new();
        if let Err(e) = killed {
            failures.push(format!("kill: {e}"));
        }
        if let Err(e) = waited {
            failures.push(format!("wait: {e}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::connection(failures.join("; ")))
        }
    }
}
