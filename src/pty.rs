//! PTY process spawning and the non-blocking master handle.
//!
//! The master's raw file descriptor is duplicated out of the
//! `portable_pty` pair and owned directly so it can be driven through
//! `tokio::io::unix::AsyncFd` inside a single `tokio::select!` loop.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::io::unix::AsyncFd;

/// A live, non-blocking handle to a PTY master descriptor.
pub struct PtyMaster {
    fd: AsyncFd<OwnedFd>,
}

impl PtyMaster {
    fn from_owned(fd: OwnedFd) -> Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            fd: AsyncFd::new(fd).context("registering PTY master with the reactor")?,
        })
    }

    /// Non-blocking read. Returns `Ok(0)` on EOF, matching the semantics
    /// the Session's event loop expects.
    pub async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| raw_read(inner.as_raw_fd(), buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Writes the full buffer, looping over partial writes.
    pub async fn write_all(&self, mut data: &[u8]) -> std::io::Result<()> {
        while !data.is_empty() {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| raw_write(inner.as_raw_fd(), data)) {
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Sets the PTY window size, delivering SIGWINCH to the foreground
    /// process group the way a real terminal resize would.
    pub fn resize(&self, rows: u16, cols: u16) -> std::io::Result<()> {
        #[repr(C)]
        struct Winsize {
            ws_row: u16,
            ws_col: u16,
            ws_xpixel: u16,
            ws_ypixel: u16,
        }

        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let rc = unsafe {
            libc::ioctl(
                self.fd.get_ref().as_raw_fd(),
                libc::TIOCSWINSZ,
                &winsize as *const Winsize,
            )
        };
        if rc < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

fn raw_read(fd: i32, buf: &mut [u8]) -> std::io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn raw_write(fd: i32, buf: &[u8]) -> std::io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn set_nonblocking(fd: &OwnedFd) -> Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(anyhow!(std::io::Error::last_os_error()).context("fcntl F_GETFL"));
    }
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(anyhow!(std::io::Error::last_os_error()).context("fcntl F_SETFL"));
    }
    Ok(())
}

/// Outcome of attempting to bring up a PTY-backed child process.
pub enum SpawnOutcome {
    /// The PTY opened and the child was spawned successfully. `child` is
    /// kept alive only to hold the slave-side resources open for the
    /// child's lifetime; exit status is read independently via
    /// `nix::sys::wait::waitpid` on `pid`, not through `child`.
    Live {
        master: PtyMaster,
        pid: i32,
        child: Box<dyn portable_pty::Child + Send>,
    },
    /// The PTY opened but the child could not be exec'd (bad program,
    /// missing binary, permission denied). Collapses "fork fails" and
    /// "exec fails" into a single outcome: no live child exists, and the
    /// caller should report exit code 127 without ever entering the I/O
    /// loop.
    ExecFailed,
}

/// Opens a PTY and spawns `command[0]` with the remaining elements as
/// argv.
pub fn spawn(command: &[String]) -> Result<SpawnOutcome> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|source| crate::error::WatchdError::PtySpawn {
            command: command.to_vec(),
            source: anyhow!(source.to_string()),
        })?;

    let mut cmd = CommandBuilder::new(&command[0]);
    cmd.args(&command[1..]);
    if let Some(home) = std::env::var_os("HOME") {
        cmd.env("HOME", home);
    }
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }

    let spawned = pair.slave.spawn_command(cmd);
    drop(pair.slave);

    let child = match spawned {
        Ok(child) => child,
        Err(_) => return Ok(SpawnOutcome::ExecFailed),
    };

    let pid = child
        .process_id()
        .ok_or_else(|| anyhow!("spawned child reported no process id"))? as i32;

    let master_fd = pair
        .master
        .as_raw_fd()
        .ok_or_else(|| anyhow!("PTY master has no raw file descriptor"))?;
    let dup_fd = unsafe { libc::dup(master_fd) };
    if dup_fd < 0 {
        return Err(anyhow!(std::io::Error::last_os_error()).context("dup PTY master fd"));
    }
    drop(pair.master);

    let owned = unsafe { OwnedFd::from_raw_fd(dup_fd) };
    let master = PtyMaster::from_owned(owned)?;

    Ok(SpawnOutcome::Live { master, pid, child })
}
