use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

/// What the window system knows about a window the user is looking at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundWindow {
    /// Owning process, from `_NET_WM_PID`
    pub pid: Option<u32>,
    /// Instance part of `WM_CLASS`
    pub class: Option<String>,
}

/// Source of the windows currently holding user focus
pub trait ForegroundWindows: Send + 'static {
    fn foreground(&mut self) -> Result<Vec<ForegroundWindow>>;
}

struct X11Session {
    conn: RustConnection,
    root: Window,
    active_window: Atom,
    wm_pid: Atom,
}

/// Reads `_NET_ACTIVE_WINDOW` from the X server.
///
/// The connection is opened lazily and dropped after a protocol error, so a
/// missing or restarted display only fails the samples taken meanwhile.
#[derive(Default)]
pub struct X11Windows {
    session: Option<X11Session>,
}

impl X11Windows {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&mut self) -> Result<&X11Session> {
        if self.session.is_none() {
            let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
            let root = conn.setup().roots[screen_num].root;
            let active_window = intern(&conn, "_NET_ACTIVE_WINDOW")?;
            let wm_pid = intern(&conn, "_NET_WM_PID")?;
            self.session = Some(X11Session {
                conn,
                root,
                active_window,
                wm_pid,
            });
        }

        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("X session unavailable"))
    }
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())?
        .reply()
        .with_context(|| format!("Failed to intern {}", name))?
        .atom)
}

fn read_u32(conn: &RustConnection, window: Window, property: Atom, kind: AtomEnum) -> Result<Option<u32>> {
    let reply = conn
        .get_property(false, window, property, kind, 0, 1)?
        .reply()?;
    Ok(reply.value32().and_then(|mut values| values.next()))
}

fn read_class(conn: &RustConnection, window: Window) -> Result<Option<String>> {
    let reply = conn
        .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 256)?
        .reply()?;
    Ok(reply
        .value
        .split(|b| *b == 0)
        .next()
        .filter(|instance| !instance.is_empty())
        .map(|instance| String::from_utf8_lossy(instance).to_string()))
}

fn query_active(session: &X11Session) -> Result<Vec<ForegroundWindow>> {
    let conn = &session.conn;
    let active = read_u32(conn, session.root, session.active_window, AtomEnum::WINDOW)?;

    let Some(window) = active.filter(|w| *w != 0) else {
        return Ok(Vec::new());
    };

    Ok(vec![ForegroundWindow {
        pid: read_u32(conn, window, session.wm_pid, AtomEnum::CARDINAL)?,
        class: read_class(conn, window)?,
    }])
}

impl ForegroundWindows for X11Windows {
    fn foreground(&mut self) -> Result<Vec<ForegroundWindow>> {
        let result = query_active(self.session()?);
        if result.is_err() {
            self.session = None;
        }
        result
    }
}
