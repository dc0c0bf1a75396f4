//! Graphical surface trial initialization
//!
//! The probe only asks one question of a toolkit: can it initialize against
//! the current session? [`SocketToolkit`] answers it by connecting to the
//! display server named in the environment.
//!
//! `DISPLAY` is read as an X11 address. Every other display variable names
//! a Wayland-style socket, either absolute or relative to `XDG_RUNTIME_DIR`.

use crate::config::EnvoyConfig;
use crate::guard::SessionEnv;
use std::ffi::OsStr;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory holding local X11 server sockets
const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// First TCP port used by X11 displays
const X11_TCP_BASE: u16 = 6000;

/// Variable read as an X11 address
const X11_DISPLAY_VAR: &str = "DISPLAY";

/// A graphical toolkit that can be trial-initialized
pub trait SurfaceToolkit {
    /// Attempt initialization against the session in `env`
    ///
    /// `argv` is the argument vector handed to the toolkit. Only argv[0] is
    /// ever passed; caller arguments never reach a toolkit's option parser.
    fn init_check(&mut self, argv: &[&OsStr], env: &mut dyn SessionEnv) -> bool;
}

/// Where an X11 display listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X11Endpoint {
    /// Local server, socket number `display`
    Local { display: u16 },
    /// Explicit socket path (launchd-style `DISPLAY`)
    Path(PathBuf),
    /// Remote server over TCP
    Tcp { host: String, port: u16 },
}

/// Parse an X11 display string: `[protocol/][host]:display[.screen]`
pub fn parse_x11_display(display: &str) -> Option<X11Endpoint> {
    if display.starts_with('/') {
        let socket = display.rsplit_once(':').map_or(display, |(path, _)| path);
        return Some(X11Endpoint::Path(PathBuf::from(socket)));
    }

    let (host, rest) = display.rsplit_once(':')?;
    let number = rest.split('.').next()?;
    let display_num: u16 = number.parse().ok()?;

    let (protocol, host) = match host.split_once('/') {
        Some((protocol, host)) => (Some(protocol), host),
        None => (None, host),
    };

    let local = host.is_empty() || host == "unix" || protocol == Some("unix");
    if local {
        return Some(X11Endpoint::Local { display: display_num });
    }

    let port = X11_TCP_BASE.checked_add(display_num)?;
    Some(X11Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

/// Locate the Wayland compositor socket
pub fn wayland_socket(display: &OsStr, runtime_dir: Option<&OsStr>) -> Option<PathBuf> {
    let display = Path::new(display);
    if display.is_absolute() {
        return Some(display.to_path_buf());
    }

    let runtime_dir = runtime_dir.filter(|d| !d.is_empty())?;
    Some(Path::new(runtime_dir).join(display))
}

/// Toolkit that considers the surface available when the display server
/// accepts a connection
#[derive(Debug, Clone)]
pub struct SocketToolkit {
    timeout: Duration,
    display_vars: Vec<String>,
    x11_socket_dir: PathBuf,
}

impl SocketToolkit {
    /// Toolkit reading `display_vars`, in order
    pub fn new(timeout: Duration, display_vars: Vec<String>) -> Self {
        Self {
            timeout,
            display_vars,
            x11_socket_dir: PathBuf::from(X11_SOCKET_DIR),
        }
    }

    /// Toolkit matching the probe's configured display variables
    pub fn from_config(config: &EnvoyConfig) -> Self {
        Self::new(
            Duration::from_millis(config.connect_timeout_ms),
            config.display_vars.clone(),
        )
    }

    /// Look for local X11 sockets somewhere other than `/tmp/.X11-unix`
    pub fn with_x11_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.x11_socket_dir = dir.into();
        self
    }

    fn connect_x11(&self, address: &str) -> bool {
        let Some(endpoint) = parse_x11_display(address) else {
            debug!("Unparseable X11 display {:?}", address);
            return false;
        };

        match endpoint {
            X11Endpoint::Local { display } => {
                let path = self.x11_socket_dir.join(format!("X{}", display));
                connect_unix(&path) || connect_abstract(&path)
            }
            X11Endpoint::Path(path) => connect_unix(&path),
            X11Endpoint::Tcp { host, port } => self.connect_tcp(&host, port),
        }
    }

    fn connect_tcp(&self, host: &str, port: u16) -> bool {
        let Some(addrs) = tcp_addrs(host, port) else {
            return false;
        };

        addrs.into_iter().any(|addr| {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => true,
                Err(e) => {
                    debug!("X11 connect to {} failed: {}", addr, e);
                    false
                }
            }
        })
    }
}

impl Default for SocketToolkit {
    fn default() -> Self {
        Self::from_config(&EnvoyConfig::default())
    }
}

impl SurfaceToolkit for SocketToolkit {
    fn init_check(&mut self, argv: &[&OsStr], env: &mut dyn SessionEnv) -> bool {
        debug!("Trial display connection for {:?}", argv.first());

        self.display_vars.iter().any(|var| {
            let Some(address) = env.non_empty(var) else {
                return false;
            };

            if var == X11_DISPLAY_VAR {
                return self.connect_x11(&address.to_string_lossy());
            }

            let runtime_dir = env.var_os("XDG_RUNTIME_DIR");
            match wayland_socket(&address, runtime_dir.as_deref()) {
                Some(socket) => connect_unix(&socket),
                None => {
                    debug!("{} set but XDG_RUNTIME_DIR is not", var);
                    false
                }
            }
        })
    }
}

/// Addresses for a remote X11 display
///
/// IP literals are used as-is. Any other host goes through the system
/// resolver, which `connect_timeout_ms` does not bound.
fn tcp_addrs(host: &str, port: u16) -> Option<Vec<SocketAddr>> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Some(vec![SocketAddr::new(ip, port)]);
    }

    match (host, port).to_socket_addrs() {
        Ok(addrs) => Some(addrs.collect()),
        Err(e) => {
            debug!("Cannot resolve display host {}: {}", host, e);
            None
        }
    }
}

fn connect_unix(path: &Path) -> bool {
    match UnixStream::connect(path) {
        Ok(_) => true,
        Err(e) => {
            debug!("Connect to {} failed: {}", path.display(), e);
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(path: &Path) -> bool {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::net::SocketAddr;

    SocketAddr::from_abstract_name(path.as_os_str().as_bytes())
        .and_then(|addr| UnixStream::connect_addr(&addr))
        .is_ok()
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_path: &Path) -> bool {
    false
}
