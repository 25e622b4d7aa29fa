//! Local networking helpers for talking to runners on the same host.

use std::io;
use std::net::{IpAddr, Ipv4Addr, TcpListener};

/// Runners are always reached over the loopback interface.
pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Asks the OS for a currently-free port on the loopback interface.
///
/// The port is released before returning, so another process may claim it in the meantime; the
/// caller must hand it to its consumer promptly.
pub fn ephemeral_port() -> io::Result<u16> {
    let listener = TcpListener::bind((LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    Ok(port)
}
