//! Host port allocation.

use std::io;
use std::net::TcpListener;

/// Reserve `count` distinct free TCP ports on the host.
///
/// All listeners are held open together so the kernel cannot hand out the
/// same port twice, then released before returning.
pub fn allocate_ports(count: usize) -> io::Result<Vec<u16>> {
    let listeners = (0..count)
        .map(|_| TcpListener::bind(("0.0.0.0", 0)))
        .collect::<io::Result<Vec<_>>>()?;
    listeners
        .iter()
        .map(|l| l.local_addr().map(|addr| addr.port()))
        .collect()
}
