//! TCP plumbing: one connection per dialog.

use crate::error::{Result, SyncError};
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

async fn resolve(ip: &str, port: u16) -> Result<SocketAddr> {
    lookup_host((ip, port))
        .await?
        .next()
        .ok_or_else(|| SyncError::Config(format!("Address {}:{} did not resolve", ip, port)))
}

/// Open a fresh connection to the receiver.
pub async fn connect(ip: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((ip, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bind the receiver's listening socket.
pub async fn bind(ip: &str, port: u16, backlog: u32) -> Result<TcpListener> {
    let addr = resolve(ip, port).await?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(backlog)?)
}
