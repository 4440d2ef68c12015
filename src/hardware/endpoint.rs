//! TCP rendezvous endpoint and the anchor-side range sender

use crate::core::{current_time_ms, RangeEstimate, ACCEPT_POLL_INTERVAL_MS, RECORD_LEN};
use crate::hardware::{is_connection_error, IncomingReport, ReportChannel};
use crate::processing::parser::encode_record;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bind the rendezvous listener with address reuse enabled.
///
/// The endpoint may still be held in TIME_WAIT by a previous run that was
/// terminated without closing it.
pub fn bind_rendezvous(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Connection statistics of the rendezvous endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointStatus {
    pub connections_accepted: u32,
    pub read_errors: u32,
    pub last_connection_time: Option<u64>,
}

/// Report channel reading one record per TCP connection
pub struct TcpReportChannel {
    listener: TcpListener,
    local_addr: SocketAddr,
    read_timeout: Duration,
    status: EndpointStatus,
}

impl TcpReportChannel {
    /// Bind a new endpoint at `addr`
    pub fn bind(addr: SocketAddr, backlog: i32, read_timeout: Duration) -> io::Result<Self> {
        let listener = bind_rendezvous(addr, backlog)?;
        Self::from_listener(listener, read_timeout)
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, read_timeout: Duration) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            read_timeout,
            status: EndpointStatus::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn status(&self) -> &EndpointStatus {
        &self.status
    }

    /// Read one record from the connection, plus one byte to expose over-long
    /// payloads.
    ///
    /// Anything other than exactly one record is returned as-is for the
    /// decoder to reject.
    fn read_payload(&mut self, stream: TcpStream, peer: SocketAddr, deadline: Instant) -> Vec<u8> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = self.read_timeout.min(remaining).max(Duration::from_millis(1));

        let mut payload = Vec::with_capacity(RECORD_LEN);
        let prepared = stream
            .set_nonblocking(false)
            .and_then(|_| stream.set_read_timeout(Some(timeout)));
        if let Err(e) = prepared {
            self.status.read_errors += 1;
            debug!(%peer, error = %e, "could not prepare report connection");
            return payload;
        }

        if let Err(e) = (&stream).take(RECORD_LEN as u64 + 1).read_to_end(&mut payload) {
            self.status.read_errors += 1;
            debug!(%peer, error = %e, bytes = payload.len(), "report read ended early");
        }
        payload
    }
}

impl ReportChannel for TcpReportChannel {
    fn next_report(&mut self, deadline: Instant) -> io::Result<Option<IncomingReport>> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let now_ms = current_time_ms();
                    self.status.connections_accepted += 1;
                    self.status.last_connection_time = Some(now_ms);

                    let payload = self.read_payload(stream, peer, deadline);
                    return Ok(Some(IncomingReport::new(peer.ip(), payload).with_timestamp(now_ms)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    let poll = Duration::from_millis(ACCEPT_POLL_INTERVAL_MS);
                    std::thread::sleep(poll.min(deadline - now));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_connection_error(e.kind()) => {
                    self.status.read_errors += 1;
                    warn!(error = %e, "sender connection failed before accept");
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn discard_pending(&mut self) -> io::Result<usize> {
        let mut dropped = 0;
        loop {
            match self.listener.accept() {
                Ok((_stream, peer)) => {
                    dropped += 1;
                    debug!(%peer, "discarding report left over from a closed round");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(dropped),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_connection_error(e.kind()) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.local_addr)
    }
}

/// Send one range record to the collector over a fresh connection.
///
/// `bind_ip` selects the local address the collector will see as this
/// anchor's identity.
pub fn send_range_report(
    collector: SocketAddr,
    range: RangeEstimate,
    bind_ip: Option<IpAddr>,
    timeout: Duration,
) -> io::Result<()> {
    let domain = match collector {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if let Some(ip) = bind_ip {
        let bind_addr = SocketAddr::new(ip, 0);
        socket.bind(&bind_addr.into())?;
    }
    socket.connect_timeout(&SockAddr::from(collector), timeout)?;
    socket.set_write_timeout(Some(timeout))?;

    let mut stream: TcpStream = socket.into();
    stream.write_all(&encode_record(range))?;
    stream.flush()?;
    Ok(())
}
