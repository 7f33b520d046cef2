use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
};

use aether_actions::ActionContext;
use aether_events::Event;
use aether_streams::{
    ByteStream, LinkState, StreamError, StreamInfo, WriteBehavior, WriteHandle,
};
use aether_timing::Duration;
use bytes::Bytes;
use mio::{Interest, Registry, Token, net::UdpSocket};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Largest datagram accepted for one write.
    pub mtu: usize,
    /// Kernel SO_SNDBUF / SO_RCVBUF, if overridden.
    pub socket_buf_size: Option<usize>,
    /// Poll timeout ceiling for the driver loop.
    pub max_poll_wait: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            mtu: 1200,
            socket_buf_size: None,
            max_poll_wait: Duration::from_millis(500),
        }
    }
}

const RECV_BUF_SIZE: usize = 64 * 1024;

/// Connected, non-blocking UDP socket as a datagram byte stream.
///
/// Each write goes out as one datagram, each received datagram fires
/// `out_data_event` once. A send the kernel refuses is backlogged and
/// flushed on the next writable event.
pub struct UdpDatagramStream {
    actions: ActionContext,
    socket: UdpSocket,
    token: Token,
    peer_addr: SocketAddr,
    config: UdpConfig,

    recv_buf: Vec<u8>,
    send_backlog: VecDeque<Bytes>,
    /// Invariant: `writable_armed == !send_backlog.is_empty()`
    writable_armed: bool,

    out_data_event: Event<Bytes>,
    stream_update_event: Event<()>,
}

impl UdpDatagramStream {
    pub fn connect(
        actions: ActionContext,
        registry: &Registry,
        token: Token,
        bind_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: UdpConfig,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(peer_addr)?;
        Self::from_socket(actions, registry, token, socket, peer_addr, config)
    }

    /// Wrap an already bound and connected socket.
    pub fn from_socket(
        actions: ActionContext,
        registry: &Registry,
        token: Token,
        mut socket: UdpSocket,
        peer_addr: SocketAddr,
        config: UdpConfig,
    ) -> io::Result<Self> {
        if let Some(size) = config.socket_buf_size {
            set_socket_buf_size(&socket, size);
        }
        registry.register(&mut socket, token, Interest::READABLE)?;

        debug!(%peer_addr, ?token, "udp stream up");
        Ok(Self {
            actions,
            socket,
            token,
            peer_addr,
            config,
            recv_buf: vec![0; RECV_BUF_SIZE],
            send_backlog: VecDeque::new(),
            writable_armed: false,
            out_data_event: Event::new(),
            stream_update_event: Event::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Drain everything the socket has ready. Returns the received
    /// datagrams; the caller emits them once no borrow is held.
    pub fn drain_readable(&mut self) -> Vec<Bytes> {
        let mut datagrams = Vec::new();
        loop {
            match self.socket.recv(&mut self.recv_buf) {
                Ok(len) => datagrams.push(Bytes::copy_from_slice(&self.recv_buf[..len])),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    // ICMP-induced errors on connected UDP sockets are
                    // transient; the reliability layer rides them out
                    debug!(?err, "udp recv");
                    break;
                }
            }
        }
        datagrams
    }

    /// Flush backlogged datagrams after a writable event.
    pub fn drain_writable(&mut self, registry: &Registry) {
        while let Some(front) = self.send_backlog.front() {
            match self.socket.send(front) {
                Ok(_) => {
                    self.send_backlog.pop_front();
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(?err, "udp send from backlog, dropping datagram");
                    self.send_backlog.pop_front();
                }
            }
        }

        if self.send_backlog.is_empty() && self.writable_armed {
            if let Err(err) =
                registry.reregister(&mut self.socket, self.token, Interest::READABLE)
            {
                warn!(?err, "udp reregister drop writable");
            }
            self.writable_armed = false;
        }
    }

    pub fn out_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn enqueue(&mut self, data: Bytes) {
        self.send_backlog.push_back(data);
    }

    /// Backlogged with no WRITABLE interest yet; the driver arms it on its
    /// next pass since only the driver owns the registry.
    pub fn needs_writable(&self) -> bool {
        !self.send_backlog.is_empty() && !self.writable_armed
    }

    pub fn arm_writable(&mut self, registry: &Registry) {
        if let Err(err) = registry.reregister(
            &mut self.socket,
            self.token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            warn!(?err, "udp arm writable");
            return;
        }
        self.writable_armed = true;
    }
}

impl ByteStream for UdpDatagramStream {
    fn write(&mut self, data: Bytes) -> WriteHandle {
        if data.len() > self.config.mtu {
            return WriteBehavior::failed(
                &self.actions,
                StreamError::WriteTooLarge { size: data.len(), max: self.config.mtu },
            );
        }

        if !self.send_backlog.is_empty() {
            self.enqueue(data);
            return WriteBehavior::done(&self.actions);
        }

        match self.socket.send(&data) {
            Ok(_) => WriteBehavior::done(&self.actions),
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                self.enqueue(data);
                WriteBehavior::done(&self.actions)
            }
            Err(err) => {
                debug!(?err, "udp send, dropping datagram");
                // an unreliable link loses datagrams; the layers above recover
                WriteBehavior::done(&self.actions)
            }
        }
    }

    fn out_data_event(&self) -> Event<Bytes> {
        self.out_data_event.clone()
    }

    fn stream_update_event(&self) -> Event<()> {
        self.stream_update_event.clone()
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            rec_element_size: self.config.mtu,
            max_element_size: self.config.mtu,
            is_reliable: false,
            link_state: LinkState::Linked,
            is_writable: true,
        }
    }
}

/// Set kernel SO_SNDBUF and SO_RCVBUF on a mio UdpSocket.
fn set_socket_buf_size(socket: &UdpSocket, size: usize) {
    use std::os::fd::AsRawFd;
    let fd = socket.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            std::ptr::addr_of!(size).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            std::ptr::addr_of!(size).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
