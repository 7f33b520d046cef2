use std::{cell::RefCell, io, net::SocketAddr, rc::Rc, time::Duration as StdDuration};

use aether_actions::{ActionContext, ActionProcessor};
use aether_timing::{Clock, Instant};
use mio::{Events, Poll, Token};
use tracing::debug;

use crate::udp::{UdpConfig, UdpDatagramStream};

/// Embedder loop for UDP-backed sessions.
///
/// One iteration runs the processor, sleeps in `poll` until the returned
/// deadline or socket readiness, then drains every ready socket and
/// republishes the datagrams. Single-threaded; inbound data wakes the
/// processor through the action triggers the stream handlers set.
pub struct UdpDriver {
    poll: Poll,
    events: Events,
    streams: Vec<Rc<RefCell<UdpDatagramStream>>>,
    clock: Clock,
}

impl UdpDriver {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            streams: Vec::new(),
            clock: Clock::new(),
        })
    }

    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    /// Open a connected datagram stream managed by this driver.
    pub fn connect(
        &mut self,
        actions: ActionContext,
        bind_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: UdpConfig,
    ) -> io::Result<Rc<RefCell<UdpDatagramStream>>> {
        let token = Token(self.streams.len());
        let stream = UdpDatagramStream::connect(
            actions,
            self.poll.registry(),
            token,
            bind_addr,
            peer_addr,
            config,
        )?;
        let stream = Rc::new(RefCell::new(stream));
        self.streams.push(stream.clone());
        Ok(stream)
    }

    /// Adopt an already bound and connected socket.
    pub fn attach_socket(
        &mut self,
        actions: ActionContext,
        socket: mio::net::UdpSocket,
        peer_addr: SocketAddr,
        config: UdpConfig,
    ) -> io::Result<Rc<RefCell<UdpDatagramStream>>> {
        let token = Token(self.streams.len());
        let stream = UdpDatagramStream::from_socket(
            actions,
            self.poll.registry(),
            token,
            socket,
            peer_addr,
            config,
        )?;
        let stream = Rc::new(RefCell::new(stream));
        self.streams.push(stream.clone());
        Ok(stream)
    }

    /// One loop turn: tick the processor, wait for the deadline or I/O,
    /// deliver datagrams. Returns the processor's next wake-up.
    pub fn turn(&mut self, processor: &mut ActionProcessor, max_wait: StdDuration) -> io::Result<Instant> {
        let now = self.clock.now();
        let next_wake = processor.update(now);

        for stream in &self.streams {
            let needs = stream.borrow().needs_writable();
            if needs {
                stream.borrow_mut().arm_writable(self.poll.registry());
            }
        }

        let timeout = if next_wake == Instant::MAX {
            max_wait
        } else {
            StdDuration::from(next_wake.saturating_sub(now)).min(max_wait)
        };

        self.poll.poll(&mut self.events, Some(timeout))?;

        for event in self.events.iter() {
            let Some(stream) = self.streams.get(event.token().0) else {
                debug!(token = event.token().0, "event for an unknown stream");
                continue;
            };

            if event.is_writable() {
                stream.borrow_mut().drain_writable(self.poll.registry());
            }
            if event.is_readable() {
                // emit outside the borrow: handlers may write back
                let (datagrams, out_event) = {
                    let mut inner = stream.borrow_mut();
                    (inner.drain_readable(), inner.out_event())
                };
                for datagram in datagrams {
                    out_event.emit(&datagram);
                }
            }
        }

        Ok(next_wake)
    }

    /// Drive until `stop` returns true.
    pub fn run(
        &mut self,
        processor: &mut ActionProcessor,
        mut stop: impl FnMut() -> bool,
    ) -> io::Result<()> {
        let max_wait = StdDuration::from_millis(500);
        while !stop() {
            self.turn(processor, max_wait)?;
        }
        Ok(())
    }
}
