use std::{cell::RefCell, rc::Rc, time::Duration as StdDuration};

use aether_actions::ActionProcessor;
use aether_safe_stream::{SafeStream, SafeStreamConfig};
use aether_streams::{ByteStream, LinkStream, tie};
use aether_transport::{UdpConfig, UdpDriver};
use bytes::Bytes;
use mio::net::UdpSocket;

fn socket_pair() -> (UdpSocket, UdpSocket) {
    let first = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let second = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let first_addr = first.local_addr().unwrap();
    let second_addr = second.local_addr().unwrap();
    first.connect(second_addr).unwrap();
    second.connect(first_addr).unwrap();
    (first, second)
}

#[test]
fn datagrams_cross_the_loopback() {
    let mut driver = UdpDriver::new().unwrap();
    let mut processor = ActionProcessor::new();
    let actions = processor.context();

    let (sock_a, sock_b) = socket_pair();
    let peer_a = sock_a.local_addr().unwrap();
    let peer_b = sock_b.local_addr().unwrap();
    let a = driver.attach_socket(actions.clone(), sock_a, peer_b, UdpConfig::default()).unwrap();
    let b = driver.attach_socket(actions, sock_b, peer_a, UdpConfig::default()).unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let _sub = b
        .borrow()
        .out_data_event()
        .subscribe(move |data: &Bytes| sink.borrow_mut().push(data.clone()));

    a.borrow_mut().write(Bytes::from_static(b"over the kernel"));

    for _ in 0..100 {
        driver.turn(&mut processor, StdDuration::from_millis(5)).unwrap();
        if !received.borrow().is_empty() {
            break;
        }
    }
    assert_eq!(received.borrow()[0].as_ref(), b"over the kernel");
}

#[test]
fn oversized_datagram_is_rejected() {
    let mut driver = UdpDriver::new().unwrap();
    let mut processor = ActionProcessor::new();
    let actions = processor.context();

    let (sock_a, sock_b) = socket_pair();
    let peer_b = sock_b.local_addr().unwrap();
    let a = driver.attach_socket(actions, sock_a, peer_b, UdpConfig::default()).unwrap();

    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let write = a.borrow_mut().write(Bytes::from(vec![0u8; 5000]));
    let _sub = write.error_event().subscribe(move |err| sink.borrow_mut().push(*err));

    driver.turn(&mut processor, StdDuration::from_millis(1)).unwrap();
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn safe_stream_session_over_real_sockets() {
    let mut driver = UdpDriver::new().unwrap();
    let mut processor = ActionProcessor::new();
    let actions = processor.context();

    let (sock_a, sock_b) = socket_pair();
    let peer_a = sock_a.local_addr().unwrap();
    let peer_b = sock_b.local_addr().unwrap();
    let transport_a =
        driver.attach_socket(actions.clone(), sock_a, peer_b, UdpConfig::default()).unwrap();
    let transport_b =
        driver.attach_socket(actions.clone(), sock_b, peer_a, UdpConfig::default()).unwrap();

    let a = SafeStream::new(actions.clone(), SafeStreamConfig::default());
    let b = SafeStream::new(actions, SafeStreamConfig::default());
    tie!(a, transport_a);
    tie!(b, transport_b);

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let _sub = b
        .borrow()
        .out_data_event()
        .subscribe(move |data: &Bytes| sink.borrow_mut().extend_from_slice(data));

    let resolved = Rc::new(RefCell::new(false));
    let done = resolved.clone();
    let write = a.borrow_mut().write(Bytes::from_static(b"reliable over udp"));
    let _write_sub = write.result_event().subscribe(move |()| *done.borrow_mut() = true);

    for _ in 0..400 {
        driver.turn(&mut processor, StdDuration::from_millis(5)).unwrap();
        if *resolved.borrow() {
            break;
        }
    }

    assert_eq!(received.borrow().as_slice(), b"reliable over udp");
    assert!(*resolved.borrow());
}
