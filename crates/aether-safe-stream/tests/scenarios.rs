use std::{cell::RefCell, rc::Rc};

use aether_events::Subscription;
use aether_safe_stream::{
    REPEAT, SEND, SafeStream, SafeStreamConfig, SafeStreamInit, SafeStreamWire, SsRingIndex,
};
use aether_streams::{ByteStream, LinkStream, StreamError, tie};
use aether_testkit::{FaultAction, Harness, LoopbackLink, MockStream, random_delay};
use aether_timing::Duration;
use bytes::Bytes;

fn pair(
    harness: &Harness,
    config: SafeStreamConfig,
    mtu: usize,
) -> (Rc<RefCell<SafeStream>>, Rc<RefCell<SafeStream>>, LoopbackLink) {
    let link = LoopbackLink::new(&harness.actions(), mtu);
    let a = SafeStream::new(harness.actions(), config);
    let b = SafeStream::new(harness.actions(), config);
    tie!(a, link.a());
    tie!(b, link.b());
    (a, b, link)
}

fn collect_bytes(stream: &Rc<RefCell<SafeStream>>) -> (Rc<RefCell<Vec<u8>>>, Subscription) {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let sink = buf.clone();
    let sub = stream
        .borrow()
        .out_data_event()
        .subscribe(move |data: &Bytes| sink.borrow_mut().extend_from_slice(data));
    (buf, sub)
}

fn count_data_packets(packets: &[Bytes]) -> (usize, usize) {
    let sends = packets.iter().filter(|p| p[0] == SEND).count();
    let repeats = packets.iter().filter(|p| p[0] == REPEAT).count();
    (sends, repeats)
}

#[test]
fn s1_happy_path() {
    let mut harness = Harness::new();
    let (a, b, link) = pair(&harness, SafeStreamConfig::default(), 1200);
    let (received, _sub) = collect_bytes(&b);

    let payload = b"If it works, it works! If it doesn't, it doesn't!";
    let write = a.borrow_mut().write(Bytes::from_static(payload));
    let resolved = Rc::new(RefCell::new(false));
    let sink = resolved.clone();
    let _write_sub = write.result_event().subscribe(move |()| *sink.borrow_mut() = true);

    harness.settle(&link);
    assert_eq!(received.borrow().as_slice(), payload, "payload delivered on first exchange");

    // receiver batches its ack for send_confirm_timeout
    harness.advance(&link, Duration::from_millis(10));
    assert!(*resolved.borrow(), "write resolves once the ack lands");
}

#[test]
fn s2_first_transmission_lost() {
    let mut harness = Harness::new();
    let (a, b, link) = pair(&harness, SafeStreamConfig::default(), 1200);
    let (received, _sub) = collect_bytes(&b);

    // fresh sends all die; only retransmissions get through
    link.set_fault_a_to_b(|packet: &Bytes| {
        if packet[0] == SEND { FaultAction::Drop } else { FaultAction::Deliver }
    });

    let payload = b"retried payload";
    let _write = a.borrow_mut().write(Bytes::from_static(payload));

    harness.settle(&link);
    assert!(received.borrow().is_empty());

    harness.run_for(&link, Duration::from_millis(160), Duration::from_millis(10));
    assert_eq!(received.borrow().as_slice(), payload);

    let (sends, repeats) = count_data_packets(&link.sent_a_to_b());
    assert_eq!(sends, 1);
    assert!(repeats >= 1, "payload arrived via a repeat");
}

#[test]
fn s3_reordering_delays_keep_order() {
    let mut harness = Harness::new();
    let (a, b, link) = pair(&harness, SafeStreamConfig::default(), 1200);
    let (received, _sub) = collect_bytes(&b);

    link.set_fault_a_to_b(random_delay(7, 0.2, Duration::from_millis(50)));
    link.set_fault_b_to_a(random_delay(11, 0.2, Duration::from_millis(50)));

    let payload = b"Pure refreshment in every drop";
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut subs = Vec::new();
    for index in 0..100u32 {
        let write = a.borrow_mut().write(Bytes::from_static(payload));
        let sink = order.clone();
        subs.push(write.result_event().subscribe(move |()| sink.borrow_mut().push(index)));
    }

    harness.run_for(&link, Duration::from_secs(3), Duration::from_millis(5));

    assert_eq!(order.borrow().len(), 100, "every write resolved");
    assert!(order.borrow().windows(2).all(|w| w[0] < w[1]), "results in submission order");

    let expected: Vec<u8> = payload.iter().copied().cycle().take(payload.len() * 100).collect();
    assert_eq!(*received.borrow(), expected, "delivered in order, no loss, no duplicates");
}

#[test]
fn s4_window_saturation() {
    let mut harness = Harness::new();
    let config = SafeStreamConfig {
        window_size: 1056,
        max_packet_size: 352,
        ..SafeStreamConfig::default()
    };

    let mock = MockStream::new(harness.actions(), 1200);
    let stream = SafeStream::new(harness.actions(), config);
    tie!(stream, mock);

    for _ in 0..4 {
        stream.borrow_mut().write(Bytes::from(vec![0xAA; 352]));
    }
    harness.settle_processor();

    // only the handshake went out so far
    let init_packet = mock.borrow().written()[0].clone();
    assert_eq!(init_packet[0], aether_safe_stream::INIT);
    let request_id = u16::from_le_bytes([init_packet[1], init_packet[2]]);

    let mut packer = aether_codec::Packer::new();
    SafeStreamWire::init_ack(
        &mut packer,
        aether_codec::RequestId(request_id),
        SafeStreamInit { offset: 0, window_size: 1056, max_packet_size: 352 },
    );
    mock.borrow().inject(packer.into_bytes());
    harness.settle_processor();

    let (sends, _) = count_data_packets(&mock.borrow().written());
    assert_eq!(sends, 3, "window admits exactly three packets");

    // ack the first packet: 352 bytes, offsets 0..=351
    let mut packer = aether_codec::Packer::new();
    SafeStreamWire::confirm(&mut packer, SsRingIndex(351));
    mock.borrow().inject(packer.into_bytes());
    harness.settle_processor();

    let (sends, _) = count_data_packets(&mock.borrow().written());
    assert_eq!(sends, 4, "freed window admits the fourth packet");
}

#[test]
fn s5_blackout_exhausts_repeats() {
    let mut harness = Harness::new();
    let config = SafeStreamConfig { max_repeat_count: 3, ..SafeStreamConfig::default() };
    let (a, b, link) = pair(&harness, config, 1200);
    let (_received, _sub) = collect_bytes(&b);

    // establish the session, then cut the link
    let _warmup = a.borrow_mut().write(Bytes::from_static(b"warmup"));
    harness.run_for(&link, Duration::from_millis(30), Duration::from_millis(10));
    link.set_fault_a_to_b(|_: &Bytes| FaultAction::Drop);
    link.set_fault_b_to_a(|_: &Bytes| FaultAction::Drop);
    let baseline = link.sent_a_to_b().len();

    let write = a.borrow_mut().write(Bytes::from_static(b"into the void"));
    let error = Rc::new(RefCell::new(None));
    let sink = error.clone();
    let _error_sub = write.error_event().subscribe(move |err| *sink.borrow_mut() = Some(*err));

    // backoff schedule at 50ms base, factor 2: 50, 150, 350, 650
    harness.run_for(&link, Duration::from_millis(800), Duration::from_millis(10));

    assert_eq!(*error.borrow(), Some(StreamError::MaxRepeatExceeded));

    let attempts: Vec<Bytes> = link.sent_a_to_b()[baseline..].to_vec();
    let (sends, repeats) = count_data_packets(&attempts);
    assert_eq!(sends, 1);
    assert_eq!(repeats, 3, "one transmission per budget step");
}

#[test]
fn s6_session_reset_replaces_sender() {
    let mut harness = Harness::new();
    let (a, b, link) = pair(&harness, SafeStreamConfig::default(), 1200);
    let (received, _sub) = collect_bytes(&b);

    let resets = Rc::new(RefCell::new(0));
    let sink = resets.clone();
    let _reset_sub = b.borrow().session_reset_event().subscribe(move |()| *sink.borrow_mut() += 1);

    a.borrow_mut().write(Bytes::from_static(b"first session|"));
    harness.run_for(&link, Duration::from_millis(40), Duration::from_millis(10));
    assert_eq!(received.borrow().as_slice(), b"first session|");

    // replace the sender endpoint entirely
    a.borrow_mut().unlink();
    let fresh = SafeStream::new(harness.actions(), SafeStreamConfig::default());
    tie!(fresh, link.a());

    fresh.borrow_mut().write(Bytes::from_static(b"second session"));
    harness.run_for(&link, Duration::from_millis(60), Duration::from_millis(10));

    assert_eq!(*resets.borrow(), 1, "receiver noticed the new session");
    assert_eq!(received.borrow().as_slice(), b"first session|second session");
}

#[test]
fn large_payload_is_chunked_and_reassembled() {
    let mut harness = Harness::new();
    let (a, b, link) = pair(&harness, SafeStreamConfig::default(), 1200);
    let (received, _sub) = collect_bytes(&b);

    let payload: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    let write = a.borrow_mut().write(Bytes::from(payload.clone()));
    let resolved = Rc::new(RefCell::new(false));
    let sink = resolved.clone();
    let _write_sub = write.result_event().subscribe(move |()| *sink.borrow_mut() = true);

    harness.run_for(&link, Duration::from_millis(100), Duration::from_millis(5));

    assert_eq!(*received.borrow(), payload);
    assert!(*resolved.borrow());

    let (sends, _) = count_data_packets(&link.sent_a_to_b());
    assert_eq!(sends, 10, "2000 bytes in 200-byte packets");
}

#[test]
fn oversized_write_is_rejected() {
    let mut harness = Harness::new();
    let (a, _b, link) = pair(&harness, SafeStreamConfig::default(), 1200);

    let write = a.borrow_mut().write(Bytes::from(vec![0u8; 40_000]));
    let error = Rc::new(RefCell::new(None));
    let sink = error.clone();
    let _error_sub = write.error_event().subscribe(move |err| *sink.borrow_mut() = Some(*err));

    harness.settle(&link);
    assert!(matches!(*error.borrow(), Some(StreamError::WriteTooLarge { .. })));
}
