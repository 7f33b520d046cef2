use std::{cell::RefCell, rc::Rc};

use aether_client::{
    AuthorizedApi, ClientCloudConnection, ClientRootApi, ClientSafeApi, ClientServerConnection,
    ClientToServerStream, MessageStreamDispatcher, PingBehavior, PingConfig,
    ServerConnectionProvider, SplitStreamConnection, Uid,
};
use aether_codec::{Packable, Packer, RequestId, ReturnResultApi, Unpacker};
use aether_crypto::{
    DecryptProvider, EncryptProvider, SharedKeyDecryptProvider, SharedKeyEncryptProvider,
};
use aether_safe_stream::{
    DataMessage, INIT, SEND, SafeStreamConfig, SafeStreamInit, SafeStreamWire, SsRingIndex,
};
use aether_streams::{ByteStream, StreamError, StreamHandle};
use aether_testkit::{Harness, MockStream};
use aether_timing::Duration;
use bytes::Bytes;

const C2S_KEY: [u8; 32] = [0x11; 32];
const S2C_KEY: [u8; 32] = [0x22; 32];

fn client_uid() -> Uid {
    Uid([0xC1; 16])
}

fn peer_uid() -> Uid {
    Uid([0xEE; 16])
}

fn make_client(harness: &Harness) -> (Rc<ClientToServerStream>, Rc<RefCell<MockStream>>) {
    let transport = MockStream::new(harness.actions(), 1200);
    let connection = Rc::new(ClientToServerStream::new(
        harness.actions(),
        client_uid(),
        Box::new(SharedKeyEncryptProvider::new(&C2S_KEY)),
        Box::new(SharedKeyDecryptProvider::new(&S2C_KEY)),
        SafeStreamConfig::default(),
    ));
    let handle: StreamHandle = transport.clone();
    connection.link_transport(handle);
    (connection, transport)
}

/// Scripted work-server endpoint: decrypts and unwraps client datagrams,
/// answers with encrypted `SendSafeApiData` frames carrying its own
/// implicit safe-stream session.
struct TestServer {
    decrypt: SharedKeyDecryptProvider,
    encrypt: SharedKeyEncryptProvider,
    next_offset: u16,
    cursor: usize,
    seen_login: bool,
}

impl TestServer {
    fn new() -> Self {
        Self {
            decrypt: SharedKeyDecryptProvider::new(&C2S_KEY),
            encrypt: SharedKeyEncryptProvider::new(&S2C_KEY),
            next_offset: 0,
            cursor: 0,
            seen_login: false,
        }
    }

    /// Decrypt the next unread client datagram. The first one carries the
    /// login frame; everything after is a bare safe-stream packet.
    fn next_packet(&mut self, transport: &Rc<RefCell<MockStream>>) -> Option<Bytes> {
        let written = transport.borrow().written();
        let datagram = written.get(self.cursor)?.clone();
        self.cursor += 1;

        let plain = self.decrypt.decrypt(&datagram).expect("client datagram must decrypt");
        if !self.seen_login {
            self.seen_login = true;
            assert_eq!(plain[0], aether_client::LOGIN_BY_UID);
            let mut unpacker = Unpacker::new(&plain[1..]);
            let uid = Uid::unpack(&mut unpacker).unwrap();
            assert_eq!(uid, client_uid(), "login carries the client identity");
            return Some(unpacker.read_buffer().unwrap());
        }
        Some(plain)
    }

    /// Wrap a packet the way the server relays safe-api data, encrypted.
    fn wrap(&mut self, packet: Bytes) -> Bytes {
        let mut packer = Packer::new();
        ClientRootApi::send_safe_api_data(&mut packer, client_uid(), &packet);
        self.encrypt.encrypt(&packer.into_bytes()).unwrap()
    }

    fn inject(&mut self, transport: &Rc<RefCell<MockStream>>, packet: Bytes) {
        let datagram = self.wrap(packet);
        transport.borrow().inject(datagram);
    }

    /// Answer a client `Init` with a matching ack.
    fn ack_init(&mut self, transport: &Rc<RefCell<MockStream>>, init_packet: &Bytes) {
        assert_eq!(init_packet[0], INIT);
        let mut unpacker = Unpacker::new(&init_packet[1..]);
        let request_id = RequestId::unpack(&mut unpacker).unwrap();
        let _repeat_count = unpacker.read_u16().unwrap();
        let init = SafeStreamInit::unpack(&mut unpacker).unwrap();

        let mut packer = Packer::new();
        SafeStreamWire::init_ack(&mut packer, request_id, init);
        self.inject(transport, packer.into_bytes());
    }

    /// Parse a client `Send`, confirm it, and return the app payload.
    fn accept_send(&mut self, transport: &Rc<RefCell<MockStream>>, packet: &Bytes) -> Bytes {
        assert_eq!(packet[0], SEND);
        let mut unpacker = Unpacker::new(&packet[1..]);
        let message = DataMessage::unpack(&mut unpacker).unwrap();

        let last = message.offset + (message.data.len() as u16 - 1);
        let mut packer = Packer::new();
        SafeStreamWire::confirm(&mut packer, last);
        self.inject(transport, packer.into_bytes());
        message.data
    }

    /// Deliver a packet through the server's own (implicit) safe session.
    fn safe_send(&mut self, transport: &Rc<RefCell<MockStream>>, payload: Bytes) {
        let message = DataMessage {
            repeat_count: 0,
            reset: false,
            offset: SsRingIndex(self.next_offset),
            data: payload,
        };
        self.next_offset += message.data.len() as u16;
        let mut packer = Packer::new();
        SafeStreamWire::data(&mut packer, &message);
        self.inject(transport, packer.into_bytes());
    }

    /// Run the handshake: expect an Init as the next packet and ack it.
    fn complete_handshake(&mut self, transport: &Rc<RefCell<MockStream>>) {
        let init = self.next_packet(transport).expect("client must have sent its init");
        self.ack_init(transport, &init);
    }
}

#[test]
fn login_then_relayed_message_round_trip() {
    let mut harness = Harness::new();
    let (connection, transport) = make_client(&harness);
    let mut server = TestServer::new();

    let dispatcher = MessageStreamDispatcher::new(connection.clone());
    let stream = dispatcher.message_stream(peer_uid());
    let write = stream.borrow_mut().write(Bytes::from_static(b"hello peer"));
    let resolved = Rc::new(RefCell::new(false));
    let sink = resolved.clone();
    let _sub = write.result_event().subscribe(move |()| *sink.borrow_mut() = true);

    harness.settle_processor();
    server.complete_handshake(&transport);
    harness.settle_processor();

    let data_packet = server.next_packet(&transport).expect("payload follows the handshake");
    let payload = server.accept_send(&transport, &data_packet);
    assert_eq!(payload[0], AuthorizedApi::SEND_MESSAGE);
    let mut unpacker = Unpacker::new(&payload[1..]);
    assert_eq!(Uid::unpack(&mut unpacker).unwrap(), peer_uid());
    assert_eq!(unpacker.read_buffer().unwrap().as_ref(), b"hello peer");

    harness.settle_processor();
    assert!(*resolved.borrow(), "confirm resolves the relayed write");
}

#[test]
fn inbound_peer_message_creates_a_stream() {
    let mut harness = Harness::new();
    let (connection, transport) = make_client(&harness);
    let mut server = TestServer::new();

    let dispatcher = MessageStreamDispatcher::new(connection.clone());
    let announced = Rc::new(RefCell::new(Vec::new()));
    let sink = announced.clone();
    let _new_sub = dispatcher.new_stream_event().subscribe(move |(uid, _stream)| {
        sink.borrow_mut().push(*uid);
    });

    let mut packer = Packer::new();
    ClientSafeApi::send_message(&mut packer, peer_uid(), &Bytes::from_static(b"hi from peer"));
    server.safe_send(&transport, packer.into_bytes());
    harness.settle_processor();

    assert_eq!(*announced.borrow(), vec![peer_uid()]);
    assert_eq!(dispatcher.stream_count(), 1);

    // a second message reuses the stream
    let stream = dispatcher.message_stream(peer_uid());
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let _data_sub = stream
        .borrow()
        .out_data_event()
        .subscribe(move |data: &Bytes| sink.borrow_mut().push(data.clone()));

    let mut packer = Packer::new();
    ClientSafeApi::send_message(&mut packer, peer_uid(), &Bytes::from_static(b"again"));
    server.safe_send(&transport, packer.into_bytes());
    harness.settle_processor();

    assert_eq!(announced.borrow().len(), 1);
    assert_eq!(received.borrow()[0].as_ref(), b"again");
}

#[test]
fn ping_measures_rtt_then_detects_a_dead_server() {
    let mut harness = Harness::new();
    let (connection, transport) = make_client(&harness);
    let mut server = TestServer::new();

    let config = PingConfig {
        interval: Duration::from_millis(100),
        max_repeat_count: 2,
        base_response_timeout: Duration::from_millis(50),
    };
    let ping = harness.actions().spawn(PingBehavior::new(connection.clone(), config));
    let error = Rc::new(RefCell::new(None));
    let sink = error.clone();
    let _error_sub = ping.error_event().subscribe(move |err| *sink.borrow_mut() = Some(*err));

    harness.settle_processor();
    server.complete_handshake(&transport);
    harness.settle_processor();

    // answer the first ping
    let packet = server.next_packet(&transport).expect("first ping");
    let payload = server.accept_send(&transport, &packet);
    assert_eq!(payload[0], AuthorizedApi::PING);
    let mut unpacker = Unpacker::new(&payload[1..]);
    let request_id = RequestId::unpack(&mut unpacker).unwrap();

    let mut packer = Packer::new();
    ReturnResultApi::send_result(&mut packer, request_id, &());
    server.safe_send(&transport, packer.into_bytes());
    harness.settle_processor();
    assert!(error.borrow().is_none());

    // server goes silent: interval elapses, retries exhaust
    for _ in 0..40 {
        harness.now += Duration::from_millis(25);
        harness.settle_processor();
    }
    assert_eq!(*error.borrow(), Some(StreamError::ConnectionLost));
    assert!(ping.is_finished());
}

#[test]
fn cloud_fails_over_when_the_server_dies() {
    struct ScriptedCloud {
        actions: aether_actions::ActionContext,
        transports: Rc<RefCell<Vec<Rc<RefCell<MockStream>>>>>,
    }

    impl ServerConnectionProvider for ScriptedCloud {
        fn connection_count(&self) -> usize {
            2
        }

        fn connect(&mut self, _index: usize) -> Option<Rc<ClientServerConnection>> {
            let transport = MockStream::new(self.actions.clone(), 1200);
            self.transports.borrow_mut().push(transport.clone());

            let stream = Rc::new(ClientToServerStream::new(
                self.actions.clone(),
                client_uid(),
                Box::new(SharedKeyEncryptProvider::new(&C2S_KEY)),
                Box::new(SharedKeyDecryptProvider::new(&S2C_KEY)),
                SafeStreamConfig::default(),
            ));
            let handle: StreamHandle = transport;
            stream.link_transport(handle);

            let ping_config = PingConfig {
                interval: Duration::from_millis(50),
                max_repeat_count: 1,
                base_response_timeout: Duration::from_millis(20),
            };
            Some(Rc::new(ClientServerConnection::new(stream, ping_config)))
        }
    }

    let mut harness = Harness::new();
    let transports = Rc::new(RefCell::new(Vec::new()));
    let cloud = ClientCloudConnection::new(
        harness.actions(),
        Box::new(ScriptedCloud { actions: harness.actions(), transports: transports.clone() }),
    );
    assert_eq!(cloud.current_server_index(), Some(0));

    let opened = cloud.create_stream(peer_uid()).expect("a live server accepts streams");
    assert_eq!(opened.0 % 2, 1, "locally opened streams take odd ids");

    harness.settle_processor();
    assert_eq!(transports.borrow().len(), 1);
    assert!(transports.borrow()[0].borrow().written_count() > 0, "first server saw traffic");

    // nobody answers the pings: the keepalive gives up and the cloud moves on
    for _ in 0..12 {
        harness.now += Duration::from_millis(10);
        harness.settle_processor();
        if transports.borrow().len() > 1 {
            break;
        }
    }

    assert!(transports.borrow().len() >= 2, "a second server connection was built");
    harness.settle_processor();
    let second = transports.borrow()[1].clone();
    assert!(second.borrow().written_count() > 0, "traffic moved to the second server");
}

#[test]
fn split_streams_share_one_peer_stream() {
    let mut harness = Harness::new();
    let transport = MockStream::new(harness.actions(), 1200);
    let handle: StreamHandle = transport.clone();
    let connection = SplitStreamConnection::new(harness.actions(), handle);

    let (first_id, first) = connection.create_stream();
    let (second_id, second) = connection.create_stream();
    assert_eq!(first_id % 2, 1);
    assert_eq!(second_id, first_id + 2);

    first.borrow_mut().write(Bytes::from_static(b"one"));
    second.borrow_mut().write(Bytes::from_static(b"two"));
    harness.settle_processor();

    let written = transport.borrow().written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0][1], first_id, "stream id rides in the wrapper");
    assert_eq!(written[1][1], second_id);

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let _sub = first
        .borrow()
        .out_data_event()
        .subscribe(move |data: &Bytes| sink.borrow_mut().push(data.clone()));

    // peer data for the first stream only
    let mut packer = Packer::new();
    packer.write_message_id(aether_streams::STREAM_MESSAGE);
    packer.write_u8(first_id);
    packer.write_buffer(b"reply");
    transport.borrow().inject(packer.into_bytes());

    assert_eq!(received.borrow().len(), 1);
    assert_eq!(received.borrow()[0].as_ref(), b"reply");
}
