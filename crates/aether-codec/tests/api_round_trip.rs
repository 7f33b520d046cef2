use std::{cell::RefCell, rc::Rc};

use aether_actions::ActionProcessor;
use aether_codec::{
    ApiHandler, ApiParser, CodecError, Handled, Packable, Packer, ProtocolContext, RequestId,
    ReturnResultApi,
};
use aether_timing::Instant;
use bytes::Bytes;
use proptest::prelude::*;

#[derive(Packable, Debug, Clone, PartialEq, Eq)]
struct Envelope {
    kind: u8,
    sequence: u16,
    tag: [u8; 4],
    payload: Bytes,
    note: String,
}

#[derive(Packable, Debug, Clone, PartialEq, Eq)]
struct Wrapped(u32, Bytes);

#[test]
fn derived_struct_round_trips() {
    let envelope = Envelope {
        kind: 7,
        sequence: 0x0102,
        tag: *b"tag!",
        payload: Bytes::from_static(b"data bytes"),
        note: "hello".into(),
    };

    let mut packer = Packer::new();
    envelope.pack(&mut packer);
    let wire = packer.into_bytes();

    let mut unpacker = aether_codec::Unpacker::new(&wire);
    assert_eq!(Envelope::unpack(&mut unpacker).unwrap(), envelope);
    assert!(unpacker.is_empty());
}

proptest! {
    #[test]
    fn round_trip_any_fields(kind: u8, sequence: u16, tag: [u8; 4], payload in proptest::collection::vec(any::<u8>(), 0..300), note in ".{0,40}") {
        let envelope = Envelope { kind, sequence, tag, payload: Bytes::from(payload), note };
        let mut packer = Packer::new();
        envelope.pack(&mut packer);
        let wire = packer.into_bytes();
        let mut unpacker = aether_codec::Unpacker::new(&wire);
        prop_assert_eq!(Envelope::unpack(&mut unpacker).unwrap(), envelope);
        prop_assert!(unpacker.is_empty());
    }

    #[test]
    fn tuple_struct_round_trips(a: u32, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let wrapped = Wrapped(a, Bytes::from(payload));
        let mut packer = Packer::new();
        wrapped.pack(&mut packer);
        let wire = packer.into_bytes();
        let mut unpacker = aether_codec::Unpacker::new(&wire);
        prop_assert_eq!(Wrapped::unpack(&mut unpacker).unwrap(), wrapped);
    }
}

const NOTE: u8 = 10;
const SEAL: u8 = 11;

#[derive(Default)]
struct NoteApi {
    notes: Vec<(u16, Bytes)>,
    seals: Vec<u8>,
}

impl ApiHandler for NoteApi {
    fn handle(&mut self, id: u8, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError> {
        match id {
            NOTE => {
                let sequence = parser.unpacker().read_u16()?;
                let data = parser.unpacker().read_buffer()?;
                self.notes.push((sequence, data));
                Ok(Handled::Yes)
            }
            SEAL => {
                let level = parser.unpacker().read_u8()?;
                self.seals.push(level);
                Ok(Handled::Yes)
            }
            _ => Ok(Handled::No),
        }
    }
}

#[test]
fn packet_dispatches_in_order() {
    let mut packer = Packer::new();
    packer.write_message_id(NOTE);
    packer.write_u16(1);
    packer.write_buffer(b"first");
    packer.write_message_id(SEAL);
    packer.write_u8(9);
    packer.write_message_id(NOTE);
    packer.write_u16(2);
    packer.write_buffer(b"second");
    let wire = packer.into_bytes();

    let mut api = NoteApi::default();
    let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
    parser.parse(&mut api).unwrap();

    assert_eq!(api.notes.len(), 2);
    assert_eq!(api.notes[0].0, 1);
    assert_eq!(api.notes[1].1.as_ref(), b"second");
    assert_eq!(api.seals, vec![9]);
}

#[test]
fn unknown_id_is_a_parse_error() {
    let mut packer = Packer::new();
    packer.write_message_id(200);
    let wire = packer.into_bytes();

    let mut api = NoteApi::default();
    let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
    assert_eq!(parser.parse(&mut api), Err(CodecError::UnknownMessage(200)));
}

const OPEN_CHANNEL: u8 = 30;

/// Parent API owning a sub-API: `OpenChannel(channel, nested packet)`
/// where the nested packet is parsed against the child dispatch table.
struct ChannelApi {
    channel: Option<u8>,
    inner: NoteApi,
}

impl ApiHandler for ChannelApi {
    fn handle(&mut self, id: u8, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError> {
        match id {
            OPEN_CHANNEL => {
                self.channel = Some(parser.unpacker().read_u8()?);
                let nested = parser.unpacker().read_slice()?;
                let mut sub_parser = ApiParser::new(parser.protocol().clone(), nested);
                sub_parser.parse(&mut self.inner)?;
                Ok(Handled::Yes)
            }
            // unknown ids fall through to the extension api
            _ => self.inner.handle(id, parser),
        }
    }
}

#[test]
fn sub_api_calls_nest_inside_the_outer_packet() {
    let mut packer = Packer::new();
    packer.write_message_id(OPEN_CHANNEL);
    packer.write_u8(3);
    packer.write_nested(|child| {
        child.write_message_id(NOTE);
        child.write_u16(1);
        child.write_buffer(b"nested note");
        child.write_message_id(SEAL);
        child.write_u8(2);
    });
    // a sibling message after the nested block must still parse
    packer.write_message_id(SEAL);
    packer.write_u8(9);
    let wire = packer.into_bytes();

    let mut api = ChannelApi { channel: None, inner: NoteApi::default() };
    let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
    parser.parse(&mut api).unwrap();

    assert_eq!(api.channel, Some(3));
    assert_eq!(api.inner.notes.len(), 1);
    assert_eq!(api.inner.notes[0].1.as_ref(), b"nested note");
    assert_eq!(api.inner.seals, vec![2, 9]);
}

#[test]
fn promise_resolves_on_send_result() {
    let mut processor = ActionProcessor::new();
    let actions = processor.context();
    let protocol = ProtocolContext::new();

    let request_id = RequestId::generate();
    let promise = ReturnResultApi::request::<u32>(&actions, &protocol, request_id);

    let got = Rc::new(RefCell::new(None));
    let sink = got.clone();
    let _sub = promise.result_event().subscribe(move |value| {
        *sink.borrow_mut() = Some(*value);
    });

    // peer responds
    let mut packer = Packer::new();
    ReturnResultApi::send_result(&mut packer, request_id, &0xAB_u32);
    let wire = packer.into_bytes();

    let mut api = NoteApi::default();
    let mut parser = ApiParser::new(protocol.clone(), &wire);
    parser.parse(&mut api).unwrap();

    processor.update(Instant::ZERO);
    assert_eq!(*got.borrow(), Some(0xAB));
    assert_eq!(protocol.pending_count(), 0);
}

#[test]
fn promise_rejects_on_send_error() {
    let mut processor = ActionProcessor::new();
    let actions = processor.context();
    let protocol = ProtocolContext::new();

    let request_id = RequestId::generate();
    let promise = ReturnResultApi::request::<u32>(&actions, &protocol, request_id);

    let failed = Rc::new(RefCell::new(None));
    let sink = failed.clone();
    let _sub = promise.error_event().subscribe(move |err| {
        *sink.borrow_mut() = Some(*err);
    });

    let mut packer = Packer::new();
    ReturnResultApi::send_error(&mut packer, request_id, 3, 404);
    let wire = packer.into_bytes();

    let mut api = NoteApi::default();
    let mut parser = ApiParser::new(protocol, &wire);
    parser.parse(&mut api).unwrap();

    processor.update(Instant::ZERO);
    let err = failed.borrow().unwrap();
    assert_eq!(err.error_type, 3);
    assert_eq!(err.error_code, 404);
}

#[test]
fn orphan_result_cancels_packet_without_error() {
    let mut packer = Packer::new();
    ReturnResultApi::send_result(&mut packer, RequestId(9999), &1_u32);
    // trailing message that must be skipped by the cancel
    packer.write_message_id(SEAL);
    packer.write_u8(1);
    let wire = packer.into_bytes();

    let mut api = NoteApi::default();
    let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
    parser.parse(&mut api).unwrap();
    assert!(api.seals.is_empty());
}
