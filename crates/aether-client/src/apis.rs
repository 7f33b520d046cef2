use aether_codec::{
    ApiHandler, ApiParser, CodecError, Handled, MessageId, Packable, Packer, RequestId,
};
use aether_events::Event;
use aether_streams::StreamId;
use bytes::Bytes;

use crate::uid::Uid;

/// Methods a logged-in client may call on its work server.
pub struct AuthorizedApi;

impl AuthorizedApi {
    pub const PING: MessageId = 6;
    pub const SEND_MESSAGE: MessageId = 10;
    pub const RESOLVERS: MessageId = 12;
    pub const CHECK_ACCESS_FOR_SEND_MESSAGE: MessageId = 16;

    /// `ping(next_ping_duration)`, answered with an empty `SendResult`.
    pub fn ping(packer: &mut Packer, request_id: RequestId, next_ping_ms: u64) {
        packer.write_message_id(Self::PING);
        request_id.pack(packer);
        packer.write_u64(next_ping_ms);
    }

    pub fn send_message(packer: &mut Packer, uid: Uid, data: &Bytes) {
        packer.write_message_id(Self::SEND_MESSAGE);
        uid.pack(packer);
        data.pack(packer);
    }

    pub fn resolvers(packer: &mut Packer, servers_stream_id: StreamId, cloud_stream_id: StreamId) {
        packer.write_message_id(Self::RESOLVERS);
        packer.write_u8(servers_stream_id);
        packer.write_u8(cloud_stream_id);
    }

    pub fn check_access_for_send_message(packer: &mut Packer, request_id: RequestId, uid: Uid) {
        packer.write_message_id(Self::CHECK_ACCESS_FOR_SEND_MESSAGE);
        request_id.pack(packer);
        uid.pack(packer);
    }
}

/// Server-to-client messages on the unauthenticated (outer) framing.
///
/// The only payload-bearing message is `SendSafeApiData`: the server relays
/// a datagram of the client's safe-api session.
pub struct ClientRootApi {
    pub payloads: Vec<Bytes>,
}

impl ClientRootApi {
    pub const SEND_SAFE_API_DATA: MessageId = 6;

    pub fn new() -> Self {
        Self { payloads: Vec::new() }
    }

    pub fn send_safe_api_data(packer: &mut Packer, uid: Uid, data: &Bytes) {
        packer.write_message_id(Self::SEND_SAFE_API_DATA);
        uid.pack(packer);
        data.pack(packer);
    }
}

impl Default for ClientRootApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiHandler for ClientRootApi {
    fn handle(&mut self, id: MessageId, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError> {
        match id {
            Self::SEND_SAFE_API_DATA => {
                let _uid = Uid::unpack(parser.unpacker())?;
                let data = parser.unpacker().read_buffer()?;
                self.payloads.push(data);
                Ok(Handled::Yes)
            }
            _ => Ok(Handled::No),
        }
    }
}

/// Server-to-client messages delivered through the reliable session.
pub struct ClientSafeApi {
    pub send_message_event: Event<(Uid, Bytes)>,
    pub stream_to_client_event: Event<(Uid, StreamId)>,
}

impl ClientSafeApi {
    pub const SEND_MESSAGE: MessageId = 10;
    pub const STREAM_TO_CLIENT: MessageId = 11;

    pub fn new() -> Self {
        Self { send_message_event: Event::new(), stream_to_client_event: Event::new() }
    }

    pub fn send_message(packer: &mut Packer, uid: Uid, data: &Bytes) {
        packer.write_message_id(Self::SEND_MESSAGE);
        uid.pack(packer);
        data.pack(packer);
    }

    pub fn stream_to_client(packer: &mut Packer, uid: Uid, stream_id: StreamId) {
        packer.write_message_id(Self::STREAM_TO_CLIENT);
        uid.pack(packer);
        packer.write_u8(stream_id);
    }
}

impl Default for ClientSafeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiHandler for ClientSafeApi {
    fn handle(&mut self, id: MessageId, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError> {
        match id {
            Self::SEND_MESSAGE => {
                let uid = Uid::unpack(parser.unpacker())?;
                let data = parser.unpacker().read_buffer()?;
                self.send_message_event.emit(&(uid, data));
                Ok(Handled::Yes)
            }
            Self::STREAM_TO_CLIENT => {
                let uid = Uid::unpack(parser.unpacker())?;
                let stream_id = parser.unpacker().read_u8()?;
                self.stream_to_client_event.emit(&(uid, stream_id));
                Ok(Handled::Yes)
            }
            _ => Ok(Handled::No),
        }
    }
}

#[cfg(test)]
mod tests {
    use aether_codec::ProtocolContext;

    use super::*;

    fn uid(fill: u8) -> Uid {
        Uid([fill; 16])
    }

    #[test]
    fn safe_api_round_trip() {
        let mut packer = Packer::new();
        ClientSafeApi::send_message(&mut packer, uid(3), &Bytes::from_static(b"hi there"));
        ClientSafeApi::stream_to_client(&mut packer, uid(4), 7);
        let wire = packer.into_bytes();

        let mut api = ClientSafeApi::new();
        let messages = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = messages.clone();
        let _sub = api
            .send_message_event
            .subscribe(move |(from, data): &(Uid, Bytes)| sink.borrow_mut().push((*from, data.clone())));
        let streams = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = streams.clone();
        let _sub2 = api
            .stream_to_client_event
            .subscribe(move |pair: &(Uid, StreamId)| sink.borrow_mut().push(*pair));

        let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
        parser.parse(&mut api).unwrap();

        assert_eq!(messages.borrow().len(), 1);
        assert_eq!(messages.borrow()[0].0, uid(3));
        assert_eq!(messages.borrow()[0].1.as_ref(), b"hi there");
        assert_eq!(*streams.borrow(), vec![(uid(4), 7)]);
    }

    #[test]
    fn root_api_collects_relayed_payloads() {
        let mut packer = Packer::new();
        ClientRootApi::send_safe_api_data(&mut packer, uid(1), &Bytes::from_static(b"inner"));
        let wire = packer.into_bytes();

        let mut api = ClientRootApi::new();
        let mut parser = ApiParser::new(ProtocolContext::new(), &wire);
        parser.parse(&mut api).unwrap();
        assert_eq!(api.payloads.len(), 1);
        assert_eq!(api.payloads[0].as_ref(), b"inner");
    }
}
