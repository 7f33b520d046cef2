mod apis;
mod client_to_server;
mod cloud_connection;
mod login_gate;
mod message_stream;
mod p2p;
mod ping;
mod server_connection;
mod uid;

pub use apis::{AuthorizedApi, ClientRootApi, ClientSafeApi};
pub use client_to_server::ClientToServerStream;
pub use cloud_connection::{ClientCloudConnection, ServerConnectionProvider};
pub use login_gate::{LOGIN_BY_ALIAS, LOGIN_BY_UID, LoginGate};
pub use message_stream::{MessageStream, MessageStreamDispatcher};
pub use p2p::SplitStreamConnection;
pub use ping::{PingBehavior, PingConfig, RttStatistics};
pub use server_connection::ClientServerConnection;
pub use uid::Uid;
