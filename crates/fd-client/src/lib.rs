// fd-client: dial the fetchd daemon and speak the framed protocol.
//
// The dialer mirrors the daemon's listener preference order and adds one
// client-only concern: when nothing is reachable (and the caller did not
// name an explicit URI), it spawns the daemon and polls until it comes
// up.

pub mod client;
pub mod dial;
pub mod uri;

pub use client::{Client, ClientError, ClientMessage};
pub use dial::{DialError, DialOptions, connect};
pub use uri::{EndpointUri, UriError, parse_endpoint_uri};
