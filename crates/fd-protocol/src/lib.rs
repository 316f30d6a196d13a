// fd-protocol: wire types and framing for the fetchd daemon.
//
// Two protocols share this crate: the length-prefixed framed protocol
// spoken over the IPC transport, and JSON-RPC 2.0 spoken over the HTTP
// bridge.  Both carry the same method set; only the envelopes differ.

pub mod endpoint;
pub mod frame;
pub mod framed;
pub mod jsonrpc;
pub mod notify;

pub use frame::{FrameError, MAX_MESSAGE_SIZE};
pub use framed::{FramedRequest, FramedResponse, FramedUpdate};
pub use jsonrpc::{RpcError, RpcRequest, RpcResponse, error_codes};
