// [libs/infra/transport/src/lib.rs]
/*!
 * =================================================================
 * APARATO: AGENT TRANSPORT ENGINE (C2+C3+C4+C5)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: FRAMING, SESIÓN SSH, MULTIPLEXADO WS Y FACHADA RPC
 * =================================================================
 */

pub mod codec;
pub mod errors;
pub mod rpc;
pub mod ssh;
pub mod version;
pub mod ws_hub;

pub use codec::{decode_frame, decode_legacy, encode_frame, encode_legacy, MAX_FRAME_BYTES};
pub use errors::{CodecError, CodecResult, TransportError, TransportResult};
pub use rpc::{AgentRpc, SystemEndpoint};
pub use ssh::{SshCredential, SshDialer};
pub use version::{parse_agent_version, wire_shape_for, WireShape, MIN_VERSION_AGENT_RESPONSE, MIN_VERSION_CBOR};
pub use ws_hub::WsConn;
