//! Network subsystem: UDP probe loops

pub mod receiver;
pub mod relay;
pub mod sender;
pub mod udp;

pub use receiver::{ReceiverLoop, ReceiverOutput};
pub use relay::{relay_queue, RelayInbound, RelayOffsetEntry, RelayOutbound};
pub use sender::{SenderLoop, SenderState, SenderSummary};
pub use udp::{bind_socket, send_frame};
