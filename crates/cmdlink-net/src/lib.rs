//! Frame protocol: fragmentation, reassembly, and transports.
//!
//! Text messages are split into a meta frame plus bounded data frames by
//! [`codec`], carried by a [`Transport`], rebuilt by the [`ReassemblyTable`],
//! and buffered in the [`ReceiveQueue`] until the owning node drains them.
//! [`FrameLink`] ties these together behind a once-per-tick polling API.

pub mod codec;
mod link;
mod loopback;
mod queue;
mod reassembly;
mod tcp;
mod transport;
pub mod wire;

pub use codec::{CHUNK_SIZE, DataFrame, Frame, MessageHeader, MetaFrame, defragment, fragment};
pub use link::FrameLink;
pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use queue::ReceiveQueue;
pub use reassembly::ReassemblyTable;
pub use tcp::{TcpClientTransport, TcpServerTransport};
pub use transport::{InboundFrame, PeerEvent, SERVER_PEER, Transport, UNASSIGNED_PEER};
