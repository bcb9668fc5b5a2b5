//! Marketplace message transport for escrow actions.

pub mod bus;
pub mod poller;
pub mod smsg;
pub mod transport;

pub use bus::{InMemoryBus, InMemoryInbox};
pub use poller::{Dispatch, InboundHandler, InboxPoller, PollStats};
pub use smsg::SmsgTransport;
pub use transport::{InboundMessage, MessageInbox, MessageTransport, SendResponse};
