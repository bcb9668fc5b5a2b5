//! Escrow action engine for marketplace order items.

pub mod codec;
pub mod engine;
pub mod fsm;
pub mod locks;
pub mod router;
pub mod signing;

pub use codec::EscrowMessageCodec;
pub use engine::{ActionOutcome, EscrowActionEngine, InboundOutcome};
pub use fsm::{OrderItemFSM, Transition};
pub use locks::{ItemGuard, ItemLocks};
pub use router::EscrowEventRouter;
pub use signing::sign_raw_tx;
