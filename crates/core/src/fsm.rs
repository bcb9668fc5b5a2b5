use escrow_types::{EscrowError, OrderItemStatus, Result};
use tracing::{info, warn};

/// Result of applying a target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status moved to the target.
    Advanced,
    /// Already in the target status.
    Unchanged,
    /// Target lies behind the current status; a late redelivery.
    Stale,
}

/// Order item status machine.
///
/// Valid transitions:
/// - AwaitingEscrow -> EscrowLocked (buyer locked funds)
/// - EscrowLocked -> Shipping (seller signed release)
/// - Shipping -> Complete (buyer co-signed and broadcast release)
/// - EscrowLocked -> Refunding (seller signed refund)
/// - Refunding -> Refunded (buyer co-signed and broadcast refund)
/// - X -> X (idempotent)
pub struct OrderItemFSM {
    current_state: OrderItemStatus,
    order_item_id: i64,
}

impl OrderItemFSM {
    pub fn from_state(order_item_id: i64, state: OrderItemStatus) -> Self {
        Self {
            current_state: state,
            order_item_id,
        }
    }

    pub fn current_state(&self) -> OrderItemStatus {
        self.current_state
    }

    /// Move to `target`, failing if it is not reachable from the current status.
    pub fn advance(&mut self, target: OrderItemStatus) -> Result<Transition> {
        if self.current_state == target {
            return Ok(Transition::Unchanged);
        }
        self.transition(target, allowed_from(target))?;
        Ok(Transition::Advanced)
    }

    /// Like [`advance`](Self::advance), but a target behind the current status
    /// (or any other target once terminal) is reported as stale instead of failing.
    pub fn reconcile(&mut self, target: OrderItemStatus) -> Result<Transition> {
        if self.current_state != target
            && (target.rank() < self.current_state.rank() || self.current_state.is_terminal())
        {
            warn!(
                "Ignoring stale transition for order_item={}: {} -> {}",
                self.order_item_id, self.current_state, target
            );
            return Ok(Transition::Stale);
        }
        self.advance(target)
    }

    fn transition(
        &mut self,
        new_state: OrderItemStatus,
        allowed_from: &[OrderItemStatus],
    ) -> Result<()> {
        if !allowed_from.contains(&self.current_state) {
            return Err(EscrowError::protocol(format!(
                "Invalid status transition for order_item={}: {} -> {}. Allowed from: {:?}",
                self.order_item_id, self.current_state, new_state, allowed_from
            )));
        }

        info!(
            "Status transition for order_item={}: {} -> {}",
            self.order_item_id, self.current_state, new_state
        );

        self.current_state = new_state;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }
}

fn allowed_from(target: OrderItemStatus) -> &'static [OrderItemStatus] {
    match target {
        OrderItemStatus::AwaitingEscrow => &[],
        OrderItemStatus::EscrowLocked => &[OrderItemStatus::AwaitingEscrow],
        OrderItemStatus::Shipping => &[OrderItemStatus::EscrowLocked],
        OrderItemStatus::Complete => &[OrderItemStatus::Shipping],
        OrderItemStatus::Refunding => &[OrderItemStatus::EscrowLocked],
        OrderItemStatus::Refunded => &[OrderItemStatus::Refunding],
    }
}
