//! Builds wire messages from escrow requests.
//!
//! Pure construction. Whether the action is legal for the order item is decided
//! by the engine before a message is built.

use escrow_types::{
    EscrowAction, EscrowMessage, EscrowPayload, EscrowPayloadType, EscrowRequest, LockInfo,
};

pub struct EscrowMessageCodec;

impl EscrowMessageCodec {
    pub fn build(request: &EscrowRequest, item_hash: &str, rawtx: &str) -> EscrowMessage {
        let item = item_hash.to_string();
        let memo = request.memo.clone();

        match &request.action {
            EscrowAction::Lock { nonce } => EscrowMessage::Lock {
                item,
                nonce: nonce.clone(),
                info: LockInfo { memo },
                escrow: payload(EscrowPayloadType::Lock, rawtx),
            },
            EscrowAction::Release => EscrowMessage::Release {
                item,
                memo,
                escrow: payload(EscrowPayloadType::Release, rawtx),
            },
            EscrowAction::RequestRefund => EscrowMessage::RequestRefund {
                item,
                memo,
                escrow: payload(EscrowPayloadType::RequestRefund, rawtx),
            },
            EscrowAction::Refund { accepted } => EscrowMessage::Refund {
                item,
                accepted: *accepted,
                memo,
                escrow: payload(EscrowPayloadType::Refund, rawtx),
            },
        }
    }
}

fn payload(kind: EscrowPayloadType, rawtx: &str) -> EscrowPayload {
    EscrowPayload {
        kind,
        rawtx: rawtx.to_string(),
    }
}
