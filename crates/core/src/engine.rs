//! Escrow action engine.
//!
//! Drives one order item through lock, release and refund. Buyer and seller
//! each run an engine against their own store; the two only talk through the
//! message transport.
//!
//! ```text
//! buyer                                   seller
//! lock     sign(complete) + broadcast ──> MPA_LOCK      ESCROW_LOCKED
//! MPA_RELEASE <── sign(partial)           release       SHIPPING
//! release  sign(complete) + broadcast ──> MPA_RELEASE   COMPLETE
//! ```
//!
//! The refund path mirrors release through REFUNDING and REFUNDED.
//!
//! Every status change is gated on the persisted status, never on message
//! arrival order, and all work on one item is serialized through [`ItemLocks`].

use std::collections::BTreeMap;
use std::sync::Arc;

use escrow_bitcoin::{amounts, Amount, RawTransactionClient, TxInput};
use escrow_messaging::{MessageTransport, SendResponse};
use escrow_storage::{EscrowStore, NewActionRecord};
use escrow_types::{
    data_ids, ActionRecord, BidAction, EscrowAction, EscrowActionType, EscrowConfig, EscrowError,
    EscrowMessage, EscrowRequest, MarketplaceEvent, MarketplaceMessage, OrderItem,
    OrderItemStatus, RawTxArtifact, RawTxPhase, Result,
};
use tracing::{debug, error, info, warn};

use crate::codec::EscrowMessageCodec;
use crate::fsm::{OrderItemFSM, Transition};
use crate::locks::ItemLocks;
use crate::signing::sign_raw_tx;

const NOT_ENOUGH_INFO: &str = "Not enough valid information to finalize escrow";
const RELEASE_ADDRESS_LABEL: &str = "_escrow_release";

/// Result of a local protocol step.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub order_item: OrderItem,
    pub rawtx: RawTxArtifact,
    pub message: MarketplaceMessage,
    pub send: SendResponse,
}

/// Result of reconciling a counterparty's message.
#[derive(Debug, Clone)]
pub struct InboundOutcome {
    pub record: ActionRecord,
    /// `None` for actions that only produce an audit record.
    pub order_item: Option<OrderItem>,
    pub transition: Option<Transition>,
}

/// Which party signs next when spending the escrow output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpendPhase {
    /// Seller builds the spend and adds the first signature.
    Seller,
    /// Buyer adds the final signature and broadcasts.
    Buyer,
}

/// Protocol artifacts collected during bidding.
struct EscrowObjects {
    pubkeys: Vec<String>,
    rawtx: RawTxArtifact,
}

pub struct EscrowActionEngine {
    rpc: Arc<dyn RawTransactionClient>,
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn EscrowStore>,
    config: EscrowConfig,
    fee: Amount,
    encrypted: bool,
    locks: ItemLocks,
}

impl EscrowActionEngine {
    pub fn new(
        rpc: Arc<dyn RawTransactionClient>,
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn EscrowStore>,
        config: EscrowConfig,
    ) -> Result<Self> {
        config.validate()?;
        let fee = amounts::amount_from_btc(config.release_fee)?;

        Ok(Self {
            rpc,
            transport,
            store,
            config,
            fee,
            encrypted: true,
            locks: ItemLocks::new(),
        })
    }

    /// Whether protocol messages go out encrypted. Defaults to true.
    pub fn with_encrypted_messages(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Dispatch a request to the matching operation.
    pub async fn execute(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        match request.action {
            EscrowAction::Lock { .. } => self.lock(request).await,
            EscrowAction::Release => self.release(request).await,
            EscrowAction::RequestRefund => self.request_refund(request).await,
            EscrowAction::Refund { .. } => self.refund(request).await,
        }
    }

    /// Buyer locks funds into the multisig escrow.
    pub async fn lock(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        ensure_action(request, EscrowActionType::Lock)?;
        let _guard = self.locks.acquire(request.order_item_id).await;

        let item = self.load_escrow_item(request.order_item_id).await?;
        self.run_step(request, &item, OrderItemStatus::EscrowLocked)
            .await
    }

    /// Seller signs the release (SHIPPING), then buyer co-signs and broadcasts (COMPLETE).
    pub async fn release(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        ensure_action(request, EscrowActionType::Release)?;
        let _guard = self.locks.acquire(request.order_item_id).await;

        let item = self.load_escrow_item(request.order_item_id).await?;
        let target = if item.is_seller() {
            OrderItemStatus::Shipping
        } else {
            OrderItemStatus::Complete
        };
        self.run_step(request, &item, target).await
    }

    /// Buyer asks the seller to refund. No transaction is built and the status is unchanged.
    pub async fn request_refund(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        ensure_action(request, EscrowActionType::RequestRefund)?;
        let _guard = self.locks.acquire(request.order_item_id).await;

        let item = self.load_escrow_item(request.order_item_id).await?;
        if item.is_seller() {
            return Err(EscrowError::protocol("Seller can't request a refund"));
        }
        if item.status != OrderItemStatus::EscrowLocked {
            return Err(EscrowError::protocol(format!(
                "A refund can only be requested while the escrow is locked, order item {} is {}",
                item.id, item.status
            )));
        }

        let outcome = self.notify_unsigned(request, item).await?;
        info!(
            order_item = outcome.order_item.id,
            msgid = %outcome.send.msgid,
            "Refund requested"
        );
        Ok(outcome)
    }

    /// Seller signs the refund (REFUNDING), then buyer co-signs and broadcasts (REFUNDED).
    pub async fn refund(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        ensure_action(request, EscrowActionType::Refund)?;
        let _guard = self.locks.acquire(request.order_item_id).await;

        let item = self.load_escrow_item(request.order_item_id).await?;
        if let EscrowAction::Refund { accepted: false } = request.action {
            return self.decline_refund(request, item).await;
        }

        let target = if item.is_seller() {
            OrderItemStatus::Refunding
        } else {
            OrderItemStatus::Refunded
        };
        self.run_step(request, &item, target).await
    }

    /// Seller turns a refund request down. Nothing is signed and the escrow stays locked.
    async fn decline_refund(
        &self,
        request: &EscrowRequest,
        item: OrderItem,
    ) -> Result<ActionOutcome> {
        if !item.is_seller() {
            return Err(EscrowError::protocol("Only the seller can decline a refund"));
        }
        spend_phase(&item, EscrowActionType::Refund)?;

        let outcome = self.notify_unsigned(request, item).await?;
        info!(
            order_item = outcome.order_item.id,
            msgid = %outcome.send.msgid,
            "Refund declined"
        );
        Ok(outcome)
    }

    /// Send a message that carries the current `rawtx` without building or signing anything.
    async fn notify_unsigned(
        &self,
        request: &EscrowRequest,
        item: OrderItem,
    ) -> Result<ActionOutcome> {
        let rawtx = item
            .object(data_ids::RAWTX)
            .ok_or_else(|| EscrowError::protocol(NOT_ENOUGH_INFO))
            .and_then(|o| RawTxArtifact::parse(&o.data_value))?;

        let message = self.envelope(EscrowMessageCodec::build(
            request,
            &item.item_hash,
            &rawtx.value,
        ));
        let (from, to) = route(&item);
        let send = self.transport.send(from, to, &message, self.encrypted).await?;

        Ok(ActionOutcome {
            order_item: item,
            rawtx,
            message,
            send,
        })
    }

    /// Produce the next `rawtx` artifact for `request` without touching status or
    /// sending anything.
    ///
    /// With `dry_run` nothing is persisted or broadcast and the signed
    /// transaction is returned instead of its broadcast reference.
    pub async fn create_raw_tx(
        &self,
        request: &EscrowRequest,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        let _guard = self.locks.acquire(request.order_item_id).await;
        let item = self.load_escrow_item(request.order_item_id).await?;
        self.build_raw_tx(&item, request, dry_run).await
    }

    /// Route a received escrow message to its handler.
    pub async fn process_event(&self, event: &MarketplaceEvent) -> Result<InboundOutcome> {
        match event.message.mpaction.action_type() {
            EscrowActionType::Lock => self.process_lock_escrow_received_event(event).await,
            EscrowActionType::Release => self.process_release_escrow_received_event(event).await,
            EscrowActionType::RequestRefund => {
                self.process_request_refund_escrow_received_event(event)
                    .await
            }
            EscrowActionType::Refund => self.process_refund_escrow_received_event(event).await,
        }
    }

    pub async fn process_lock_escrow_received_event(
        &self,
        event: &MarketplaceEvent,
    ) -> Result<InboundOutcome> {
        self.reconcile(event, EscrowActionType::Lock).await
    }

    pub async fn process_release_escrow_received_event(
        &self,
        event: &MarketplaceEvent,
    ) -> Result<InboundOutcome> {
        self.reconcile(event, EscrowActionType::Release).await
    }

    pub async fn process_request_refund_escrow_received_event(
        &self,
        event: &MarketplaceEvent,
    ) -> Result<InboundOutcome> {
        self.reconcile(event, EscrowActionType::RequestRefund).await
    }

    pub async fn process_refund_escrow_received_event(
        &self,
        event: &MarketplaceEvent,
    ) -> Result<InboundOutcome> {
        self.reconcile(event, EscrowActionType::Refund).await
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Shared lock/release/refund step. Caller holds the item lock.
    async fn run_step(
        &self,
        request: &EscrowRequest,
        item: &OrderItem,
        target: OrderItemStatus,
    ) -> Result<ActionOutcome> {
        // Role and phase problems get their specific message before the generic FSM one.
        match request.action_type() {
            EscrowActionType::Lock if item.is_seller() => {
                return Err(EscrowError::protocol("Seller can't lock an Escrow"));
            }
            EscrowActionType::Release | EscrowActionType::Refund => {
                spend_phase(item, request.action_type())?;
            }
            _ => {}
        }

        let mut fsm = OrderItemFSM::from_state(item.id, item.status);
        if fsm.advance(target)? == Transition::Unchanged {
            return Err(EscrowError::protocol(format!(
                "Order item {} is already {}",
                item.id, target
            )));
        }

        let rawtx = self.build_raw_tx(item, request, false).await?;
        self.store_rawtx(item.id, &rawtx).await?;
        let order_item = self.store.update_status(item.id, target).await?;

        let message = self.envelope(EscrowMessageCodec::build(
            request,
            &item.item_hash,
            &rawtx.value,
        ));
        let (from, to) = route(item);
        let send = self.transport.send(from, to, &message, self.encrypted).await?;

        info!(
            order_item = item.id,
            action = %request.action_type(),
            status = %target,
            msgid = %send.msgid,
            "Escrow step complete"
        );

        Ok(ActionOutcome {
            order_item,
            rawtx,
            message,
            send,
        })
    }

    async fn build_raw_tx(
        &self,
        item: &OrderItem,
        request: &EscrowRequest,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        let objects = escrow_objects(item)?;

        match &request.action {
            EscrowAction::Lock { .. } => {
                if item.is_seller() {
                    return Err(EscrowError::protocol("Seller can't lock an Escrow"));
                }
                self.build_lock(item, objects, dry_run).await
            }
            EscrowAction::Release => match spend_phase(item, EscrowActionType::Release)? {
                SpendPhase::Seller => {
                    self.build_seller_spend(item, &objects.rawtx, EscrowActionType::Release)
                        .await
                }
                SpendPhase::Buyer => self.complete_spend(item.id, &objects.rawtx, dry_run).await,
            },
            EscrowAction::Refund { accepted } => {
                match spend_phase(item, EscrowActionType::Refund)? {
                    SpendPhase::Seller => {
                        if !accepted {
                            return Err(EscrowError::protocol(
                                "Refund was not accepted, nothing to sign",
                            ));
                        }
                        self.build_seller_spend(item, &objects.rawtx, EscrowActionType::Refund)
                            .await
                    }
                    SpendPhase::Buyer => {
                        self.complete_spend(item.id, &objects.rawtx, dry_run).await
                    }
                }
            }
            EscrowAction::RequestRefund => Err(EscrowError::NotImplemented(
                "MPA_REQUEST_REFUND carries no transaction".to_string(),
            )),
        }
    }

    async fn build_lock(
        &self,
        item: &OrderItem,
        objects: EscrowObjects,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        if objects.rawtx.phase == RawTxPhase::FinalHex {
            return self.resume_broadcast(item.id, objects.rawtx, dry_run).await;
        }

        let mut pubkeys = objects.pubkeys;
        pubkeys.sort();

        let label = format!("_escrow_{}", item.item_hash);
        let address = self
            .rpc
            .add_multisig_address(self.config.multisig_required, &pubkeys, &label)
            .await?;
        info!(order_item = item.id, %address, "Created escrow multisig address");

        if !dry_run {
            self.upsert_object(item.id, data_ids::ESCROW_ADDRESS, &address)
                .await?;
        }

        let negotiated = objects.rawtx.expect_phase(RawTxPhase::NegotiatedHex)?;
        self.finalize(item.id, negotiated, dry_run).await
    }

    /// Seller side of release/refund: spend the escrow output and add one signature.
    async fn build_seller_spend(
        &self,
        item: &OrderItem,
        rawtx: &RawTxArtifact,
        action: EscrowActionType,
    ) -> Result<RawTxArtifact> {
        let buyer_address = item
            .object(data_ids::ADDRESS)
            .map(|o| o.data_value.clone())
            .ok_or_else(|| {
                EscrowError::protocol(format!(
                    "Buyer address not found for order item {}",
                    item.id
                ))
            })?;

        // The stored value is the lock transaction's id; fetch the real transaction.
        let lock_ref = rawtx.expect_phase(RawTxPhase::BroadcastRef)?;
        let lock_hex = self.rpc.get_raw_transaction(lock_ref).await?;
        let decoded = self.rpc.decode_raw_transaction(&lock_hex).await?;
        let escrowed = decoded
            .vout
            .iter()
            .find(|o| o.n == 0)
            .map(|o| o.value)
            .ok_or_else(|| EscrowError::protocol("Escrow transaction has no output to spend"))?;

        let mut outputs = BTreeMap::new();
        if action == EscrowActionType::Release {
            let local_address = self
                .rpc
                .get_new_address(&[RELEASE_ADDRESS_LABEL.to_string()], self.config.use_bech32)
                .await?;
            if local_address == buyer_address {
                return Err(EscrowError::protocol(
                    "Release address collides with the buyer address",
                ));
            }

            let (local, counterparty) =
                amounts::split_release(escrowed, self.fee, self.config.release_split)?;
            outputs.insert(local_address, local);
            outputs.insert(buyer_address, counterparty);
        } else {
            outputs.insert(buyer_address, amounts::refund_amount(escrowed, self.fee)?);
        }

        debug!(order_item = item.id, ?outputs, "Building escrow spend");

        let inputs = [TxInput {
            txid: decoded.txid,
            vout: 0,
        }];
        let unsigned = self.rpc.create_raw_transaction(&inputs, &outputs).await?;
        let partial = sign_raw_tx(self.rpc.as_ref(), &unsigned, false).await?;

        RawTxArtifact::new(RawTxPhase::PartialHex, partial)
    }

    /// Buyer side of release/refund: add the last signature and broadcast.
    async fn complete_spend(
        &self,
        order_item_id: i64,
        rawtx: &RawTxArtifact,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        if rawtx.phase == RawTxPhase::FinalHex {
            return self
                .resume_broadcast(order_item_id, rawtx.clone(), dry_run)
                .await;
        }
        let partial = rawtx.expect_phase(RawTxPhase::PartialHex)?;
        self.finalize(order_item_id, partial, dry_run).await
    }

    /// Add the final signature and broadcast.
    ///
    /// The signed transaction is persisted as `final-hex` before broadcast. If the
    /// broadcast fails the item keeps its status, and the next attempt at the same
    /// step picks the stored transaction up through [`Self::resume_broadcast`].
    async fn finalize(
        &self,
        order_item_id: i64,
        rawtx: &str,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        let signed = sign_raw_tx(self.rpc.as_ref(), rawtx, true).await?;
        let final_hex = RawTxArtifact::new(RawTxPhase::FinalHex, signed)?;
        if dry_run {
            return Ok(final_hex);
        }

        self.store_rawtx(order_item_id, &final_hex).await?;
        self.broadcast(order_item_id, &final_hex).await
    }

    /// Send a fully signed transaction left behind by a failed broadcast.
    async fn resume_broadcast(
        &self,
        order_item_id: i64,
        final_hex: RawTxArtifact,
        dry_run: bool,
    ) -> Result<RawTxArtifact> {
        if dry_run {
            return Ok(final_hex);
        }
        warn!(order_item = order_item_id, "Rebroadcasting stored final transaction");
        self.broadcast(order_item_id, &final_hex).await
    }

    async fn broadcast(
        &self,
        order_item_id: i64,
        final_hex: &RawTxArtifact,
    ) -> Result<RawTxArtifact> {
        let txid = self.rpc.send_raw_transaction(&final_hex.value).await?;
        info!(order_item = order_item_id, %txid, "Broadcast escrow transaction");

        RawTxArtifact::new(RawTxPhase::BroadcastRef, txid)
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    async fn reconcile(
        &self,
        event: &MarketplaceEvent,
        expected: EscrowActionType,
    ) -> Result<InboundOutcome> {
        let action = &event.message.mpaction;
        if action.action_type() != expected {
            return Err(EscrowError::protocol(format!(
                "Expected {} but received {}",
                expected,
                action.action_type()
            )));
        }
        if event.message.version != self.config.marketplace_version {
            warn!(
                msgid = %event.msgid,
                version = %event.message.version,
                expected = %self.config.marketplace_version,
                "Marketplace version mismatch"
            );
        }

        let listing_hash = action.item();
        let listing = self
            .store
            .find_listing(listing_hash)
            .await?
            .ok_or_else(|| EscrowError::ListingNotFound(listing_hash.to_string()))?;

        let (buyer, seller) = if listing.seller == event.from {
            (event.to.as_str(), event.from.as_str())
        } else if listing.seller == event.to {
            (event.from.as_str(), event.to.as_str())
        } else {
            return Err(EscrowError::protocol(format!(
                "Neither {} nor {} is the seller of listing {}",
                event.from, event.to, listing_hash
            )));
        };

        let record = self
            .store
            .record(NewActionRecord {
                action: expected,
                listing_hash: listing_hash.to_string(),
                sender: event.from.clone(),
                receiver: event.to.clone(),
                payload: serde_json::to_string(action)?,
                received_at: event.received,
            })
            .await?;

        if expected == EscrowActionType::RequestRefund {
            info!(listing = %listing_hash, from = %event.from, "Refund requested by buyer");
            return Ok(InboundOutcome {
                record,
                order_item: None,
                transition: None,
            });
        }
        if let EscrowMessage::Refund {
            accepted: false, ..
        } = action
        {
            info!(listing = %listing_hash, from = %event.from, "Refund declined by seller");
            return Ok(InboundOutcome {
                record,
                order_item: None,
                transition: None,
            });
        }

        let orders = self.store.find_orders(listing_hash, buyer, seller).await?;
        let order = match orders.as_slice() {
            [order] => order,
            [] => {
                error!(listing = %listing_hash, buyer, seller, "No order matches escrow message");
                return Err(EscrowError::IntegrityViolation(format!(
                    "No Order found for listing {} between buyer {} and seller {}",
                    listing_hash, buyer, seller
                )));
            }
            many => {
                error!(
                    listing = %listing_hash,
                    buyer,
                    seller,
                    count = many.len(),
                    "Multiple orders match escrow message"
                );
                return Err(EscrowError::IntegrityViolation(format!(
                    "{} Orders found for listing {} between buyer {} and seller {}",
                    many.len(),
                    listing_hash,
                    buyer,
                    seller
                )));
            }
        };

        let item_id = self
            .store
            .find_order_item(order.id, listing_hash)
            .await?
            .ok_or_else(|| {
                EscrowError::OrderItemNotFound(format!("order {} item {}", order.id, listing_hash))
            })?
            .id;

        let _guard = self.locks.acquire(item_id).await;
        // Re-read under the lock; a local step may have just finished.
        let item = self.load_item(item_id).await?;
        let (target, phase) = inbound_target(expected, item.is_seller())?;

        let mut fsm = OrderItemFSM::from_state(item.id, item.status);
        let transition = fsm.reconcile(target)?;
        if transition == Transition::Stale {
            return Ok(InboundOutcome {
                record,
                order_item: Some(item),
                transition: Some(transition),
            });
        }

        let artifact = RawTxArtifact::new(phase, action.rawtx())?;
        self.store_rawtx(item.id, &artifact).await?;

        let order_item = match transition {
            Transition::Advanced => self.store.update_status(item.id, target).await?,
            _ => self.load_item(item.id).await?,
        };

        info!(
            order_item = item.id,
            action = %expected,
            status = %order_item.status,
            ?transition,
            "Reconciled escrow message"
        );

        Ok(InboundOutcome {
            record,
            order_item: Some(order_item),
            transition: Some(transition),
        })
    }

    // ------------------------------------------------------------------------
    // Storage helpers
    // ------------------------------------------------------------------------

    async fn load_item(&self, order_item_id: i64) -> Result<OrderItem> {
        self.store
            .get(order_item_id)
            .await?
            .ok_or_else(|| EscrowError::OrderItemNotFound(order_item_id.to_string()))
    }

    async fn load_escrow_item(&self, order_item_id: i64) -> Result<OrderItem> {
        let item = self.load_item(order_item_id).await?;
        if item.escrow().is_none() {
            return Err(EscrowError::EscrowNotFound(format!(
                "listing {}",
                item.item_hash
            )));
        }
        Ok(item)
    }

    async fn store_rawtx(&self, order_item_id: i64, rawtx: &RawTxArtifact) -> Result<()> {
        self.upsert_object(order_item_id, data_ids::RAWTX, &rawtx.to_stored()?)
            .await
    }

    async fn upsert_object(&self, order_item_id: i64, data_id: &str, value: &str) -> Result<()> {
        match self.store.find_by_data_id(order_item_id, data_id).await? {
            Some(existing) => {
                self.store.update(existing.id, data_id, value).await?;
            }
            None => {
                self.store.create(order_item_id, data_id, value).await?;
            }
        }
        Ok(())
    }

    fn envelope(&self, message: EscrowMessage) -> MarketplaceMessage {
        MarketplaceMessage::new(self.config.marketplace_version.clone(), message)
    }
}

fn ensure_action(request: &EscrowRequest, expected: EscrowActionType) -> Result<()> {
    if request.action_type() != expected {
        return Err(EscrowError::protocol(format!(
            "Expected a {} request, got {}",
            expected,
            request.action_type()
        )));
    }
    Ok(())
}

/// Sender and recipient for a message from the local party.
fn route(item: &OrderItem) -> (&str, &str) {
    if item.is_seller() {
        (&item.order.seller, &item.order.buyer)
    } else {
        (&item.order.buyer, &item.order.seller)
    }
}

fn escrow_objects(item: &OrderItem) -> Result<EscrowObjects> {
    if item.bid.action != BidAction::Accept || item.objects.is_empty() {
        return Err(EscrowError::protocol(NOT_ENOUGH_INFO));
    }

    let rawtx = item
        .object(data_ids::RAWTX)
        .ok_or_else(|| EscrowError::protocol(NOT_ENOUGH_INFO))?;
    let pubkeys = item
        .object(data_ids::PUBKEYS)
        .ok_or_else(|| EscrowError::protocol(NOT_ENOUGH_INFO))?;
    let pubkeys: Vec<String> = serde_json::from_str(&pubkeys.data_value)
        .map_err(|_| EscrowError::protocol(NOT_ENOUGH_INFO))?;

    Ok(EscrowObjects {
        pubkeys,
        rawtx: RawTxArtifact::parse(&rawtx.data_value)?,
    })
}

fn spend_phase(item: &OrderItem, action: EscrowActionType) -> Result<SpendPhase> {
    let (seller_status, buyer_status) = match action {
        EscrowActionType::Release => (OrderItemStatus::EscrowLocked, OrderItemStatus::Shipping),
        EscrowActionType::Refund => (OrderItemStatus::EscrowLocked, OrderItemStatus::Refunding),
        other => {
            return Err(EscrowError::NotImplemented(format!(
                "{} does not spend the escrow",
                other
            )))
        }
    };

    match (item.status, item.is_seller()) {
        (status, true) if status == seller_status => Ok(SpendPhase::Seller),
        (status, false) if status == buyer_status => Ok(SpendPhase::Buyer),
        _ => Err(EscrowError::protocol(format!(
            "Something went wrong, {} should not be sent at this point",
            action
        ))),
    }
}

/// Status a received action moves the local item to, and the phase of the `rawtx` it carries.
fn inbound_target(
    action: EscrowActionType,
    local_is_seller: bool,
) -> Result<(OrderItemStatus, RawTxPhase)> {
    match (action, local_is_seller) {
        (EscrowActionType::Lock, true) => {
            Ok((OrderItemStatus::EscrowLocked, RawTxPhase::BroadcastRef))
        }
        (EscrowActionType::Release, true) => {
            Ok((OrderItemStatus::Complete, RawTxPhase::BroadcastRef))
        }
        (EscrowActionType::Release, false) => {
            Ok((OrderItemStatus::Shipping, RawTxPhase::PartialHex))
        }
        (EscrowActionType::Refund, true) => {
            Ok((OrderItemStatus::Refunded, RawTxPhase::BroadcastRef))
        }
        (EscrowActionType::Refund, false) => {
            Ok((OrderItemStatus::Refunding, RawTxPhase::PartialHex))
        }
        (EscrowActionType::Lock, false) => Err(EscrowError::protocol(
            "Received MPA_LOCK but the buyer locks the escrow",
        )),
        (EscrowActionType::RequestRefund, _) => Err(EscrowError::NotImplemented(
            "MPA_REQUEST_REFUND does not change status".to_string(),
        )),
    }
}
