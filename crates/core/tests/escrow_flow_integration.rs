//! Buyer and seller driving an order item end to end over the in-memory bus.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::*;
use escrow_bitcoin::{Amount, TxInput};
use escrow_core::Transition;
use escrow_messaging::PollStats;
use escrow_storage::{ActionLogStore, OrderStore};
use escrow_types::{
    BidAction, EscrowActionType, EscrowError, EscrowMessage, EscrowPayload, EscrowPayloadType,
    EscrowRequest, MarketplaceEvent, MarketplaceMessage, OrderItemStatus, RawTxPhase,
};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

fn release_message(rawtx: &str) -> EscrowMessage {
    EscrowMessage::Release {
        item: LISTING_HASH.to_string(),
        memo: String::new(),
        escrow: EscrowPayload {
            kind: EscrowPayloadType::Release,
            rawtx: rawtx.to_string(),
        },
    }
}

fn event(from: &str, to: &str, version: &str, message: EscrowMessage) -> MarketplaceEvent {
    MarketplaceEvent {
        msgid: "msg-1".to_string(),
        from: from.to_string(),
        to: to.to_string(),
        received: Utc::now(),
        message: MarketplaceMessage::new(version, message),
    }
}

/// Lock on the buyer side and deliver it to the seller.
async fn locked_market() -> Market {
    let market = Market::new().await;
    market
        .buyer
        .engine
        .lock(&EscrowRequest::lock(market.buyer.item_id, None, "locked"))
        .await
        .unwrap();
    market.deliver().await;
    market
}

#[tokio::test]
async fn test_release_flow() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);

    assert_eq!(seller.status().await, OrderItemStatus::EscrowLocked);
    let seller_rawtx = seller.rawtx().await;
    assert_eq!(seller_rawtx.phase, RawTxPhase::BroadcastRef);
    assert_eq!(seller_rawtx.value, txid_for(0));

    // Seller signs first.
    let outcome = seller
        .engine
        .release(&EscrowRequest::release(seller.item_id, "shipped"))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::Shipping);
    assert_eq!(outcome.rawtx.phase, RawTxPhase::PartialHex);
    assert_eq!(outcome.send.result, "Sent.");

    assert_eq!(seller.rpc.requested_txids(), vec![txid_for(0)]);
    let created = seller.rpc.created();
    assert_eq!(created.len(), 1);
    assert_eq!(
        created[0].inputs,
        vec![TxInput {
            txid: txid_for(0),
            vout: 0
        }]
    );
    assert_eq!(
        created[0].outputs.get("release-addr-1"),
        Some(&Amount::from_sat(33_326_666))
    );
    assert_eq!(
        created[0].outputs.get(BUYER_ADDRESS),
        Some(&Amount::from_sat(66_653_333))
    );
    let total: u64 = created[0].outputs.values().map(|a| a.to_sat()).sum();
    assert!(total <= Amount::ONE_BTC.to_sat());
    assert!(seller.rpc.broadcasts().is_empty());

    market.deliver().await;
    assert_eq!(buyer.status().await, OrderItemStatus::Shipping);
    let partial = buyer.rawtx().await;
    assert_eq!(partial.phase, RawTxPhase::PartialHex);
    assert_eq!(partial.value, format!("{}{}", UNSIGNED_SPEND, SIGNATURE));

    // Buyer completes and broadcasts.
    let outcome = buyer
        .engine
        .release(&EscrowRequest::release(buyer.item_id, "received"))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::Complete);
    assert_eq!(outcome.rawtx.value, txid_for(1));
    assert_eq!(
        buyer.rpc.broadcasts()[1],
        format!("{}{}{}", UNSIGNED_SPEND, SIGNATURE, SIGNATURE)
    );

    market.deliver().await;
    assert_eq!(seller.status().await, OrderItemStatus::Complete);
    assert_eq!(seller.rawtx().await.value, txid_for(1));

    let actions: Vec<_> = seller
        .store
        .find_by_listing(LISTING_HASH)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.action)
        .collect();
    assert_eq!(
        actions,
        vec![EscrowActionType::Lock, EscrowActionType::Release]
    );

    // Nothing left unread on either side.
    assert_eq!(
        seller.poller(&market.bus).poll_once().await.unwrap(),
        PollStats::default()
    );
    assert_eq!(
        buyer.poller(&market.bus).poll_once().await.unwrap(),
        PollStats::default()
    );
}

#[tokio::test]
async fn test_refund_flow() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);

    let outcome = buyer
        .engine
        .request_refund(&EscrowRequest::request_refund(buyer.item_id, "never arrived"))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::EscrowLocked);
    assert_eq!(outcome.rawtx.value, txid_for(0));

    market.deliver().await;
    assert_eq!(seller.status().await, OrderItemStatus::EscrowLocked);
    let records = seller.store.find_by_listing(LISTING_HASH).await.unwrap();
    let request = records.last().unwrap();
    assert_eq!(request.action, EscrowActionType::RequestRefund);
    assert_eq!(request.sender, BUYER);
    assert_eq!(request.receiver, SELLER);
    assert!(request.payload.contains("never arrived"));

    let outcome = seller
        .engine
        .refund(&EscrowRequest::refund(seller.item_id, true, "refunding"))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::Refunding);
    let created = seller.rpc.created();
    assert_eq!(created[0].outputs.len(), 1);
    assert_eq!(
        created[0].outputs.get(BUYER_ADDRESS),
        Some(&Amount::from_sat(99_990_000))
    );

    market.deliver().await;
    assert_eq!(buyer.status().await, OrderItemStatus::Refunding);
    assert_eq!(buyer.rawtx().await.phase, RawTxPhase::PartialHex);

    let outcome = buyer
        .engine
        .refund(&EscrowRequest::refund(buyer.item_id, true, ""))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::Refunded);

    market.deliver().await;
    assert_eq!(seller.status().await, OrderItemStatus::Refunded);
    assert_eq!(seller.rawtx().await.phase, RawTxPhase::BroadcastRef);
}

#[tokio::test]
async fn test_role_and_phase_guards() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);

    let err = buyer
        .engine
        .release(&EscrowRequest::release(buyer.item_id, ""))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Something went wrong, MPA_RELEASE should not be sent at this point"
    );

    let err = buyer
        .engine
        .refund(&EscrowRequest::refund(buyer.item_id, true, ""))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Something went wrong, MPA_REFUND should not be sent at this point"
    );

    let err = seller
        .engine
        .request_refund(&EscrowRequest::request_refund(seller.item_id, ""))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Seller can't request a refund");

    let err = buyer
        .engine
        .refund(&EscrowRequest::refund(buyer.item_id, false, ""))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Only the seller can decline a refund");

    // None of the rejected steps changed anything.
    assert_eq!(buyer.status().await, OrderItemStatus::EscrowLocked);
    assert_eq!(seller.status().await, OrderItemStatus::EscrowLocked);
    assert!(seller.rpc.created().is_empty());
    assert_eq!(market.bus.sent().await.len(), 1);
}

#[tokio::test]
async fn test_request_refund_requires_locked_escrow() {
    let market = Market::new().await;
    let err = market
        .buyer
        .engine
        .request_refund(&EscrowRequest::request_refund(market.buyer.item_id, ""))
        .await
        .unwrap_err();
    assert!(err.is_protocol_violation());
}

#[tokio::test]
async fn test_redelivered_lock_is_idempotent() {
    let market = Market::new().await;
    let (buyer, seller) = (&market.buyer, &market.seller);

    buyer
        .engine
        .lock(&EscrowRequest::lock(buyer.item_id, None, ""))
        .await
        .unwrap();
    market.deliver().await;
    let lock_msgid = market
        .bus
        .sent()
        .await
        .into_iter()
        .find(|(m, _)| m.to == SELLER)
        .map(|(m, _)| m.msgid)
        .unwrap();

    let status = seller.status().await;
    let rawtx = seller.rawtx().await;
    assert_eq!(status, OrderItemStatus::EscrowLocked);
    assert_eq!(rawtx.phase, RawTxPhase::BroadcastRef);

    assert!(market.bus.redeliver(&lock_msgid).await);
    let stats = seller.poller(&market.bus).poll_once().await.unwrap();
    assert_eq!(stats.handled, 1);
    assert_eq!(seller.status().await, status);
    assert_eq!(seller.rawtx().await, rawtx);
}

#[tokio::test]
async fn test_redelivered_messages_are_idempotent() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);

    seller
        .engine
        .release(&EscrowRequest::release(seller.item_id, ""))
        .await
        .unwrap();
    market.deliver().await;
    let release_msgid = market
        .bus
        .sent()
        .await
        .into_iter()
        .find(|(m, _)| m.to == BUYER)
        .map(|(m, _)| m.msgid)
        .unwrap();

    // Same status: rawtx rewritten with the same value.
    let before = buyer.rawtx().await;
    assert!(market.bus.redeliver(&release_msgid).await);
    let stats = buyer.poller(&market.bus).poll_once().await.unwrap();
    assert_eq!(stats.handled, 1);
    assert_eq!(buyer.status().await, OrderItemStatus::Shipping);
    assert_eq!(buyer.rawtx().await, before);

    // After completion the same message is stale and ignored.
    buyer
        .engine
        .release(&EscrowRequest::release(buyer.item_id, ""))
        .await
        .unwrap();
    let completed = buyer.rawtx().await;
    assert!(market.bus.redeliver(&release_msgid).await);
    let stats = buyer.poller(&market.bus).poll_once().await.unwrap();
    assert_eq!(stats.handled, 1);
    assert_eq!(buyer.status().await, OrderItemStatus::Complete);
    assert_eq!(buyer.rawtx().await, completed);
    assert_eq!(completed.phase, RawTxPhase::BroadcastRef);
}

#[tokio::test]
async fn test_stale_event_reports_stale() {
    let market = locked_market().await;
    let seller = &market.seller;
    seller
        .engine
        .release(&EscrowRequest::release(seller.item_id, ""))
        .await
        .unwrap();

    let lock = EscrowMessage::Lock {
        item: LISTING_HASH.to_string(),
        nonce: None,
        info: Default::default(),
        escrow: EscrowPayload {
            kind: EscrowPayloadType::Lock,
            rawtx: "ff".to_string(),
        },
    };
    let outcome = seller
        .engine
        .process_lock_escrow_received_event(&event(BUYER, SELLER, "0.0.1.0", lock))
        .await
        .unwrap();

    assert_eq!(outcome.transition, Some(Transition::Stale));
    assert_eq!(seller.status().await, OrderItemStatus::Shipping);
    assert_eq!(seller.rawtx().await.phase, RawTxPhase::PartialHex);
}

#[tokio::test]
async fn test_early_event_stays_unread() {
    let market = Market::new().await;
    let seller = &market.seller;

    let text = MarketplaceMessage::new("0.0.1.0", release_message("beef"))
        .to_json()
        .unwrap();
    market.bus.deliver_raw(BUYER, SELLER, text).await;

    for _ in 0..2 {
        let stats = seller.poller(&market.bus).poll_once().await.unwrap();
        assert_eq!(stats.failed, 1);
    }
    assert_eq!(seller.status().await, OrderItemStatus::AwaitingEscrow);
    assert_eq!(seller.rawtx().await.phase, RawTxPhase::NegotiatedHex);
}

#[tokio::test]
async fn test_non_escrow_messages_left_unread() {
    let market = Market::new().await;
    market
        .bus
        .deliver_raw(
            BUYER,
            SELLER,
            r#"{"version":"0.0.1.0","mpaction":{"action":"MPA_BID","item":"x"}}"#,
        )
        .await;
    market.bus.deliver_raw(BUYER, SELLER, "hello").await;

    let poller = market.seller.poller(&market.bus);
    for _ in 0..2 {
        let stats = poller.poll_once().await.unwrap();
        assert_eq!(stats.unhandled, 2);
        assert_eq!(stats.handled, 0);
    }
}

#[tokio::test]
async fn test_inbound_lookup_failures() {
    let market = Market::new().await;
    let engine = &market.seller.engine;

    let mut unknown = release_message("beef");
    if let EscrowMessage::Release { item, .. } = &mut unknown {
        *item = "unknown-listing".to_string();
    }
    let err = engine
        .process_event(&event(BUYER, SELLER, "0.0.1.0", unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::ListingNotFound(_)));

    let err = engine
        .process_event(&event("stranger", "other", "0.0.1.0", release_message("beef")))
        .await
        .unwrap_err();
    assert!(err.is_protocol_violation());

    // Right listing, but no order between these parties.
    let err = engine
        .process_event(&event("stranger", SELLER, "0.0.1.0", release_message("beef")))
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::IntegrityViolation(_)));
}

#[tokio::test]
async fn test_duplicate_orders_are_integrity_violation() {
    let market = Market::new().await;
    let store = &market.seller.store;
    let bid = store
        .insert_bid(BidAction::Accept, BUYER, LISTING_HASH)
        .unwrap();
    let order = store.insert_order(BUYER, SELLER).unwrap();
    store
        .insert_order_item(order, bid, LISTING_HASH, OrderItemStatus::AwaitingEscrow)
        .unwrap();
    assert_eq!(
        store
            .find_orders(LISTING_HASH, BUYER, SELLER)
            .await
            .unwrap()
            .len(),
        2
    );

    let err = market
        .seller
        .engine
        .process_event(&event(BUYER, SELLER, "0.0.1.0", release_message("beef")))
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::IntegrityViolation(_)));
}

#[tokio::test]
async fn test_version_mismatch_is_tolerated() {
    let market = Market::new().await;
    let lock = EscrowMessage::Lock {
        item: LISTING_HASH.to_string(),
        nonce: None,
        info: Default::default(),
        escrow: EscrowPayload {
            kind: EscrowPayloadType::Lock,
            rawtx: txid_for(0),
        },
    };

    let outcome = market
        .seller
        .engine
        .process_event(&event(BUYER, SELLER, "9.9.9.9", lock))
        .await
        .unwrap();
    assert_eq!(outcome.transition, Some(Transition::Advanced));
    assert_eq!(market.seller.status().await, OrderItemStatus::EscrowLocked);
}

#[tokio::test]
async fn test_buyer_rejects_inbound_lock() {
    let market = Market::new().await;
    let lock = EscrowMessage::Lock {
        item: LISTING_HASH.to_string(),
        nonce: None,
        info: Default::default(),
        escrow: EscrowPayload {
            kind: EscrowPayloadType::Lock,
            rawtx: txid_for(0),
        },
    };

    let err = market
        .buyer
        .engine
        .process_event(&event(SELLER, BUYER, "0.0.1.0", lock))
        .await
        .unwrap_err();
    assert!(err.is_protocol_violation());
    assert_eq!(market.buyer.status().await, OrderItemStatus::AwaitingEscrow);
}

#[tokio::test]
async fn test_release_retry_after_failed_broadcast() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);
    seller
        .engine
        .release(&EscrowRequest::release(seller.item_id, ""))
        .await
        .unwrap();
    market.deliver().await;

    let request = EscrowRequest::release(buyer.item_id, "");
    buyer.rpc.set_fail_broadcast(true);
    let err = buyer.engine.release(&request).await.unwrap_err();
    assert!(matches!(err, EscrowError::Rpc(_)));
    assert_eq!(buyer.status().await, OrderItemStatus::Shipping);
    assert_eq!(buyer.rawtx().await.phase, RawTxPhase::FinalHex);

    buyer.rpc.set_fail_broadcast(false);
    let outcome = buyer.engine.release(&request).await.unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::Complete);
    assert_eq!(outcome.rawtx.value, txid_for(1));
    assert_eq!(
        buyer.rpc.broadcasts()[1],
        format!("{}{}{}", UNSIGNED_SPEND, SIGNATURE, SIGNATURE)
    );

    market.deliver().await;
    assert_eq!(seller.status().await, OrderItemStatus::Complete);
}

#[tokio::test]
async fn test_seller_declines_refund() {
    let market = locked_market().await;
    let (buyer, seller) = (&market.buyer, &market.seller);
    buyer
        .engine
        .request_refund(&EscrowRequest::request_refund(buyer.item_id, "never arrived"))
        .await
        .unwrap();
    market.deliver().await;

    let outcome = seller
        .engine
        .refund(&EscrowRequest::refund(seller.item_id, false, "tracking shows delivered"))
        .await
        .unwrap();
    assert_eq!(outcome.order_item.status, OrderItemStatus::EscrowLocked);
    assert_eq!(outcome.rawtx.phase, RawTxPhase::BroadcastRef);
    assert!(matches!(
        outcome.message.mpaction,
        EscrowMessage::Refund {
            accepted: false,
            ..
        }
    ));
    assert!(seller.rpc.created().is_empty());
    assert!(seller.rpc.signed().is_empty());

    market.deliver().await;
    assert_eq!(buyer.status().await, OrderItemStatus::EscrowLocked);
    let records = buyer.store.find_by_listing(LISTING_HASH).await.unwrap();
    let declined = records.last().unwrap();
    assert_eq!(declined.action, EscrowActionType::Refund);
    assert!(declined.payload.contains("tracking shows delivered"));

    // Declining does not stop a later release.
    seller
        .engine
        .release(&EscrowRequest::release(seller.item_id, ""))
        .await
        .unwrap();
    assert_eq!(seller.status().await, OrderItemStatus::Shipping);
}

#[tokio::test]
async fn test_declined_refund_only_records() {
    let market = locked_market().await;
    let declined = EscrowMessage::Refund {
        item: LISTING_HASH.to_string(),
        accepted: false,
        memo: "no".to_string(),
        escrow: EscrowPayload {
            kind: EscrowPayloadType::Refund,
            rawtx: txid_for(0),
        },
    };

    let outcome = market
        .buyer
        .engine
        .process_refund_escrow_received_event(&event(SELLER, BUYER, "0.0.1.0", declined))
        .await
        .unwrap();
    assert!(outcome.order_item.is_none());
    assert_eq!(outcome.record.action, EscrowActionType::Refund);
    assert_eq!(market.buyer.status().await, OrderItemStatus::EscrowLocked);
}

#[tokio::test]
async fn test_handler_rejects_mismatched_action() {
    let market = Market::new().await;
    let err = market
        .seller
        .engine
        .process_lock_escrow_received_event(&event(
            BUYER,
            SELLER,
            "0.0.1.0",
            release_message("beef"),
        ))
        .await
        .unwrap_err();
    assert!(err.is_protocol_violation());
}

#[tokio::test]
async fn test_concurrent_steps_on_one_item_are_serialized() {
    let market = locked_market().await;
    let seller = &market.seller;
    let request = EscrowRequest::release(seller.item_id, "");

    let engine = Arc::clone(&seller.engine);
    let results = join_all((0..4).map(|_| engine.release(&request))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.is_protocol_violation()));
    assert_eq!(seller.rpc.created().len(), 1);
    assert_eq!(seller.status().await, OrderItemStatus::Shipping);

    let releases = market
        .bus
        .sent()
        .await
        .into_iter()
        .filter(|(_, m)| m.mpaction.action_type() == EscrowActionType::Release)
        .count();
    assert_eq!(releases, 1);
}

#[tokio::test]
async fn test_poller_drives_flow_in_background() {
    let market = Market::new().await;
    let cancel = CancellationToken::new();
    let handle = Arc::new(market.seller.poller(&market.bus)).spawn(cancel.clone());

    market
        .buyer
        .engine
        .lock(&EscrowRequest::lock(market.buyer.item_id, None, ""))
        .await
        .unwrap();

    let mut locked = false;
    for _ in 0..100 {
        if market.seller.status().await == OrderItemStatus::EscrowLocked {
            locked = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    cancel.cancel();
    handle.await.unwrap();
    assert!(locked);
}
