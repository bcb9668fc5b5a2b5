//! Common test utilities for escrow integration tests.

#![allow(dead_code)]

pub mod mock_services;

pub use mock_services::*;

use std::sync::Arc;
use std::time::Duration;

use escrow_bitcoin::Amount;
use escrow_core::{EscrowActionEngine, EscrowEventRouter};
use escrow_messaging::{InMemoryBus, InboxPoller, MessageTransport};
use escrow_storage::{OrderItemObjectStore, OrderItemStore, SqliteStore};
use escrow_types::{
    data_ids, BidAction, EscrowConfig, EscrowInfo, EscrowType, Listing, OrderItem,
    OrderItemStatus, RawTxArtifact,
};

pub const BUYER: &str = "pbuyer";
pub const SELLER: &str = "pseller";
pub const LISTING_HASH: &str = "listing-hash-1";
pub const BUYER_ADDRESS: &str = "buyer-payout-addr";
pub const NEGOTIATED_TX: &str = "0200000001";
pub const PUBKEYS: &str = r#"["pk-seller","pk-buyer"]"#;

/// What a party's store holds before the escrow phase starts.
#[derive(Debug, Clone)]
pub struct Seed {
    pub status: OrderItemStatus,
    pub bid_action: BidAction,
    pub with_escrow: bool,
    pub objects: Vec<(&'static str, String)>,
}

impl Default for Seed {
    fn default() -> Self {
        Self {
            status: OrderItemStatus::AwaitingEscrow,
            bid_action: BidAction::Accept,
            with_escrow: true,
            objects: vec![
                (data_ids::PUBKEYS, PUBKEYS.to_string()),
                (data_ids::RAWTX, NEGOTIATED_TX.to_string()),
                (data_ids::ADDRESS, BUYER_ADDRESS.to_string()),
            ],
        }
    }
}

impl Seed {
    pub fn with_status(status: OrderItemStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Replace (or add) one object value.
    pub fn object(mut self, data_id: &'static str, value: impl Into<String>) -> Self {
        self.objects.retain(|(id, _)| *id != data_id);
        self.objects.push((data_id, value.into()));
        self
    }

    pub fn without(mut self, data_id: &'static str) -> Self {
        self.objects.retain(|(id, _)| *id != data_id);
        self
    }
}

/// Seed one party's view of the order. The seller's listing is backed by a
/// local template; the buyer's is not.
pub async fn seed_store(store: &SqliteStore, local_is_seller: bool, seed: &Seed) -> i64 {
    store
        .insert_listing(&Listing {
            hash: LISTING_HASH.to_string(),
            seller: SELLER.to_string(),
            template_id: local_is_seller.then_some(7),
            escrow: seed.with_escrow.then_some(EscrowInfo {
                id: 1,
                escrow_type: EscrowType::Mad,
            }),
        })
        .unwrap();
    let bid_id = store
        .insert_bid(seed.bid_action, BUYER, LISTING_HASH)
        .unwrap();
    let order_id = store.insert_order(BUYER, SELLER).unwrap();
    let item_id = store
        .insert_order_item(order_id, bid_id, LISTING_HASH, seed.status)
        .unwrap();

    for (data_id, value) in &seed.objects {
        store.create(item_id, data_id, value).await.unwrap();
    }
    item_id
}

/// One side of the trade: its own store, wallet and engine.
pub struct Party {
    pub address: &'static str,
    pub store: Arc<SqliteStore>,
    pub rpc: Arc<MockRawTransactionClient>,
    pub engine: Arc<EscrowActionEngine>,
    pub item_id: i64,
}

impl Party {
    pub async fn buyer(transport: Arc<dyn MessageTransport>, seed: Seed) -> Self {
        Self::new(BUYER, false, transport, seed).await
    }

    pub async fn seller(transport: Arc<dyn MessageTransport>, seed: Seed) -> Self {
        Self::new(SELLER, true, transport, seed).await
    }

    async fn new(
        address: &'static str,
        local_is_seller: bool,
        transport: Arc<dyn MessageTransport>,
        seed: Seed,
    ) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let item_id = seed_store(&store, local_is_seller, &seed).await;
        let rpc = Arc::new(MockRawTransactionClient::new(Amount::ONE_BTC));
        let engine = Arc::new(
            EscrowActionEngine::new(
                rpc.clone(),
                transport,
                store.clone(),
                EscrowConfig::default(),
            )
            .unwrap(),
        );

        Self {
            address,
            store,
            rpc,
            engine,
            item_id,
        }
    }

    pub async fn item(&self) -> OrderItem {
        self.store.get(self.item_id).await.unwrap().unwrap()
    }

    pub async fn status(&self) -> OrderItemStatus {
        self.item().await.status
    }

    pub async fn rawtx(&self) -> RawTxArtifact {
        let item = self.item().await;
        let object = item.object(data_ids::RAWTX).unwrap();
        RawTxArtifact::parse(&object.data_value).unwrap()
    }

    /// Poller over this party's inbox on `bus`.
    pub fn poller(&self, bus: &InMemoryBus) -> InboxPoller {
        InboxPoller::new(
            Arc::new(bus.inbox(self.address)),
            Arc::new(EscrowEventRouter::new(self.engine.clone())),
            Duration::from_millis(10),
        )
    }
}

/// Buyer and seller talking over one in-memory bus.
pub struct Market {
    pub bus: InMemoryBus,
    pub buyer: Party,
    pub seller: Party,
}

impl Market {
    pub async fn new() -> Self {
        Self::with_seeds(Seed::default(), Seed::default()).await
    }

    pub async fn with_seeds(buyer: Seed, seller: Seed) -> Self {
        let bus = InMemoryBus::new();
        let transport: Arc<dyn MessageTransport> = Arc::new(bus.clone());
        Self {
            buyer: Party::buyer(transport.clone(), buyer).await,
            seller: Party::seller(transport, seller).await,
            bus,
        }
    }

    /// Drain both inboxes once.
    pub async fn deliver(&self) {
        self.seller.poller(&self.bus).poll_once().await.unwrap();
        self.buyer.poller(&self.bus).poll_once().await.unwrap();
    }
}
