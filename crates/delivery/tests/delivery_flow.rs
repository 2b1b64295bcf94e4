//! Arm, start, flight and subscription flows against in-memory collaborators.
//!
//! Timer-driven tests run on a paused clock, so 30 seconds of simulated
//! delivery take no wall time.

use std::time::Duration;

use common::OrderId;
use delivery::{DeliveryConfig, DeliveryEngine, DeliveryError, DroneEvent, OrderEvent, Subscription};
use domain::{
    DeliveryStatus, GeoPoint, Money, Order, OrderError, OrderItem, PlaceOrder, REFERENCE_POINT,
    ShippingInfo, pseudo_geocode,
};
use futures_util::StreamExt;
use order_store::{InMemoryOrderStore, OrderStore};
use saga::InMemoryProductCatalog;

const RESTAURANT: GeoPoint = GeoPoint::new(10.7626, 106.6822);
const ADDRESS: &str = "45 Le Thanh Ton";

type Engine = DeliveryEngine<InMemoryOrderStore, InMemoryProductCatalog>;

struct Harness {
    engine: Engine,
    store: InMemoryOrderStore,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(DeliveryConfig::default())
    }

    fn with_config(config: DeliveryConfig) -> Self {
        let store = InMemoryOrderStore::new();
        let catalog = InMemoryProductCatalog::new();
        catalog.add_product("A", "Bun cha", Money::from_decimal(5.0), 10, Some("r-1"));
        catalog.add_product("orphan", "Xoi", Money::from_decimal(1.0), 10, None);
        catalog.add_restaurant("r-1", RESTAURANT);

        Self {
            engine: DeliveryEngine::new(store.clone(), catalog, config),
            store,
        }
    }

    async fn order(&self, product: &str, address: Option<&str>) -> OrderId {
        let order = Order::place(PlaceOrder {
            items: vec![OrderItem::new(product, 2, Money::from_decimal(5.0))],
            user_email: None,
            shipping: ShippingInfo {
                address: address.map(str::to_string),
                ..Default::default()
            },
            payment_method: None,
            transaction_id: None,
        })
        .unwrap();
        self.store.insert(&order).await.unwrap();
        order.id()
    }

    async fn status(&self, order_id: OrderId) -> DeliveryStatus {
        self.store.get(order_id).await.unwrap().unwrap().status()
    }
}

async fn next_event(stream: &mut Subscription) -> OrderEvent {
    tokio::time::timeout(Duration::from_secs(120), stream.next())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended")
}

#[tokio::test(start_paused = true)]
async fn test_arm_then_timer_moves_to_preparing() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;

    let armed = h.engine.arm(order_id).await.unwrap();
    assert_eq!(armed.status(), DeliveryStatus::PickupStarted);
    assert!(h.engine.arm_pending(order_id).await);

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(h.status(order_id).await, DeliveryStatus::PickupStarted);

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(h.status(order_id).await, DeliveryStatus::PreparingForDelivery);
    assert!(!h.engine.arm_pending(order_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_start_after_arm_is_never_overwritten_by_the_timer() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;

    h.engine.arm(order_id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.engine.start(order_id).await.unwrap();
    assert!(!h.engine.arm_pending(order_id).await);

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(h.status(order_id).await, DeliveryStatus::DeliveringByDrone);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_the_pending_timer() {
    let h = Harness::new();
    let order_id = h.order("A", None).await;

    h.engine.arm(order_id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    let rearmed = h.engine.arm(order_id).await.unwrap();
    assert_eq!(rearmed.status(), DeliveryStatus::PickupStarted);

    // The first timer would have fired by now.
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(h.status(order_id).await, DeliveryStatus::PickupStarted);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(h.status(order_id).await, DeliveryStatus::PreparingForDelivery);
}

#[tokio::test(start_paused = true)]
async fn test_arm_past_pickup_is_a_no_op() {
    let h = Harness::new();
    let order_id = h.order("A", None).await;
    h.engine
        .force_status(order_id, DeliveryStatus::PreparingForDelivery)
        .await
        .unwrap();

    let order = h.engine.arm(order_id).await.unwrap();

    assert_eq!(order.status(), DeliveryStatus::PreparingForDelivery);
    assert!(!h.engine.arm_pending(order_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_full_flight_emits_route_61_positions_then_arrived() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;
    let mut stream = h.engine.subscribe(order_id).await.unwrap();

    assert_eq!(
        next_event(&mut stream).await,
        OrderEvent::Status {
            id: order_id,
            status: DeliveryStatus::DispatchedToRestaurant
        }
    );

    h.engine.start(order_id).await.unwrap();

    let OrderEvent::Drone(DroneEvent::Route { path, start, end }) = next_event(&mut stream).await
    else {
        panic!("expected the route first");
    };
    assert_eq!(path.len(), 61);
    assert_eq!(start, RESTAURANT);
    assert_eq!(end, pseudo_geocode(ADDRESS));

    assert_eq!(
        next_event(&mut stream).await,
        OrderEvent::Status {
            id: order_id,
            status: DeliveryStatus::DeliveringByDrone
        }
    );

    let mut positions = Vec::new();
    loop {
        match next_event(&mut stream).await {
            OrderEvent::Drone(DroneEvent::Pos { lat, lng, progress }) => {
                positions.push((lat, lng, progress));
            }
            OrderEvent::Drone(DroneEvent::Arrived { lat, lng }) => {
                assert_eq!(GeoPoint::new(lat, lng), end);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(positions.len(), 61);
    assert_eq!(positions[0], (RESTAURANT.lat, RESTAURANT.lng, 0.0));
    assert_eq!(positions[60], (end.lat, end.lng, 1.0));
    // Arrival does not deliver the order.
    assert_eq!(h.status(order_id).await, DeliveryStatus::DeliveringByDrone);
}

#[tokio::test(start_paused = true)]
async fn test_late_subscriber_gets_route_and_last_position() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;
    h.engine.start(order_id).await.unwrap();

    // Ten ticks at 500ms.
    tokio::time::sleep(Duration::from_millis(5_200)).await;

    let session = h.engine.session(order_id).await.unwrap();
    let expected = session.route().path()[9];
    assert_eq!(session.last_position(), Some(expected));

    let mut stream = h.engine.subscribe(order_id).await.unwrap();
    assert_eq!(
        next_event(&mut stream).await,
        OrderEvent::Status {
            id: order_id,
            status: DeliveryStatus::DeliveringByDrone
        }
    );
    assert!(matches!(
        next_event(&mut stream).await,
        OrderEvent::Drone(DroneEvent::Route { .. })
    ));
    assert_eq!(
        next_event(&mut stream).await,
        OrderEvent::Drone(DroneEvent::position(&expected))
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_the_flight() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;
    let mut stream = h.engine.subscribe(order_id).await.unwrap();

    h.engine.start(order_id).await.unwrap();
    let first_run = h.engine.session(order_id).await.unwrap().run_id();
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.engine.start(order_id).await.unwrap();
    assert_ne!(h.engine.session(order_id).await.unwrap().run_id(), first_run);

    let mut arrivals = 0;
    let mut routes = 0;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(10), stream.next()).await
    {
        match event {
            OrderEvent::Drone(DroneEvent::Arrived { .. }) => arrivals += 1,
            OrderEvent::Drone(DroneEvent::Route { .. }) => routes += 1,
            _ => {}
        }
    }

    assert_eq!(routes, 2);
    assert_eq!(arrivals, 1);
}

#[tokio::test(start_paused = true)]
async fn test_origin_falls_back_to_reference_point() {
    let h = Harness::new();
    let order_id = h.order("orphan", None).await;

    h.engine.start(order_id).await.unwrap();

    let session = h.engine.session(order_id).await.unwrap();
    assert_eq!(session.route().start(), REFERENCE_POINT);
    assert_eq!(session.route().end(), pseudo_geocode(""));
}

#[tokio::test(start_paused = true)]
async fn test_start_after_delivery_is_rejected() {
    let h = Harness::new();
    let order_id = h.order("A", None).await;
    h.engine
        .force_status(order_id, DeliveryStatus::DeliveredToHome)
        .await
        .unwrap();

    let err = h.engine.start(order_id).await.unwrap_err();

    assert!(matches!(
        err,
        DeliveryError::Order(OrderError::InvalidTransition { .. })
    ));
    assert!(h.engine.session(order_id).await.is_none());
    assert_eq!(h.status(order_id).await, DeliveryStatus::DeliveredToHome);
}

#[tokio::test]
async fn test_force_status_can_be_disabled() {
    let h = Harness::with_config(DeliveryConfig {
        allow_status_override: false,
        ..Default::default()
    });
    let order_id = h.order("A", None).await;

    let err = h
        .engine
        .force_status(order_id, DeliveryStatus::DeliveredToHome)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::OverrideDisabled));
    assert_eq!(h.status(order_id).await, DeliveryStatus::DispatchedToRestaurant);
}

#[tokio::test]
async fn test_force_status_broadcasts_the_change() {
    let h = Harness::new();
    let order_id = h.order("A", None).await;
    let mut stream = h.engine.subscribe(order_id).await.unwrap();
    next_event(&mut stream).await;

    let order = h
        .engine
        .force_status(order_id, DeliveryStatus::DeliveredToHome)
        .await
        .unwrap();

    assert_eq!(order.status(), DeliveryStatus::DeliveredToHome);
    assert_eq!(
        next_event(&mut stream).await,
        OrderEvent::Status {
            id: order_id,
            status: DeliveryStatus::DeliveredToHome
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_notifies_and_closes_subscribers() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;
    h.engine.arm(order_id).await.unwrap();
    h.engine.start(order_id).await.unwrap();
    let mut stream = h.engine.subscribe(order_id).await.unwrap();

    assert!(h.engine.delete(order_id).await.unwrap());

    let mut saw_deleted = false;
    while let Some(event) = stream.next().await {
        if event == (OrderEvent::Deleted { id: order_id }) {
            saw_deleted = true;
        }
    }
    assert!(saw_deleted);
    assert!(h.store.get(order_id).await.unwrap().is_none());
    assert!(h.engine.session(order_id).await.is_none());
    assert_eq!(h.engine.broadcaster().subscriber_count(order_id), 0);
    assert!(!h.engine.delete(order_id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ends_streams_and_refuses_new_ones() {
    let h = Harness::new();
    let order_id = h.order("A", Some(ADDRESS)).await;
    let mut first = h.engine.subscribe(order_id).await.unwrap();
    let mut second = h.engine.subscribe(order_id).await.unwrap();

    assert_eq!(h.engine.shutdown().await, 2);

    assert!(matches!(first.next().await, Some(OrderEvent::Status { .. })));
    assert_eq!(first.next().await, None);
    assert!(matches!(second.next().await, Some(OrderEvent::Status { .. })));
    assert_eq!(second.next().await, None);
    assert!(matches!(
        h.engine.subscribe(order_id).await,
        Err(DeliveryError::ShuttingDown)
    ));
    assert_eq!(h.engine.broadcaster().subscriber_count(order_id), 0);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let h = Harness::new();
    let missing = OrderId::new();

    assert!(matches!(h.engine.arm(missing).await, Err(DeliveryError::NotFound(_))));
    assert!(matches!(h.engine.start(missing).await, Err(DeliveryError::NotFound(_))));
    assert!(matches!(h.engine.subscribe(missing).await, Err(DeliveryError::NotFound(_))));
    assert!(matches!(
        h.engine.force_status(missing, DeliveryStatus::PickupStarted).await,
        Err(DeliveryError::NotFound(_))
    ));
}
