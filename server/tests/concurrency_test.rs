use std::sync::Arc;

use marketplace_server::models::actor::{Actor, Role};
use marketplace_server::models::booking::{BookingAction, BookingStatus, NewBooking};
use marketplace_server::models::order::{CartLine, CheckoutRequest, OrderStatus};
use marketplace_server::models::slot::{NewSlot, SlotStatus};
use marketplace_server::models::ticket::NewTicketType;
use marketplace_server::payments::MockPaymentProcessor;
use marketplace_server::services::{AvailabilityCalendar, BookingLifecycle, Checkout, SlotLedger};
use marketplace_server::store::{MemoryStore, TicketStore};
use marketplace_server::utils::error::AppError;
use uuid::Uuid;

async fn event_with_ticket_type(store: &Arc<MemoryStore>, total: i32) -> (Uuid, Uuid) {
    let event_id = Uuid::new_v4();
    store.register_event(event_id, Uuid::new_v4());
    let ticket_type = store
        .insert_ticket_type(
            event_id,
            NewTicketType {
                name: "General".to_string(),
                price: 5000,
                currency: "RON".to_string(),
                total,
            },
        )
        .await
        .unwrap();
    (event_id, ticket_type.id)
}

fn cart(lines: &[(Uuid, i32)]) -> CheckoutRequest {
    CheckoutRequest {
        email: "buyer@example.com".to_string(),
        buyer_id: None,
        items: lines
            .iter()
            .map(|(id, quantity)| CartLine {
                ticket_type_id: *id,
                quantity: *quantity,
            })
            .collect(),
    }
}

fn checkout(store: &Arc<MemoryStore>) -> Arc<Checkout> {
    Arc::new(Checkout::new(
        store.clone(),
        store.clone(),
        None,
        "http://localhost:3001",
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_race_for_last_two_tickets() {
    let store = Arc::new(MemoryStore::new());
    let (event_id, ticket_type_id) = event_with_ticket_type(&store, 2).await;
    let checkout = checkout(&store);

    let a = {
        let checkout = checkout.clone();
        tokio::spawn(async move { checkout.create_order(event_id, cart(&[(ticket_type_id, 2)])).await })
    };
    let b = {
        let checkout = checkout.clone();
        tokio::spawn(async move { checkout.create_order(event_id, cart(&[(ticket_type_id, 2)])).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let paid = results
        .iter()
        .filter(|r| matches!(r, Ok(receipt) if receipt.status == OrderStatus::Paid))
        .count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::InsufficientInventory { remaining: 0, .. })))
        .count();
    assert_eq!(paid, 1);
    assert_eq!(refused, 1);

    let ticket_type = store.get_ticket_type(ticket_type_id).await.unwrap().unwrap();
    assert_eq!(ticket_type.sold, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_buyers_for_two_tickets_one_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let (event_id, ticket_type_id) = event_with_ticket_type(&store, 2).await;
    let checkout = checkout(&store);

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let checkout = checkout.clone();
            tokio::spawn(async move {
                checkout
                    .create_order(event_id, cart(&[(ticket_type_id, 1)]))
                    .await
            })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let paid = results
        .iter()
        .filter(|r| matches!(r, Ok(receipt) if receipt.status == OrderStatus::Paid))
        .count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::InsufficientInventory { remaining: 0, .. })))
        .count();
    assert_eq!(paid, 2);
    assert_eq!(sold_out, 1);
    assert_eq!(store.get_ticket_type(ticket_type_id).await.unwrap().unwrap().sold, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_payment_confirmations_settle_once() {
    let store = Arc::new(MemoryStore::new());
    let (event_id, ticket_type_id) = event_with_ticket_type(&store, 10).await;
    let processor = Arc::new(MockPaymentProcessor::new());
    let checkout = Arc::new(Checkout::new(
        store.clone(),
        store.clone(),
        Some(processor.clone()),
        "http://localhost:3001",
    ));

    let receipt = checkout
        .create_order(event_id, cart(&[(ticket_type_id, 2)]))
        .await
        .unwrap();
    let session_id = checkout
        .get_order(receipt.order_id)
        .await
        .unwrap()
        .order
        .payment_session_id
        .unwrap();
    processor.mark_paid(&session_id);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let checkout = checkout.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { checkout.confirm_order(&session_id).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), receipt.order_id);
    }

    let order = checkout.get_order(receipt.order_id).await.unwrap();
    assert_eq!(order.order.status, OrderStatus::Paid);
    assert_eq!(store.get_ticket_type(ticket_type_id).await.unwrap().unwrap().sold, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_buyers_never_oversell() {
    let store = Arc::new(MemoryStore::new());
    let (event_id, ticket_type_id) = event_with_ticket_type(&store, 25).await;
    let checkout = checkout(&store);

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let checkout = checkout.clone();
            let quantity = 1 + (i % 3);
            tokio::spawn(async move {
                checkout
                    .create_order(event_id, cart(&[(ticket_type_id, quantity)]))
                    .await
                    .map(|receipt| (receipt.status, quantity))
            })
        })
        .collect();

    let mut sold_by_orders = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok((OrderStatus::Paid, quantity)) => sold_by_orders += quantity,
            Ok((status, _)) => panic!("unexpected status {:?}", status),
            Err(AppError::InsufficientInventory { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let ticket_type = store.get_ticket_type(ticket_type_id).await.unwrap().unwrap();
    assert!(ticket_type.sold <= ticket_type.total);
    assert_eq!(ticket_type.sold, sold_by_orders);
}

#[tokio::test]
async fn multi_line_cart_is_all_or_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (event_id, plenty) = event_with_ticket_type(&store, 100).await;
    let scarce = store
        .insert_ticket_type(
            event_id,
            NewTicketType {
                name: "Backstage".to_string(),
                price: 20000,
                currency: "RON".to_string(),
                total: 1,
            },
        )
        .await
        .unwrap();
    let checkout = checkout(&store);

    checkout
        .create_order(event_id, cart(&[(scarce.id, 1)]))
        .await
        .unwrap();
    let err = checkout
        .create_order(event_id, cart(&[(plenty, 3), (scarce.id, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientInventory { id, .. } if id == scarce.id));
    assert_eq!(store.get_ticket_type(plenty).await.unwrap().unwrap().sold, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accept_and_decline_only_one_wins() {
    let store = Arc::new(MemoryStore::new());
    let calendar = Arc::new(AvailabilityCalendar::new(store.clone()));
    let lifecycle = Arc::new(BookingLifecycle::new(store.clone(), calendar));
    let client = Actor::new(Uuid::new_v4(), Role::Client);
    let provider = Actor::new(Uuid::new_v4(), Role::Provider);

    let booking = lifecycle
        .create_booking(
            &client,
            NewBooking {
                provider_id: provider.id,
                date: chrono::NaiveDate::from_ymd_opt(2026, 12, 24).unwrap(),
                city: "Iasi".to_string(),
                price_gross: None,
                fee: None,
            },
        )
        .await
        .unwrap();
    let booking_id = booking.id;

    let accept = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            lifecycle
                .transition(booking_id, &provider, BookingAction::Accept)
                .await
        })
    };
    let decline = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            lifecycle
                .transition(booking_id, &provider, BookingAction::Decline)
                .await
        })
    };
    let results = [accept.await.unwrap(), decline.await.unwrap()];

    let winners: Vec<BookingStatus> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|b| b.status))
        .collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::IllegalTransition(v)) if v.constraint() == "state")));

    let stored = lifecycle.get_booking(&client, booking_id).await.unwrap();
    assert_eq!(stored.status, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slot_reservations_respect_capacity() {
    let store = Arc::new(MemoryStore::new());
    let provider = Actor::new(Uuid::new_v4(), Role::Provider);
    let activity_id = Uuid::new_v4();
    store.register_activity(activity_id, provider.id);
    let ledger = Arc::new(SlotLedger::new(store));

    let start_at = chrono::Utc::now() + chrono::Duration::days(7);
    let slot = ledger
        .create_slot(
            &provider,
            activity_id,
            NewSlot {
                start_at,
                end_at: start_at + chrono::Duration::hours(1),
                capacity_total: 10,
                note: None,
            },
        )
        .await
        .unwrap();

    let slot_id = slot.id;
    let handles: Vec<_> = (0..30)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve(slot_id, 1).await.is_ok() })
        })
        .collect();
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 10);
    let slot = ledger.get_slot(slot_id).await.unwrap();
    assert_eq!(slot.capacity_booked, 10);
    assert_eq!(slot.status, SlotStatus::SoldOut);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reopening_while_reserving_never_leaves_a_full_slot_open() {
    let store = Arc::new(MemoryStore::new());
    let provider = Actor::new(Uuid::new_v4(), Role::Provider);
    let activity_id = Uuid::new_v4();
    store.register_activity(activity_id, provider.id);
    let ledger = Arc::new(SlotLedger::new(store));

    let start_at = chrono::Utc::now() + chrono::Duration::days(3);
    let slot_id = ledger
        .create_slot(
            &provider,
            activity_id,
            NewSlot {
                start_at,
                end_at: start_at + chrono::Duration::hours(2),
                capacity_total: 5,
                note: None,
            },
        )
        .await
        .unwrap()
        .id;

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                let _ = ledger.reserve(slot_id, 1).await;
            } else {
                let _ = ledger.set_status(&provider, slot_id, SlotStatus::Open).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let slot = ledger.get_slot(slot_id).await.unwrap();
    assert_eq!(slot.capacity_booked, 5);
    assert_eq!(slot.status, SlotStatus::SoldOut);
}
