use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use marketplace_server::models::ticket::{NewTicketType, ReservationLine};
use marketplace_server::services::TicketLedger;
use marketplace_server::store::{MemoryStore, TicketStore};
use marketplace_server::utils::error::AppError;

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sold_stays_within_total(
        totals in prop::collection::vec(1i32..20, 1..4),
        requests in prop::collection::vec(prop::collection::vec((0usize..4, 1i32..8), 1..4), 1..30),
    ) {
        run(async {
            let store = Arc::new(MemoryStore::new());
            let event_id = Uuid::new_v4();
            store.register_event(event_id, Uuid::new_v4());
            let ledger = TicketLedger::new(store.clone());

            let mut ids = Vec::new();
            for (i, total) in totals.iter().enumerate() {
                let ticket_type = store
                    .insert_ticket_type(
                        event_id,
                        NewTicketType {
                            name: format!("Tier {}", i),
                            price: 1000,
                            currency: "EUR".to_string(),
                            total: *total,
                        },
                    )
                    .await
                    .unwrap();
                ids.push(ticket_type.id);
            }

            let mut expected = vec![0i32; ids.len()];
            for request in &requests {
                let lines: Vec<ReservationLine> = request
                    .iter()
                    .map(|(index, quantity)| ReservationLine {
                        ticket_type_id: ids[index % ids.len()],
                        quantity: *quantity,
                    })
                    .collect();

                let mut wanted = vec![0i32; ids.len()];
                for (index, quantity) in request {
                    wanted[index % ids.len()] += quantity;
                }
                let fits = wanted
                    .iter()
                    .zip(&expected)
                    .zip(&totals)
                    .all(|((w, sold), total)| sold + w <= *total);

                match ledger.reserve(&lines).await {
                    Ok(()) => {
                        assert!(fits);
                        for (sold, w) in expected.iter_mut().zip(&wanted) {
                            *sold += w;
                        }
                    }
                    Err(AppError::InsufficientInventory { .. }) => assert!(!fits),
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            }

            for (i, id) in ids.iter().enumerate() {
                let ticket_type = store.get_ticket_type(*id).await.unwrap().unwrap();
                assert!(ticket_type.sold >= 0 && ticket_type.sold <= ticket_type.total);
                assert_eq!(ticket_type.sold, expected[i]);
            }
        });
    }
}
