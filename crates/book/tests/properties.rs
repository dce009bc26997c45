//! Property tests for book reconstruction invariants.

use l3_book::OrderBookEngine;
use l3_core::{BookError, BookSide, L3BookEvent};
use proptest::prelude::*;

/// Mid point that bids stay below and asks stay above.
const MID: i64 = 10_000;

#[derive(Debug, Clone)]
enum Op {
    Add {
        side: BookSide,
        offset: i64,
        qty: i64,
    },
    Cancel { pick: usize },
    Modify {
        pick: usize,
        offset: i64,
        qty: i64,
    },
    Execute { pick: usize, qty: i64 },
}

fn side_strategy() -> impl Strategy<Value = BookSide> {
    prop_oneof![Just(BookSide::Bid), Just(BookSide::Ask)]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (side_strategy(), 1i64..20, 1i64..50)
            .prop_map(|(side, offset, qty)| Op::Add { side, offset, qty }),
        1 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
        1 => (any::<usize>(), 1i64..20, 1i64..50)
            .prop_map(|(pick, offset, qty)| Op::Modify { pick, offset, qty }),
        1 => (any::<usize>(), 1i64..50).prop_map(|(pick, qty)| Op::Execute { pick, qty }),
    ]
}

/// Price on the non-crossing half of the book for `side`.
fn price_for(side: BookSide, offset: i64) -> i64 {
    match side {
        BookSide::Bid => MID - offset,
        BookSide::Ask => MID + offset,
    }
}

proptest! {
    #[test]
    fn test_non_crossing_streams_never_cross(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let mut book = OrderBookEngine::new(10);
        let mut live: Vec<(u64, BookSide)> = Vec::new();
        let mut next_id = 1u64;

        for (ts, op) in ops.into_iter().enumerate() {
            let ts = ts as i64;
            let event = match op {
                Op::Add { side, offset, qty } => {
                    let id = next_id;
                    next_id += 1;
                    live.push((id, side));
                    L3BookEvent::add(ts, id, side, price_for(side, offset), qty)
                }
                Op::Cancel { pick } if !live.is_empty() => {
                    let (id, side) = live.swap_remove(pick % live.len());
                    L3BookEvent::cancel(ts, id, side)
                }
                Op::Modify { pick, offset, qty } if !live.is_empty() => {
                    let (id, side) = live[pick % live.len()];
                    L3BookEvent::modify(ts, id, side, price_for(side, offset), qty)
                }
                Op::Execute { pick, qty } if !live.is_empty() => {
                    let idx = pick % live.len();
                    let (id, side) = live[idx];
                    let (_, _, resting) = book.order(id).unwrap();
                    let qty = qty.min(resting);
                    if qty == resting {
                        live.swap_remove(idx);
                    }
                    L3BookEvent::execute(ts, id, side, qty)
                }
                _ => continue,
            };

            book.apply(&event).unwrap();
            prop_assert!(!book.is_crossed());
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                prop_assert!(bid.price < ask.price);
            }
            prop_assert_eq!(book.order_count(), live.len());
        }
    }

    #[test]
    fn test_add_then_cancel_restores_snapshot(
        seed in prop::collection::vec((side_strategy(), 1i64..20, 1i64..50), 0..40),
        side in side_strategy(),
        offset in 1i64..20,
        qty in 1i64..50,
    ) {
        let mut book = OrderBookEngine::new(50);
        for (i, (s, o, q)) in seed.into_iter().enumerate() {
            book.apply(&L3BookEvent::add(1, i as u64, s, price_for(s, o), q)).unwrap();
        }
        let before = book.snapshot(50);

        let id = 1_000_000;
        book.apply(&L3BookEvent::add(2, id, side, price_for(side, offset), qty)).unwrap();
        book.apply(&L3BookEvent::cancel(2, id, side)).unwrap();

        let mut after = book.snapshot(50);
        after.ts = before.ts;
        prop_assert_eq!(after, before);
    }

    #[test]
    fn test_crossing_add_always_rejected(offset in 0i64..20, qty in 1i64..50) {
        let mut book = OrderBookEngine::new(10);
        book.apply(&L3BookEvent::add(1, 1, BookSide::Ask, MID, 10)).unwrap();
        let crossing = L3BookEvent::add(2, 2, BookSide::Bid, MID + offset, qty);
        let err = book.apply(&crossing).unwrap_err();
        let is_cross = matches!(err, BookError::CrossedBook { .. });
        prop_assert!(is_cross);
        prop_assert_eq!(book.order_count(), 1);
    }
}

#[test]
fn test_fifo_with_decrease_and_interleaved_add() {
    let mut book = OrderBookEngine::new(10);
    book.apply(&L3BookEvent::add(1, 1, BookSide::Bid, MID, 10)).unwrap();
    book.apply(&L3BookEvent::add(2, 2, BookSide::Bid, MID, 10)).unwrap();
    // Decrease of the first order keeps it at the head.
    book.apply(&L3BookEvent::modify(3, 1, BookSide::Bid, MID, 6)).unwrap();
    book.apply(&L3BookEvent::add(4, 3, BookSide::Bid, MID, 10)).unwrap();

    // Exchange executions walk the queue head first.
    book.apply(&L3BookEvent::execute(5, 1, BookSide::Bid, 6)).unwrap();
    assert_eq!(book.queue_position(2), Some(0));
    assert_eq!(book.queue_position(3), Some(1));
    book.apply(&L3BookEvent::execute(6, 2, BookSide::Bid, 10)).unwrap();
    assert_eq!(book.queue_position(3), Some(0));
    assert_eq!(book.best_bid().unwrap().quantity, 10);
}
