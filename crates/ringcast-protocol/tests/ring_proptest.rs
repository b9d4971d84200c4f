//! Property tests over an in-memory ring of routers.
//!
//! Frames move from peer `i` to peer `(i + 1) % n`, exactly as the
//! next-hop link would carry them, without any sockets.

use std::collections::{BTreeSet, VecDeque};

use proptest::prelude::*;
use ringcast_protocol::{PeerAddress, PeerName, Router, RoutingAction};
use ringcast_transport::Frame;

fn name(i: usize) -> PeerName {
    PeerName::new(format!("P{i}"))
}

struct Outcome {
    /// How many times each peer consumed the content.
    deliveries: Vec<usize>,
    /// Notifications that reached the originator, by recipient name.
    receipts: Vec<PeerName>,
    /// Frames processed before the ring went quiet.
    steps: usize,
}

/// Originate from `sender` to `recipients` and run the ring until no
/// frame is in flight.
fn run_ring(n: usize, max_hops: u32, sender: usize, recipients: &[usize]) -> Outcome {
    let mut routers: Vec<Router> = (0..n)
        .map(|i| {
            Router::new(name(i), PeerAddress::new("127.0.0.1", 9000 + i as u16))
                .with_max_hops(max_hops)
        })
        .collect();

    let frame = routers[sender]
        .originate(
            "m1",
            recipients.iter().map(|r| name(*r)).collect(),
            "hello ring",
        )
        .expect("valid frame");

    let mut in_flight: VecDeque<(usize, Frame)> = VecDeque::new();
    in_flight.push_back(((sender + 1) % n, Frame::Delivery(frame)));

    let mut outcome = Outcome {
        deliveries: vec![0; n],
        receipts: Vec::new(),
        steps: 0,
    };

    while let Some((at, frame)) = in_flight.pop_front() {
        outcome.steps += 1;
        assert!(outcome.steps < 10_000, "ring did not quiesce");
        let next = (at + 1) % n;
        match routers[at].route(frame) {
            RoutingAction::Deliver {
                notification,
                forward,
                ..
            } => {
                outcome.deliveries[at] += 1;
                if let Some(notice) = notification {
                    in_flight.push_back((next, Frame::Notification(notice)));
                }
                if let Some(f) = forward {
                    in_flight.push_back((next, Frame::Delivery(f)));
                }
            }
            RoutingAction::Notify { notice, forward } => match forward {
                Some(f) => in_flight.push_back((next, Frame::Notification(f))),
                None => {
                    assert_eq!(at, sender, "notification stopped away from its origin");
                    outcome.receipts.push(notice.sender);
                }
            },
            RoutingAction::Forward { frame } => in_flight.push_back((next, frame)),
            RoutingAction::Reject { reason } => panic!("unexpected reject: {reason}"),
            RoutingAction::Drop { .. } => {}
        }
    }
    outcome
}

fn ring_and_recipients() -> impl Strategy<Value = (usize, usize, Vec<usize>)> {
    (2usize..8).prop_flat_map(|n| {
        (
            Just(n),
            0..n,
            prop::collection::btree_set(0..n, 1..=n).prop_map(|s| s.into_iter().collect()),
        )
    })
}

proptest! {
    /// With enough hops, every recipient consumes the content exactly once,
    /// nobody else consumes it, and the sender gets one receipt per
    /// recipient other than itself.
    #[test]
    fn every_recipient_served_exactly_once(
        (n, sender, recipients) in ring_and_recipients(),
        slack in 0u32..5,
    ) {
        let max_hops = n as u32 + slack;
        let outcome = run_ring(n, max_hops, sender, &recipients);

        for peer in 0..n {
            let expected = usize::from(recipients.contains(&peer));
            prop_assert_eq!(outcome.deliveries[peer], expected, "peer P{}", peer);
        }

        let receipts: BTreeSet<PeerName> = outcome.receipts.iter().cloned().collect();
        let expected: BTreeSet<PeerName> = recipients
            .iter()
            .filter(|r| **r != sender)
            .map(|r| name(*r))
            .collect();
        prop_assert_eq!(outcome.receipts.len(), expected.len());
        prop_assert_eq!(receipts, expected);
    }

    /// A recipient `d` hops downstream is reached only if `d <= max_hops`,
    /// and the ring always goes quiet.
    #[test]
    fn hop_limit_bounds_reach(
        n in 2usize..10,
        max_hops in 1u32..10,
        distance_seed in any::<usize>(),
    ) {
        let distance = 1 + distance_seed % (n - 1);
        let outcome = run_ring(n, max_hops, 0, &[distance]);

        let reached = outcome.deliveries[distance] == 1;
        prop_assert_eq!(reached, distance as u32 <= max_hops);
        prop_assert!(outcome.deliveries.iter().all(|d| *d <= 1));
        prop_assert!(outcome.steps <= 2 * n + 2);
    }
}
