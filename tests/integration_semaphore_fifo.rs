//! End-to-end: two clients wait on the same semaphore index before any
//! signal arrives; once two signals arrive, grants go out in arrival
//! (FIFO) order - the first waiter first, the second waiter second.

mod common;

use fabricsim::message::{Message, MessageKind, MessagePayload};
use fabricsim::pe::SemaphoreClient;
use fabricsim::resource::Resource;
use fabricsim::semaphore::SemaphoreStation;

use common::bare_simulator;

/// Drain `sem0`'s "out" port, route each message to whichever of `clients`
/// its `dst` field names (dropping anything addressed elsewhere, such as
/// the `sem_ack` replies back to a signal's sender), and return the `dst`
/// order the `sem_granted` messages arrived in.
fn route_grants(sem0: &mut SemaphoreStation, clients: &mut [&mut SemaphoreClient]) -> Vec<String> {
    let drained: Vec<Message> = sem0
        .out_queues_mut()
        .get_mut("out")
        .map(|q| q.drain(..).collect())
        .unwrap_or_default();
    let mut grant_order = Vec::new();
    for msg in drained {
        if msg.kind == MessageKind::SemGranted {
            grant_order.push(msg.dst.clone());
        }
        if let Some(client) = clients.iter_mut().find(|c| c.name() == msg.dst) {
            client.in_queues_mut().entry("in".to_string()).or_default().push_back(msg);
        }
    }
    grant_order
}

#[test]
fn grants_are_released_in_wait_order() {
    let mut sim = bare_simulator();

    let mut sem0 = SemaphoreStation::new("sem0", 1).unwrap();
    let mut client_a = SemaphoreClient::new("a", "sem0", 0).with_start_tick(0);
    let mut client_b = SemaphoreClient::new("b", "sem0", 0).with_start_tick(0);

    // Both clients wait before any signal arrives. Ticking (and piping)
    // client_a ahead of client_b each round means its wait lands in sem0's
    // "in" queue first, so it queues up as the first waiter.
    for _ in 0..2 {
        client_a.tick(&mut sim);
        client_b.tick(&mut sim);
        sem0.tick(&mut sim);

        for msg in client_a.out_queues_mut().get_mut("out").unwrap().drain(..) {
            sem0.in_queues_mut().get_mut("in").unwrap().push_back(msg);
        }
        for msg in client_b.out_queues_mut().get_mut("out").unwrap().drain(..) {
            sem0.in_queues_mut().get_mut("in").unwrap().push_back(msg);
        }

        sim.ticks += 1;
    }

    // Inject two signals in the same tick; FIFO waiters should be granted
    // in the order they queued up, not the order the signals arrived.
    let signal_one = Message::new(
        "source",
        "sem0",
        1,
        MessageKind::SemSignal,
        MessagePayload::SemOp { index: 0, buffer_id: None, state: None },
        sim.ticks,
    );
    let signal_two = Message::new(
        "source",
        "sem0",
        1,
        MessageKind::SemSignal,
        MessagePayload::SemOp { index: 0, buffer_id: None, state: None },
        sim.ticks,
    );
    sem0.in_queues_mut()
        .entry("in".to_string())
        .or_default()
        .extend([signal_one, signal_two]);

    sem0.tick(&mut sim);
    let grant_order = route_grants(&mut sem0, &mut [&mut client_a, &mut client_b]);
    assert_eq!(grant_order, vec!["a".to_string(), "b".to_string()]);

    sim.ticks += 1;
    client_a.tick(&mut sim);
    client_b.tick(&mut sim);

    assert_eq!(client_a.granted(), 1);
    assert_eq!(client_b.granted(), 1);
}
