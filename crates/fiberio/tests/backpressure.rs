//! Scenario D: with the in-flight AIO job cap set to 1, a second concurrent
//! operation is serialized behind the first rather than rejected — it is
//! only issued to the backend once the first op's completion frees the slot.

use fiberio::{Runtime, RuntimeConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn second_concurrent_op_is_serialized_behind_the_first_at_capacity_one() {
    let mut rt = Runtime::new(RuntimeConfig::new().backend("busy").aio_jobs_max(1)).expect("runtime construction");
    let order = Arc::new(Mutex::new(Vec::new()));

    rt.entry({
        let order = Arc::clone(&order);
        move || {
            // Frame A occupies the only in-flight slot with a longer sleep.
            fiberio::spawn(
                {
                    let order = Arc::clone(&order);
                    move || {
                        fiberio::sleep(Duration::from_millis(60)).expect("sleep A");
                        order.lock().unwrap().push('a');
                    }
                },
                32 * 1024,
            )
            .expect("spawn frame A");

            // Frame B's op loses the race for the in-flight slot and must
            // be held back — not failed — until A's sleep completes.
            fiberio::spawn(
                {
                    let order = Arc::clone(&order);
                    move || {
                        fiberio::sleep(Duration::from_millis(1)).expect("sleep B");
                        order.lock().unwrap().push('b');
                        fiberio::stop();
                    }
                },
                32 * 1024,
            )
            .expect("spawn frame B");
        }
    })
    .expect("entry");

    assert_eq!(*order.lock().unwrap(), vec!['a', 'b'], "second op must not complete before the first frees the in-flight slot");
}
