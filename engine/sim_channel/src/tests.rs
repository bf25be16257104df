use super::*;
use std::thread;
use std::time::Duration;

/// Long enough for a spawned getter to reach its wait.
const SETTLE: Duration = Duration::from_millis(50);

#[test]
fn test_put_get_fifo() {
    let chan = Channel::bounded(4, 1);
    chan.put(1).unwrap();
    chan.put(2).unwrap();
    chan.put(3).unwrap();

    assert_eq!(chan.len(), 3);
    assert_eq!(chan.get().unwrap(), Some(1));
    assert_eq!(chan.get().unwrap(), Some(2));
    assert_eq!(chan.get().unwrap(), Some(3));
    assert!(chan.is_empty());
}

#[test]
fn test_capacity_is_at_least_one() {
    let chan: Channel<u8> = Channel::bounded(0, 1);
    assert_eq!(chan.capacity(), 1);
}

#[test]
fn test_put_blocks_while_full() {
    let chan = Arc::new(Channel::bounded(1, 1));
    chan.put(1).unwrap();

    let writer = {
        let chan = Arc::clone(&chan);
        thread::spawn(move || chan.put(2))
    };
    thread::sleep(SETTLE);
    assert!(!writer.is_finished());

    assert_eq!(chan.get().unwrap(), Some(1));
    writer.join().unwrap().unwrap();
    assert_eq!(chan.get().unwrap(), Some(2));
}

#[test]
fn test_close_drains_then_marker() {
    let chan = Channel::bounded(4, 1);
    chan.put("a").unwrap();
    chan.put("b").unwrap();
    chan.dec_writer();

    assert_eq!(chan.state(), ChannelState::Closed);
    assert_eq!(chan.get().unwrap(), Some("a"));
    assert_eq!(chan.get().unwrap(), Some("b"));
    assert_eq!(chan.get().unwrap(), None);
    // The marker is sticky.
    assert_eq!(chan.get().unwrap(), None);
}

#[test]
fn test_reference_counted_close() {
    let chan = Arc::new(Channel::bounded(4, 2));
    chan.put(7).unwrap();
    chan.dec_writer();
    assert_eq!(chan.state(), ChannelState::Open);

    let reader = {
        let chan = Arc::clone(&chan);
        thread::spawn(move || {
            let first = chan.get().unwrap();
            let second = chan.get().unwrap();
            (first, second)
        })
    };
    thread::sleep(SETTLE);
    // Drained the one item, then blocked: one writer is still registered.
    assert!(!reader.is_finished());

    chan.dec_writer();
    assert_eq!(reader.join().unwrap(), (Some(7), None));
    assert_eq!(chan.state(), ChannelState::Closed);
}

#[test]
fn test_close_wakes_every_blocked_getter() {
    let chan: Arc<Channel<u32>> = Arc::new(Channel::bounded(4, 1));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.get())
        })
        .collect();
    thread::sleep(SETTLE);

    chan.dec_writer();
    for reader in readers {
        assert_eq!(reader.join().unwrap().unwrap(), None);
    }
}

#[test]
fn test_crash_unblocks_getter_with_error() {
    let chan: Arc<Channel<u32>> = Arc::new(Channel::bounded(4, 1));
    let reader = {
        let chan = Arc::clone(&chan);
        thread::spawn(move || chan.get())
    };
    thread::sleep(SETTLE);
    assert!(!reader.is_finished());

    assert!(chan.crash("x"));
    let err = reader.join().unwrap().unwrap_err();
    assert_eq!(err.reason(), "x");

    assert!(chan.put(1).is_err());
    assert!(chan.get().is_err());
    assert_eq!(chan.state(), ChannelState::Crashed);
}

#[test]
fn test_crash_unblocks_putter() {
    let chan = Arc::new(Channel::bounded(1, 1));
    chan.put(1).unwrap();
    let writer = {
        let chan = Arc::clone(&chan);
        thread::spawn(move || chan.put(2))
    };
    thread::sleep(SETTLE);

    chan.crash("abort");
    assert_eq!(writer.join().unwrap().unwrap_err().reason(), "abort");
}

#[test]
fn test_crash_fails_even_with_items_queued() {
    let chan = Channel::bounded(4, 1);
    chan.put(1).unwrap();
    chan.crash("boom");
    assert!(chan.get().is_err());
}

#[test]
fn test_crash_is_one_shot() {
    let chan: Channel<u32> = Channel::bounded(4, 1);
    assert!(chan.crash("first"));
    assert!(!chan.crash("second"));
    assert_eq!(chan.get().unwrap_err().reason(), "first");
}

#[test]
fn test_crash_takes_precedence_over_close() {
    let chan: Channel<u32> = Channel::bounded(4, 1);
    chan.dec_writer();
    chan.crash("late");
    assert_eq!(chan.state(), ChannelState::Crashed);
    assert!(chan.get().is_err());
}

#[test]
fn test_extra_dec_writer_is_ignored() {
    let chan: Channel<u32> = Channel::bounded(4, 1);
    chan.dec_writer();
    chan.dec_writer();
    assert_eq!(chan.state(), ChannelState::Closed);
    assert_eq!(chan.get().unwrap(), None);
}

#[test]
fn test_many_producers_many_consumers() {
    let chan = Arc::new(Channel::bounded(2, 4));
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let chan = Arc::clone(&chan);
            thread::spawn(move || {
                for i in 0..25 {
                    chan.put(p * 100 + i).unwrap();
                }
                chan.dec_writer();
            })
        })
        .collect();
    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let chan = Arc::clone(&chan);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = chan.get().unwrap() {
                    seen.push(item);
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut all: Vec<u32> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    all.sort_unstable();

    let mut expected: Vec<u32> = (0..4)
        .flat_map(|p| (0..25).map(move |i| p * 100 + i))
        .collect();
    expected.sort_unstable();
    assert_eq!(all, expected);
}
