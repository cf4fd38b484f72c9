//! ## pwrlvl-api::sse
//! The streaming route.
//!
//! After the header block and the subscriber's backfill, each bus event is written as
//! `data: <json>\n\n`. An idle interval produces `: keepalive\n\n`, which is also how a
//! dead peer is noticed. A write failure is the only exit; dropping the subscription on
//! the way out unsubscribes it.

use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use pwrlvl_core::{Event, Recv, Subscription};

pub const STREAM_HEADERS: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\nAccess-Control-Allow-Origin: *\r\n\r\n";
pub const KEEPALIVE: &[u8] = b": keepalive\n\n";

pub fn frame(event: &Event) -> Vec<u8> {
    format!("data: {}\n\n", event.to_json()).into_bytes()
}

/// Streams `subscription` into `writer` until a write fails or the bus goes away.
pub fn stream_events<W: Write>(
    writer: &mut W,
    mut subscription: Subscription,
    keepalive: Duration,
) -> io::Result<()> {
    let id = subscription.id();
    writer.write_all(STREAM_HEADERS.as_bytes())?;
    for event in subscription.take_backfill() {
        writer.write_all(&frame(&event))?;
    }
    writer.flush()?;
    debug!(subscriber = id, "Event stream open");

    loop {
        match subscription.recv_timeout(keepalive) {
            Recv::Event(event) => writer.write_all(&frame(&event))?,
            Recv::Timeout => writer.write_all(KEEPALIVE)?,
            Recv::Closed => return Ok(()),
        }
        writer.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwrlvl_core::{EventBus, EventLevel};
    use std::sync::Arc;
    use std::thread;

    /// Accepts a fixed number of writes, then fails like a closed socket.
    struct Budget {
        written: Vec<u8>,
        writes_left: usize,
    }

    impl Write for Budget {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.writes_left -= 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn backfill_then_keepalive_until_write_fails() {
        let bus = EventBus::new(10, 10, 5);
        bus.publish(EventLevel::Info, "one");
        bus.publish(EventLevel::Scan, "two");
        let subscription = bus.subscribe();
        let id = subscription.id();

        let mut sink = Budget {
            written: Vec::new(),
            writes_left: 4,
        };
        let result = stream_events(&mut sink, subscription, Duration::from_millis(20));
        assert!(result.is_err());
        assert!(!bus.is_subscribed(id));

        let text = String::from_utf8(sink.written).unwrap();
        assert!(text.starts_with(STREAM_HEADERS));
        let body = &text[STREAM_HEADERS.len()..];
        let frames: Vec<&str> = body.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("data: {") && frames[0].contains("\"msg\":\"one\""));
        assert!(frames[1].contains("\"level\":\"SCAN\""));
        assert_eq!(frames[2], ": keepalive");
    }

    #[test]
    fn live_events_follow_backfill() {
        let bus: Arc<EventBus> = EventBus::new(10, 10, 5);
        bus.publish(EventLevel::Info, "before");
        let subscription = bus.subscribe();

        let publisher = {
            let bus = bus.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                bus.publish(EventLevel::Xp, "after");
            })
        };
        let mut sink = Budget {
            written: Vec::new(),
            writes_left: 3,
        };
        let _ = stream_events(&mut sink, subscription, Duration::from_secs(1));
        publisher.join().unwrap();

        let text = String::from_utf8(sink.written).unwrap();
        let before = text.find("\"msg\":\"before\"").unwrap();
        let after = text.find("\"msg\":\"after\"").unwrap();
        assert!(before < after);
        assert!(!text.contains("keepalive"));
    }
}
