use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{EventSource, MessageEvent};

use tilewall_shared::BlockEvent;

const RECONNECT_BASE_MS: u32 = 500;
const RECONNECT_MAX_MS: u32 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Live,
    Reconnecting,
}

/// Handler invoked for every well-formed feed message.
pub type EventSink = Rc<dyn Fn(BlockEvent)>;

struct FeedConnection {
    es: EventSource,
    on_open: Closure<dyn Fn()>,
    on_error: Closure<dyn Fn()>,
    on_message: Closure<dyn Fn(MessageEvent)>,
}

impl FeedConnection {
    fn close(self) {
        let _ = self.on_open.as_ref();
        let _ = self.on_error.as_ref();
        let _ = self.on_message.as_ref();
        self.es.set_onopen(None);
        self.es.set_onerror(None);
        self.es.set_onmessage(None);
        self.es.close();
    }
}

thread_local! {
    static FEED_CONNECTION: RefCell<Option<FeedConnection>> = const { RefCell::new(None) };
    static RECONNECT_TIMER: RefCell<Option<Timeout>> = const { RefCell::new(None) };
    static CONSECUTIVE_FAILURES: Cell<u32> = const { Cell::new(0) };
}

/// Delay before reconnect attempt number `failures` (1-based).
pub fn reconnect_backoff_ms(failures: u32) -> u32 {
    let exponent = failures.saturating_sub(1).min(8);
    RECONNECT_BASE_MS
        .saturating_mul(1 << exponent)
        .min(RECONNECT_MAX_MS)
}

/// Decode one feed message.
pub fn parse_event(data: &str) -> Result<BlockEvent, serde_json::Error> {
    serde_json::from_str(data)
}

pub fn disconnect() {
    RECONNECT_TIMER.with(|slot| {
        if let Some(timer) = slot.borrow_mut().take() {
            timer.cancel();
        }
    });
    FEED_CONNECTION.with(|slot| {
        if let Some(connection) = slot.borrow_mut().take() {
            connection.close();
        }
    });
    CONSECUTIVE_FAILURES.with(|c| c.set(0));
}

fn schedule_reconnect(url: String, status: RwSignal<ConnectionStatus>, sink: EventSink) {
    let failures = CONSECUTIVE_FAILURES.with(|c| {
        let next = c.get().saturating_add(1);
        c.set(next);
        next
    });
    let delay = reconnect_backoff_ms(failures);
    tracing::warn!(url = %url, attempt = failures, delay_ms = delay, "feed disconnected");

    let timer = Timeout::new(delay, move || {
        RECONNECT_TIMER.with(|slot| slot.borrow_mut().take());
        open(url, status, sink);
    });
    RECONNECT_TIMER.with(|slot| {
        if let Some(old) = slot.borrow_mut().replace(timer) {
            old.cancel();
        }
    });
}

/// Subscribe to the block feed. Every message is decoded and handed to
/// `sink`; the server sends a snapshot first on every (re)connect.
pub fn connect(url: &str, status: RwSignal<ConnectionStatus>, sink: EventSink) {
    CONSECUTIVE_FAILURES.with(|c| c.set(0));
    open(url.to_string(), status, sink);
}

fn open(url: String, status: RwSignal<ConnectionStatus>, sink: EventSink) {
    status.set(ConnectionStatus::Connecting);

    let es = match EventSource::new(&url) {
        Ok(es) => es,
        Err(_) => {
            status.set(ConnectionStatus::Reconnecting);
            schedule_reconnect(url, status, sink);
            return;
        }
    };

    let url_open = url.clone();
    let on_open = Closure::<dyn Fn()>::new(move || {
        CONSECUTIVE_FAILURES.with(|c| c.set(0));
        status.set(ConnectionStatus::Live);
        tracing::info!(url = %url_open, "feed connected");
    });
    es.set_onopen(Some(on_open.as_ref().unchecked_ref()));

    let sink_msg = sink.clone();
    let on_message = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
        let Some(data) = e.data().as_string() else {
            return;
        };
        match parse_event(&data) {
            Ok(event) => sink_msg(event),
            Err(err) => tracing::warn!(error = %err, "malformed feed event"),
        }
    });
    es.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

    // The browser retries on its own while the source is CONNECTING; only a
    // CLOSED source needs a fresh one.
    let es_err = es.clone();
    let on_error = Closure::<dyn Fn()>::new(move || {
        status.set(ConnectionStatus::Reconnecting);
        if es_err.ready_state() == EventSource::CLOSED {
            let url = url.clone();
            let sink = sink.clone();
            // Dropping the old connection inside its own handler is deferred
            // to the reconnect timer.
            schedule_reconnect(url, status, sink);
        }
    });
    es.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    FEED_CONNECTION.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(old) = slot.take() {
            old.close();
        }
        *slot = Some(FeedConnection {
            es,
            on_open,
            on_error,
            on_message,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(reconnect_backoff_ms(1), 500);
        assert_eq!(reconnect_backoff_ms(2), 1000);
        assert_eq!(reconnect_backoff_ms(4), 4000);
        assert_eq!(reconnect_backoff_ms(6), RECONNECT_MAX_MS);
        assert_eq!(reconnect_backoff_ms(u32::MAX), RECONNECT_MAX_MS);
    }

    #[test]
    fn feed_messages_decode_or_report() {
        let event = parse_event(r#"{"type": "Delete", "seq": 4, "block": {"id": 7, "x": 7, "y": 0, "status": "empty"}}"#).unwrap();
        assert_eq!(event.seq(), 4);
        assert!(matches!(event, BlockEvent::Delete { .. }));
        assert!(parse_event(r#"{"type": "Teleport"}"#).is_err());
    }
}
