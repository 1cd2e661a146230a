//! Key/edge bridge: turns a generator's tone boundaries into
//! the keying edges a receiver consumes, for self-test and for driving a
//! receiver directly off the generator's tone queue instead of off real
//! keying hardware.

use std::sync::{Arc, Mutex};

use crate::receiver::Receiver;

/// Invoked by the generator's consumer thread at the start and end of every
/// rendered tone: `(timestamp_us, key_down)`.
pub type KeyCallback = Box<dyn FnMut(i64, bool) + Send>;

/// Wires a generator's key edges into a receiver, so a generated string can
/// be fed straight back through decode without an audio round-trip.
pub struct SelfTestBridge {
    receiver: Arc<Mutex<Receiver>>,
}

impl SelfTestBridge {
    pub fn new(receiver: Arc<Mutex<Receiver>>) -> Self {
        SelfTestBridge { receiver }
    }

    /// Builds the `KeyCallback` a `Generator` can register via
    /// `register_key_callback`.
    pub fn callback(&self) -> KeyCallback {
        let receiver = Arc::clone(&self.receiver);
        Box::new(move |timestamp_us, key_down| {
            let mut r = receiver.lock().unwrap();
            let result = if key_down {
                r.notify_mark_begin(Some(timestamp_us))
            } else {
                r.notify_mark_end(Some(timestamp_us)).map(|_| ())
            };
            if let Err(e) = result {
                // A self-test bridge observes generator-side edges that are
                // always monotonic by construction; an error here means the
                // receiver and generator timing params disagree badly
                // enough to be worth surfacing during development.
                debug_assert!(false, "self-test bridge edge rejected: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::Receiver;
    use crate::timing::ReceiveTimingParams;

    #[test]
    fn bridge_feeds_edges_into_receiver() {
        let timing = ReceiveTimingParams::new(20, 50, 0).unwrap();
        let receiver = Arc::new(Mutex::new(Receiver::new(timing)));
        let bridge = SelfTestBridge::new(Arc::clone(&receiver));
        let mut cb = bridge.callback();

        let unit = crate::timing::DOT_CALIBRATION / 20;
        cb(0, true);
        cb(unit / 2, false);

        let r = receiver.lock().unwrap();
        assert_eq!(r.state(), crate::receiver::ReceiverState::Space);
    }
}
