use parking_lot::Mutex;
use satchel_proto::ButtonState;

/// Process-wide latch for the last observed button state.
///
/// Single writer (the serial link's event dispatch), multiple readers (the
/// HTTP poll handler). Reading a `pressed` state consumes it: the latch drops
/// back to `released` so each physical press is observed at most once by a
/// poller. Presses that land between two polls can collapse into one; that is
/// the accepted cost of a latch instead of a queue.
#[derive(Debug)]
pub struct ButtonLatch {
    state: Mutex<ButtonState>,
}

impl ButtonLatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ButtonState::Released),
        }
    }

    pub fn set(&self, state: ButtonState) {
        *self.state.lock() = state;
    }

    /// Returns the current state; a `pressed` read atomically resets the
    /// latch to `released` before returning.
    pub fn read_and_consume(&self) -> ButtonState {
        let mut guard = self.state.lock();
        let current = *guard;
        if current == ButtonState::Pressed {
            *guard = ButtonState::Released;
        }
        current
    }
}

impl Default for ButtonLatch {
    fn default() -> Self {
        Self::new()
    }
}
