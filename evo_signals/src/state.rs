//! Real-time state bookkeeping shared by the namespace and the brokers.

use serde::Serialize;

use crate::consts::BUFFER_COUNT;

/// Current/next state pair and the active buffer slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RealTimeStateInfo {
    /// Running state, empty before the first transition.
    pub current_state: String,
    /// State being prepared.
    pub next_state: String,
    /// Slot read and written by the running state.
    pub active_buffer: usize,
}

impl RealTimeStateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the next state will use.
    #[inline]
    pub fn next_buffer(&self) -> usize {
        (self.active_buffer + 1) % BUFFER_COUNT
    }

    /// Make the prepared state current and swap the active slot.
    pub fn commit(&mut self) {
        self.current_state = std::mem::take(&mut self.next_state);
        self.active_buffer = self.next_buffer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_swaps_buffers() {
        let mut info = RealTimeStateInfo::new();
        info.next_state = "s1".into();
        assert_eq!(info.next_buffer(), 1);
        info.commit();
        assert_eq!(info.current_state, "s1");
        assert!(info.next_state.is_empty());
        assert_eq!(info.active_buffer, 1);
        assert_eq!(info.next_buffer(), 0);
    }
}
