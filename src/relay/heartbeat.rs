//! Dead-peer detection for listener connections.
//!
//! Each connection owns a [`Heartbeat`]. On every interval tick the owner
//! asks it what to do: if the previous ping was answered the peer is
//! pinged again, otherwise the connection is terminated. A peer that stops
//! answering is therefore dropped on the first tick after one full interval
//! of silence.

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping and wait for the next tick
    Ping,
    /// The last ping went unanswered; drop the connection
    Terminate,
}

#[derive(Debug, Clone)]
pub struct Heartbeat {
    alive: bool,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    /// A fresh connection counts as alive.
    pub fn new() -> Self {
        Self { alive: true }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn on_pong(&mut self) {
        self.alive = true;
    }

    /// Clear the flag and ping, or terminate if it was already clear.
    pub fn tick(&mut self) -> HeartbeatAction {
        if !self.alive {
            return HeartbeatAction::Terminate;
        }
        self.alive = false;
        HeartbeatAction::Ping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responsive_peer_is_never_terminated() {
        let mut heartbeat = Heartbeat::new();
        for _ in 0..10 {
            assert_eq!(heartbeat.tick(), HeartbeatAction::Ping);
            heartbeat.on_pong();
        }
        assert!(heartbeat.is_alive());
    }

    #[test]
    fn silent_peer_is_terminated_after_exactly_one_missed_interval() {
        let mut heartbeat = Heartbeat::new();
        assert_eq!(heartbeat.tick(), HeartbeatAction::Ping);
        assert!(!heartbeat.is_alive());
        assert_eq!(heartbeat.tick(), HeartbeatAction::Terminate);
    }

    #[test]
    fn late_pong_still_counts_before_the_next_tick() {
        let mut heartbeat = Heartbeat::new();
        heartbeat.tick();
        heartbeat.on_pong();
        heartbeat.on_pong();
        assert_eq!(heartbeat.tick(), HeartbeatAction::Ping);
        assert_eq!(heartbeat.tick(), HeartbeatAction::Terminate);
    }
}
