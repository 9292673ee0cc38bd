use crate::dispatch::CommandId;
use crate::packet;
use crate::status::PlugStatus;

/// Minimum spacing between autonomous start/stop commands, in seconds.
const AUTONOMOUS_INTERVAL_SECS: u64 = 30;

/// Per-connection mutable state owned by the orchestrator.
///
/// The outbound buffer is a single slot, not a queue: staging a new frame
/// before the previous one was written replaces it. That last-writer-wins
/// behavior is intentional and load-bearing; see the tests.
#[derive(Debug, Default)]
pub struct SessionState {
    pending_outbound: Option<Vec<u8>>,
    last_autonomous_at: Option<u64>,
}

impl SessionState {
    /// Stage a frame for transmission, replacing any unsent one.
    pub fn stage_outbound(&mut self, frame: Vec<u8>) {
        if self.pending_outbound.is_some() {
            log::debug!("replacing unsent outbound frame");
        }
        self.pending_outbound = Some(frame);
    }

    /// Take the staged frame, leaving the slot empty.
    pub fn take_outbound(&mut self) -> Option<Vec<u8>> {
        self.pending_outbound.take()
    }

    /// Run one autonomous policy check.
    ///
    /// If the plug is waiting and the schedule allows charging, stage a
    /// start-charge command; if it is charging and the schedule forbids it,
    /// stage a stop-charge command. At most one such command is issued per
    /// 30-second window, measured against `mono_secs`, a monotonic seconds
    /// counter. `now_unix` is embedded in the start-charge payload.
    pub fn policy_tick(
        &mut self,
        plug: PlugStatus,
        allowed: bool,
        mono_secs: u64,
        now_unix: u32,
    ) {
        if let Some(last) = self.last_autonomous_at {
            if mono_secs.saturating_sub(last) <= AUTONOMOUS_INTERVAL_SECS {
                return;
            }
        }

        let frame = match plug {
            PlugStatus::Waiting if allowed => {
                log::info!("schedule allows charging, sending start command");
                let mut data = [0u8; 12];
                data[8..12].copy_from_slice(&now_unix.to_le_bytes());
                Some(packet::encode(CommandId::StartCharge.id(), &data))
            }
            PlugStatus::Charging if !allowed => {
                log::info!("schedule forbids charging, sending stop command");
                Some(packet::encode(CommandId::StopCharge.id(), &[0u8; 4]))
            }
            _ => None,
        };

        if let Some(frame) = frame {
            self.stage_outbound(frame);
            self.last_autonomous_at = Some(mono_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::decode;

    const NOW: u32 = 1_700_000_000;

    #[test]
    fn start_charge_when_waiting_and_allowed() {
        let mut session = SessionState::default();
        session.policy_tick(PlugStatus::Waiting, true, 0, NOW);

        let frame = session.take_outbound().unwrap();
        let msg = decode(&frame).unwrap();
        assert_eq!(msg.command_id, 0x0100);
        assert_eq!(msg.payload.len(), 12);
        assert_eq!(&msg.payload[8..12], &NOW.to_le_bytes());
    }

    #[test]
    fn stop_charge_when_charging_and_denied() {
        let mut session = SessionState::default();
        session.policy_tick(PlugStatus::Charging, false, 0, NOW);

        let frame = session.take_outbound().unwrap();
        let msg = decode(&frame).unwrap();
        assert_eq!(msg.command_id, 0x0102);
        assert_eq!(msg.payload, [0u8; 4]);
    }

    #[test]
    fn no_command_when_state_matches_policy() {
        let mut session = SessionState::default();
        session.policy_tick(PlugStatus::Charging, true, 0, NOW);
        session.policy_tick(PlugStatus::Waiting, false, 1, NOW);
        session.policy_tick(PlugStatus::Unplugged, true, 2, NOW);
        assert_eq!(session.take_outbound(), None);
    }

    #[test]
    fn rate_limit_spans_a_thirty_second_window() {
        let mut session = SessionState::default();
        session.policy_tick(PlugStatus::Waiting, true, 100, NOW);
        assert!(session.take_outbound().is_some());

        // one second later: inside the window, nothing staged
        session.policy_tick(PlugStatus::Waiting, true, 101, NOW);
        assert_eq!(session.take_outbound(), None);

        // 31 seconds after the last command: window elapsed
        session.policy_tick(PlugStatus::Waiting, true, 131, NOW);
        assert!(session.take_outbound().is_some());
    }

    #[test]
    fn repeated_ticks_emit_at_most_once_per_window() {
        let mut session = SessionState::default();
        let mut emitted = 0;
        for tick in 0..=30 {
            session.policy_tick(PlugStatus::Waiting, true, tick, NOW);
            if session.take_outbound().is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1);
    }

    #[test]
    fn outbound_slot_is_last_writer_wins() {
        let mut session = SessionState::default();
        session.stage_outbound(packet::encode(0x0004, &NOW.to_le_bytes()));
        session.stage_outbound(packet::encode(0x00A6, &[]));

        // the earlier frame is silently superseded
        let msg = decode(&session.take_outbound().unwrap()).unwrap();
        assert_eq!(msg.command_id, 0x00A6);
        assert_eq!(session.take_outbound(), None);
    }
}
