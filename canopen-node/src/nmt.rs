//! Network management (NMT): local node state tracking and heartbeat
//! production (GLOSSARY "NMT"/"Heartbeat"; spec section 4.5's bus-up
//! transition sets this node's state to OPERATIONAL and starts the
//! heartbeat using `OD[0x1017].default` as interval).

use can_socket::CanFrame;

/// The node's NMT state, carried as the single data byte of every heartbeat
/// frame (CiA 301 section 7.2.8.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtState {
    BootUp,
    Stopped,
    PreOperational,
    Operational,
}

impl NmtState {
    pub fn heartbeat_byte(self) -> u8 {
        match self {
            Self::BootUp => 0x00,
            Self::Stopped => 0x04,
            Self::Operational => 0x05,
            Self::PreOperational => 0x7F,
        }
    }
}

/// A state-control command understood when addressed to this node over the
/// NMT module-control object (COB-ID 0x000).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtCommand {
    Start,
    Stop,
    EnterPreOperational,
    ResetNode,
    ResetCommunication,
}

impl NmtCommand {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Start),
            0x02 => Some(Self::Stop),
            0x80 => Some(Self::EnterPreOperational),
            0x81 => Some(Self::ResetNode),
            0x82 => Some(Self::ResetCommunication),
            _ => None,
        }
    }

    /// The state a plain state-change command drives the node to. Resets
    /// are not plain state changes — callers handle them as a reinitialization.
    pub fn target_state(self) -> Option<NmtState> {
        match self {
            Self::Start => Some(NmtState::Operational),
            Self::Stop => Some(NmtState::Stopped),
            Self::EnterPreOperational => Some(NmtState::PreOperational),
            Self::ResetNode | Self::ResetCommunication => None,
        }
    }
}

/// Standard COB-ID for the NMT module-control object.
pub const NMT_COB_ID: u16 = 0x000;

/// Decode an incoming NMT module-control frame. Returns `None` if the frame
/// isn't addressed to `node_id` (node ID 0 in the payload means "all nodes")
/// or carries an unrecognized command specifier.
pub fn decode_nmt_frame(frame: &CanFrame, node_id: u8) -> Option<NmtCommand> {
    let data = frame.data();
    if data.len() < 2 {
        return None;
    }
    let target = data[1];
    if target != 0 && target != node_id {
        return None;
    }
    NmtCommand::from_u8(data[0])
}

/// Build the periodic heartbeat frame this node broadcasts on `0x700 + node_id`.
pub fn heartbeat_frame(node_id: u8, state: NmtState) -> std::io::Result<CanFrame> {
    CanFrame::new(0x700u16 + node_id as u16, &[state.heartbeat_byte()], None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_byte_matches_cia_301() {
        assert_eq!(NmtState::BootUp.heartbeat_byte(), 0x00);
        assert_eq!(NmtState::Stopped.heartbeat_byte(), 0x04);
        assert_eq!(NmtState::Operational.heartbeat_byte(), 0x05);
        assert_eq!(NmtState::PreOperational.heartbeat_byte(), 0x7F);
    }

    #[test]
    fn heartbeat_frame_uses_0x700_plus_node_id() {
        let frame = heartbeat_frame(0x10, NmtState::Operational).unwrap();
        assert_eq!(frame.id().as_u32(), 0x710);
        assert_eq!(frame.data(), &[0x05]);
    }

    #[test]
    fn decode_accepts_broadcast_and_targeted_frames() {
        let start = CanFrame::new(NMT_COB_ID, &[0x01, 0x00], None).unwrap();
        assert_eq!(decode_nmt_frame(&start, 0x10), Some(NmtCommand::Start));

        let targeted = CanFrame::new(NMT_COB_ID, &[0x02, 0x10], None).unwrap();
        assert_eq!(decode_nmt_frame(&targeted, 0x10), Some(NmtCommand::Stop));

        let other_node = CanFrame::new(NMT_COB_ID, &[0x02, 0x11], None).unwrap();
        assert_eq!(decode_nmt_frame(&other_node, 0x10), None);
    }

    #[test]
    fn command_target_states() {
        assert_eq!(NmtCommand::Start.target_state(), Some(NmtState::Operational));
        assert_eq!(NmtCommand::Stop.target_state(), Some(NmtState::Stopped));
        assert_eq!(NmtCommand::EnterPreOperational.target_state(), Some(NmtState::PreOperational));
        assert_eq!(NmtCommand::ResetNode.target_state(), None);
    }
}
