//! Emergency message (EMCY) production (spec section 4.4).

use can_socket::CanFrame;
use can_socket::tokio::CanSocket;

use crate::dictionary::OdStore;

/// Errors from [`EmcyProducer::send_emcy`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EmcyError {
    #[error("no CANopen network is attached")]
    NetworkDown,
    #[error("manufacturer data exceeds 5 bytes ({0} given)")]
    ManufacturerDataTooLong(usize),
}

/// A 16-bit CANopen EMCY error code (CiA 301 table 12). Kept as a newtype rather
/// than a closed enum so any wire value round-trips; the handful of codes this
/// node actually emits are named constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmcyCode(pub u16);

impl EmcyCode {
    /// "Protocol error: PDO not processed due to length error."
    pub const PROTOCOL_PDO_LEN_EXCEEDED: EmcyCode = EmcyCode(0x8210);
    /// "Communication error: recovered from bus off."
    pub const COMM_RECOVERED_BUS: EmcyCode = EmcyCode(0x8140);
    /// "Error reset or no error" — sent to clear a previously raised condition.
    pub const NO_ERROR: EmcyCode = EmcyCode(0x0000);
}

impl std::fmt::Display for EmcyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Emits EMCY frames on COB-ID `0x80 + node_id`, tagging each with the node's
/// current error register (`OD[0x1001]`).
#[derive(Debug, Clone, Copy)]
pub struct EmcyProducer {
    node_id: u8,
}

impl EmcyProducer {
    pub fn new(node_id: u8) -> Self {
        Self { node_id }
    }

    pub fn cob_id(&self) -> u16 {
        0x80 + self.node_id as u16
    }

    /// `send_emcy(code, manufacturer_data, raise_on_network_down)`: behavior on
    /// a missing network is controlled by `raise_on_network_down`; transport
    /// errors are logged and swallowed, never surfaced to the caller.
    pub async fn send_emcy(
        &self,
        socket: &CanSocket,
        od: &mut OdStore,
        code: EmcyCode,
        manufacturer_data: &[u8],
        network_up: bool,
        raise_on_network_down: bool,
    ) -> Result<(), EmcyError> {
        if !network_up {
            return if raise_on_network_down { Err(EmcyError::NetworkDown) } else { Ok(()) };
        }
        if manufacturer_data.len() > 5 {
            return Err(EmcyError::ManufacturerDataTooLong(manufacturer_data.len()));
        }

        let error_register = od.raw_bytes(0x1001, None).ok().and_then(|b| b.first().copied()).unwrap_or(0);

        let mut payload = [0u8; 8];
        payload[0..2].copy_from_slice(&code.0.to_le_bytes());
        payload[2] = error_register;
        payload[3..3 + manufacturer_data.len()].copy_from_slice(manufacturer_data);

        let frame = match CanFrame::new(self.cob_id(), &payload, None) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("failed to build EMCY frame: {e}");
                return Ok(());
            }
        };
        if let Err(e) = socket.send(&frame).await {
            log::warn!("failed to send EMCY frame: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cob_id_is_0x80_plus_node_id() {
        assert_eq!(EmcyProducer::new(0x10).cob_id(), 0x90);
    }

    #[test]
    fn code_display_is_hex() {
        assert_eq!(EmcyCode::PROTOCOL_PDO_LEN_EXCEEDED.to_string(), "0x8210");
    }

    #[tokio::test]
    async fn network_down_without_raise_is_silently_ok() {
        let mut od = OdStore::load(0x10, "[1001]\nParameterName=Error register\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=0\n").unwrap();
        let socket = CanSocket::bind_all().unwrap();
        let producer = EmcyProducer::new(0x10);
        let result = producer.send_emcy(&socket, &mut od, EmcyCode::COMM_RECOVERED_BUS, &[], false, false).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn network_down_with_raise_fails() {
        let mut od = OdStore::load(0x10, "[1001]\nParameterName=Error register\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=0\n").unwrap();
        let socket = CanSocket::bind_all().unwrap();
        let producer = EmcyProducer::new(0x10);
        let result = producer.send_emcy(&socket, &mut od, EmcyCode::COMM_RECOVERED_BUS, &[], false, true).await;
        assert_eq!(result, Err(EmcyError::NetworkDown));
    }

    #[tokio::test]
    async fn manufacturer_data_over_5_bytes_is_rejected() {
        let mut od = OdStore::load(0x10, "[1001]\nParameterName=Error register\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=0\n").unwrap();
        let socket = CanSocket::bind_all().unwrap();
        let producer = EmcyProducer::new(0x10);
        let result = producer.send_emcy(&socket, &mut od, EmcyCode::PROTOCOL_PDO_LEN_EXCEEDED, &[1, 2, 3, 4, 5, 6], true, true).await;
        assert_eq!(result, Err(EmcyError::ManufacturerDataTooLong(6)));
    }
}
