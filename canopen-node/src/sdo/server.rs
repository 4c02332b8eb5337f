//! Server-side SDO frame handling: name-keyed callback registration plus the
//! expedited/segmented upload and download state machines (spec section 4.3).

use std::collections::HashMap;

use can_socket::CanFrame;

use crate::dictionary::{ObjectDirectory, ObjectType, OdError, OdStore, Scalar};

use super::{AbortReason, ClientCommand, SdoAddress, ServerCommand};

/// Called when a client uploads (reads) an object; a `Some` return overrides the
/// stored Object Dictionary value for this transfer.
pub type ReadCallback = Box<dyn FnMut() -> Option<Scalar> + Send>;

/// Called after a client's download (write) has already been committed to the
/// Object Dictionary, with the typed (factor-scaled) value that was stored.
pub type WriteCallback = Box<dyn FnMut(&Scalar) + Send>;

#[derive(Debug)]
enum Pending {
    Upload { index: u16, sub_index: u8, data: Vec<u8>, pos: usize, toggle: bool },
    Download { index: u16, sub_index: u8, buffer: Vec<u8>, toggle: bool },
}

/// Dispatches incoming SDO request frames against an [`OdStore`], with optional
/// per-object callbacks layered on top of plain index/subindex access.
pub struct SdoDispatcher {
    address: SdoAddress,
    read_callbacks: HashMap<(u16, u8), ReadCallback>,
    write_callbacks: HashMap<(u16, u8), WriteCallback>,
    pending: Option<Pending>,
}

impl std::fmt::Debug for SdoDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdoDispatcher")
            .field("address", &self.address)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl SdoDispatcher {
    pub fn new() -> Self {
        Self {
            address: SdoAddress::standard(),
            read_callbacks: HashMap::new(),
            write_callbacks: HashMap::new(),
            pending: None,
        }
    }

    /// Register a callback invoked whenever `name` (optionally a sub-entry named
    /// `sub_name` of an array or record) is read over SDO. Logs a warning and does
    /// nothing if the name can't be resolved in `od`'s dictionary.
    pub fn register_read(&mut self, od: &OdStore, name: &str, sub_name: Option<&str>, callback: ReadCallback) {
        match resolve_name(od.dict(), name, sub_name) {
            Some(key) => {
                self.read_callbacks.insert(key, callback);
            }
            None => log::warn!("SDO read callback for unresolved object {name:?}/{sub_name:?}"),
        }
    }

    /// Register a callback invoked after a successful SDO write to `name`.
    pub fn register_write(&mut self, od: &OdStore, name: &str, sub_name: Option<&str>, callback: WriteCallback) {
        match resolve_name(od.dict(), name, sub_name) {
            Some(key) => {
                self.write_callbacks.insert(key, callback);
            }
            None => log::warn!("SDO write callback for unresolved object {name:?}/{sub_name:?}"),
        }
    }

    /// Handle one incoming CAN frame addressed to this node's SDO server.
    ///
    /// Returns the response frame to send, or `None` if the frame wasn't an SDO
    /// command addressed to this node.
    pub fn handle_frame(&mut self, od: &mut OdStore, frame: &CanFrame) -> Option<CanFrame> {
        let node_id = od.node_id();
        if frame.is_rtr() || frame.id() != self.address.command_id(node_id).into() {
            return None;
        }
        let data = frame.data();
        if data.len() != 8 {
            return Some(self.abort_raw(0, 0, AbortReason::GeneralError, node_id));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(data);

        let command = match ClientCommand::try_from(buf[0] >> 5) {
            Ok(command) => command,
            Err(_) => return Some(self.abort_raw(0, 0, AbortReason::InvalidOrUnknownCommandSpecifier, node_id)),
        };

        let response = match command {
            ClientCommand::InitiateUpload => self.initiate_upload(od, buf),
            ClientCommand::SegmentUpload => self.segment_upload(od, buf),
            ClientCommand::InitiateDownload => self.initiate_download(od, buf),
            ClientCommand::SegmentDownload => self.segment_download(od, buf),
            ClientCommand::AbortTransfer => {
                self.pending = None;
                return None;
            }
        };
        Some(self.encode(response, node_id))
    }

    fn initiate_upload(&mut self, od: &mut OdStore, buf: [u8; 8]) -> Result<[u8; 8], (u16, u8, AbortReason)> {
        let index = u16::from_le_bytes([buf[1], buf[2]]);
        let sub_index = buf[3];

        let readable = od.get(index, Some(sub_index)).map_err(|e| od_err(index, sub_index, e))?.access_type.is_readable();
        if !readable {
            return Err((index, sub_index, AbortReason::ReadFromWriteOnlyObject));
        }

        let data = self.read_raw(od, index, sub_index).map_err(|e| od_err(index, sub_index, e))?;

        let mut response = [0u8; 8];
        response[1..3].copy_from_slice(&index.to_le_bytes());
        response[3] = sub_index;

        if data.len() <= 4 {
            let n = 4 - data.len();
            response[0] = ((ServerCommand::InitiateUpload as u8) << 5) | ((n as u8) << 2) | (1 << 1) | 1;
            response[4..4 + data.len()].copy_from_slice(&data);
        } else {
            response[0] = ((ServerCommand::InitiateUpload as u8) << 5) | 1;
            response[4..8].copy_from_slice(&(data.len() as u32).to_le_bytes());
            self.pending = Some(Pending::Upload { index, sub_index, data, pos: 0, toggle: false });
        }
        Ok(response)
    }

    fn segment_upload(&mut self, _od: &mut OdStore, buf: [u8; 8]) -> Result<[u8; 8], (u16, u8, AbortReason)> {
        let toggle = (buf[0] >> 4) & 1 == 1;
        let Some(Pending::Upload { index, sub_index, data, pos, toggle: expected }) = &mut self.pending else {
            return Err((0, 0, AbortReason::InvalidOrUnknownCommandSpecifier));
        };
        if toggle != *expected {
            let (index, sub_index) = (*index, *sub_index);
            self.pending = None;
            return Err((index, sub_index, AbortReason::ToggleBitNotAlternated));
        }

        let remaining = data.len() - *pos;
        let chunk_len = remaining.min(7);
        let last = remaining <= 7;
        let mut response = [0u8; 8];
        response[1..1 + chunk_len].copy_from_slice(&data[*pos..*pos + chunk_len]);
        let n = 7 - chunk_len;
        response[0] = ((ServerCommand::SegmentUpload as u8) << 5) | ((toggle as u8) << 4) | ((n as u8) << 1) | (last as u8);

        *pos += chunk_len;
        *expected = !*expected;
        if last {
            self.pending = None;
        }
        Ok(response)
    }

    fn initiate_download(&mut self, od: &mut OdStore, buf: [u8; 8]) -> Result<[u8; 8], (u16, u8, AbortReason)> {
        let index = u16::from_le_bytes([buf[1], buf[2]]);
        let sub_index = buf[3];

        let var = od.get(index, Some(sub_index)).map_err(|e| od_err(index, sub_index, e))?;
        if !var.access_type.is_writable() {
            return Err((index, sub_index, AbortReason::WriteToReadOnlyObject));
        }

        let expedited = buf[0] & 0b10 != 0;
        let size_indicated = buf[0] & 0b01 != 0;

        let mut response = [0u8; 8];
        response[0] = (ServerCommand::InitiateDownload as u8) << 5;
        response[1..3].copy_from_slice(&index.to_le_bytes());
        response[3] = sub_index;

        if expedited {
            let n = if size_indicated { ((buf[0] >> 2) & 0b11) as usize } else { 0 };
            let len = 4 - n;
            self.commit_write(od, index, sub_index, &buf[4..4 + len])?;
        } else {
            self.pending = Some(Pending::Download { index, sub_index, buffer: Vec::new(), toggle: false });
        }
        Ok(response)
    }

    fn segment_download(&mut self, od: &mut OdStore, buf: [u8; 8]) -> Result<[u8; 8], (u16, u8, AbortReason)> {
        let toggle = (buf[0] >> 4) & 1 == 1;
        let n = ((buf[0] >> 1) & 0b111) as usize;
        let last = buf[0] & 1 == 1;

        let Some(Pending::Download { index, sub_index, toggle: expected, buffer, .. }) = &mut self.pending else {
            return Err((0, 0, AbortReason::InvalidOrUnknownCommandSpecifier));
        };
        if toggle != *expected {
            let (index, sub_index) = (*index, *sub_index);
            self.pending = None;
            return Err((index, sub_index, AbortReason::ToggleBitNotAlternated));
        }

        let chunk_len = 7 - n;
        buffer.extend_from_slice(&buf[1..1 + chunk_len]);
        *expected = !*expected;

        let response_toggle = toggle;
        if last {
            let Some(Pending::Download { index, sub_index, buffer, .. }) = self.pending.take() else { unreachable!() };
            self.commit_write(od, index, sub_index, &buffer)?;
            let mut response = [0u8; 8];
            response[0] = ((ServerCommand::SegmentDownload as u8) << 5) | ((response_toggle as u8) << 4);
            Ok(response)
        } else {
            let mut response = [0u8; 8];
            response[0] = ((ServerCommand::SegmentDownload as u8) << 5) | ((response_toggle as u8) << 4);
            Ok(response)
        }
    }

    fn commit_write(&mut self, od: &mut OdStore, index: u16, sub_index: u8, raw: &[u8]) -> Result<(), (u16, u8, AbortReason)> {
        self.commit_write_raw(od, index, sub_index, raw).map_err(|e| od_err(index, sub_index, e))
    }

    /// Read `index`/`sub_index` the same way an SDO upload would: a registered
    /// read callback, if any, overrides the stored value for this read.
    ///
    /// Exposed to the PDO engine so TPDO production sees the same values an
    /// SDO upload would (spec section 4.2).
    pub(crate) fn read_raw(&mut self, od: &mut OdStore, index: u16, sub_index: u8) -> Result<Vec<u8>, OdError> {
        if let Some(callback) = self.read_callbacks.get_mut(&(index, sub_index)) {
            if let Some(scalar) = callback() {
                return od.encode_scalar(index, Some(sub_index), &scalar);
            }
        }
        od.raw_bytes(index, Some(sub_index))
    }

    /// Write `raw` into `index`/`sub_index` and invoke any registered write
    /// callback with the committed value, the same way an SDO download would.
    ///
    /// Exposed to the PDO engine so RPDO ingestion fires the same callbacks an
    /// SDO write does (spec section 4.2).
    pub(crate) fn commit_write_raw(&mut self, od: &mut OdStore, index: u16, sub_index: u8, raw: &[u8]) -> Result<(), OdError> {
        od.write_raw(index, Some(sub_index), raw)?;
        if let Some(callback) = self.write_callbacks.get_mut(&(index, sub_index)) {
            if let Ok(scalar) = od.read(index, Some(sub_index)) {
                callback(&scalar);
            }
        }
        Ok(())
    }

    fn encode(&self, result: Result<[u8; 8], (u16, u8, AbortReason)>, node_id: u8) -> CanFrame {
        match result {
            Ok(data) => CanFrame::new(self.address.response_id(node_id), &data, None).expect("8 byte SDO frame is always valid"),
            Err((index, sub_index, reason)) => self.abort_raw(index, sub_index, reason, node_id),
        }
    }

    fn abort_raw(&self, index: u16, sub_index: u8, reason: AbortReason, node_id: u8) -> CanFrame {
        let reason_bytes = u32::from(reason).to_le_bytes();
        let index_bytes = index.to_le_bytes();
        let data = [
            (ServerCommand::AbortTransfer as u8) << 5,
            index_bytes[0],
            index_bytes[1],
            sub_index,
            reason_bytes[0],
            reason_bytes[1],
            reason_bytes[2],
            reason_bytes[3],
        ];
        CanFrame::new(self.address.response_id(node_id), &data, None).expect("8 byte SDO frame is always valid")
    }
}

impl Default for SdoDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn od_err(index: u16, sub_index: u8, error: OdError) -> (u16, u8, AbortReason) {
    let reason = match error {
        OdError::NotFound { .. } => AbortReason::ObjectDoesNotExist,
        OdError::OutOfRange { .. } => AbortReason::ObjectValueInvalid,
        OdError::TypeMismatch { .. } => AbortReason::LengthMismatch,
        OdError::UnknownBitField { .. } | OdError::EnumOutOfRange { .. } | OdError::EnumUnknown { .. } => AbortReason::ObjectValueInvalid,
    };
    (index, sub_index, reason)
}

fn resolve_name(dict: &ObjectDirectory, name: &str, sub_name: Option<&str>) -> Option<(u16, u8)> {
    let object = dict.get_object_by_name(name)?;
    match (object, sub_name) {
        (ObjectType::Variable(var), _) => Some((var.index, var.sub_index)),
        (ObjectType::Array(array), Some(sub_name)) => array.get_by_name(sub_name).map(|v| (v.index, v.sub_index)),
        (ObjectType::Record(record), Some(sub_name)) => record.get_by_name(sub_name).map(|v| (v.index, v.sub_index)),
        (ObjectType::Array(_) | ObjectType::Record(_), None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn counter_eds() -> &'static str {
        "[2000]\nParameterName=Counter\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nLowLimit=0\nHighLimit=1000\nDefaultValue=5\n"
    }

    #[test]
    fn expedited_upload_round_trips_current_value() {
        let mut od = OdStore::load(0x10, counter_eds()).unwrap();
        let mut dispatcher = SdoDispatcher::new();
        let request = CanFrame::new(0x610u16, &[(ClientCommand::InitiateUpload as u8) << 5, 0x00, 0x20, 0, 0, 0, 0, 0], None).unwrap();
        let response = dispatcher.handle_frame(&mut od, &request).unwrap();
        assert_eq!(response.data()[4..6], [5, 0]);
    }

    #[test]
    fn expedited_download_writes_then_invokes_callback() {
        let mut od = OdStore::load(0x10, counter_eds()).unwrap();
        let mut dispatcher = SdoDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        dispatcher.register_write(&od, "Counter", None, Box::new(move |value| {
            *seen_clone.lock().unwrap() = Some(value.clone());
        }));

        let cmd = ((ClientCommand::InitiateDownload as u8) << 5) | (2 << 2) | (1 << 1) | 1;
        let request = CanFrame::new(0x610u16, &[cmd, 0x00, 0x20, 0, 42, 0, 0, 0], None).unwrap();
        let response = dispatcher.handle_frame(&mut od, &request).unwrap();
        assert_eq!(response.data()[0] >> 5, ServerCommand::InitiateDownload as u8);
        assert_eq!(od.read(0x2000, None).unwrap(), Scalar::UInt(42));
        assert_eq!(*seen.lock().unwrap(), Some(Scalar::UInt(42)));
    }

    #[test]
    fn download_out_of_range_aborts() {
        let mut od = OdStore::load(0x10, counter_eds()).unwrap();
        let mut dispatcher = SdoDispatcher::new();
        let cmd = ((ClientCommand::InitiateDownload as u8) << 5) | (2 << 2) | (1 << 1) | 1;
        let request = CanFrame::new(0x610u16, &[cmd, 0x00, 0x20, 0, 0xFF, 0x1F, 0, 0], None).unwrap();
        let response = dispatcher.handle_frame(&mut od, &request).unwrap();
        assert_eq!(ClientCommand::AbortTransfer as u8, response.data()[0] >> 5);
    }
}
