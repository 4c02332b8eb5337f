use can_socket::CanFrame;

use crate::dictionary::OdStore;
use crate::sdo::SdoDispatcher;

use super::{PdoMapping, RpdoTransmissionType, TpdoTransmissionType};

/// Errors from gathering/scattering a PDO payload (spec section 4.2).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PdoError {
    #[error("PDO slot {0} is out of range (valid range is 1..=16)")]
    InvalidSlot(u8),
    #[error("PDO communication parameter at {0:#06X} is not configured")]
    NotConfigured(u16),
    #[error("PDO is disabled (COB-ID valid bit is set)")]
    Disabled,
    #[error("mapped object {index:#06X}:{sub_index:02X} does not exist")]
    ObjectMissing { index: u16, sub_index: u8 },
    #[error("mapped objects exceed the 8 byte PDO payload limit ({0} bits)")]
    LengthExceeded(u32),
    #[error("failed to build a CAN frame: {0}")]
    Frame(String),
    #[error("no CANopen network is attached")]
    NetworkDown,
}

/// The resolved configuration of one TPDO slot (0x1800+n / 0x1A00+n).
#[derive(Debug, Clone)]
pub struct TpdoParams {
    pub cob_id: u16,
    pub enabled: bool,
    pub transmission: TpdoTransmissionType,
    pub inhibit_time_100us: u16,
    pub event_timer_ms: u16,
    pub mappings: Vec<PdoMapping>,
}

/// The resolved configuration of one RPDO slot (0x1400+n / 0x1600+n).
#[derive(Debug, Clone)]
pub struct RpdoParams {
    pub cob_id: u16,
    pub enabled: bool,
    pub transmission: RpdoTransmissionType,
    pub mappings: Vec<PdoMapping>,
}

/// Stateless gather/scatter helpers for the PDO engine. Transport (sending the
/// resulting frame, scheduling timers) lives in [`crate::node`].
pub struct PdoEngine;

impl PdoEngine {
    /// Read the communication and mapping parameters for TPDO slot `n` (1-based, 1..=16).
    pub fn read_tpdo_params(od: &mut OdStore, n: u8) -> Result<TpdoParams, PdoError> {
        if !(1..=16).contains(&n) {
            return Err(PdoError::InvalidSlot(n));
        }
        let comm_index = 0x1800 + (n as u16 - 1);
        let map_index = 0x1A00 + (n as u16 - 1);

        let cob_id_raw = read_u32(od, comm_index, 1).ok_or(PdoError::NotConfigured(comm_index))?;
        let transmission_raw = read_u32(od, comm_index, 2).unwrap_or(0xFF) as u8;
        let inhibit_time_100us = read_u32(od, comm_index, 3).unwrap_or(0) as u16;
        let event_timer_ms = read_u32(od, comm_index, 5).unwrap_or(0) as u16;

        Ok(TpdoParams {
            cob_id: (cob_id_raw & 0x7FF) as u16,
            enabled: cob_id_raw & 0x8000_0000 == 0,
            transmission: TpdoTransmissionType::from_u8(transmission_raw),
            inhibit_time_100us,
            event_timer_ms,
            mappings: read_mappings(od, map_index),
        })
    }

    /// Read the communication and mapping parameters for RPDO slot `n` (1-based, 1..=16).
    pub fn read_rpdo_params(od: &mut OdStore, n: u8) -> Result<RpdoParams, PdoError> {
        if !(1..=16).contains(&n) {
            return Err(PdoError::InvalidSlot(n));
        }
        let comm_index = 0x1400 + (n as u16 - 1);
        let map_index = 0x1600 + (n as u16 - 1);

        let cob_id_raw = read_u32(od, comm_index, 1).ok_or(PdoError::NotConfigured(comm_index))?;
        let transmission_raw = read_u32(od, comm_index, 2).unwrap_or(0) as u8;

        Ok(RpdoParams {
            cob_id: (cob_id_raw & 0x7FF) as u16,
            enabled: cob_id_raw & 0x8000_0000 == 0,
            transmission: RpdoTransmissionType::from_u8(transmission_raw),
            mappings: read_mappings(od, map_index),
        })
    }

    /// Gather the mapped objects for TPDO slot `n` into a CAN frame ready to send.
    ///
    /// Mapped reads go through `sdo` so a registered SDO read callback sees the
    /// same request an SDO upload would (spec section 4.2).
    pub fn build_tpdo_frame(od: &mut OdStore, sdo: &mut SdoDispatcher, n: u8) -> Result<CanFrame, PdoError> {
        let params = Self::read_tpdo_params(od, n)?;
        if !params.enabled {
            return Err(PdoError::Disabled);
        }
        let payload = gather_payload(od, sdo, &params.mappings)?;
        CanFrame::new(params.cob_id, &payload, None).map_err(|e| PdoError::Frame(e.to_string()))
    }

    /// Scatter an RPDO frame's payload into the Object Dictionary per slot `n`'s mapping.
    ///
    /// Mapped writes go through `sdo` so a registered SDO write callback fires the
    /// same way an SDO download would (spec section 4.2).
    pub fn apply_rpdo_frame(od: &mut OdStore, sdo: &mut SdoDispatcher, n: u8, frame: &CanFrame) -> Result<(), PdoError> {
        let params = Self::read_rpdo_params(od, n)?;
        if !params.enabled {
            return Err(PdoError::Disabled);
        }
        scatter_payload(od, sdo, &params.mappings, frame.data())
    }
}

fn read_mappings(od: &mut OdStore, map_index: u16) -> Vec<PdoMapping> {
    let count = od.raw_bytes(map_index, Some(0)).ok().and_then(|b| b.first().copied()).unwrap_or(0);
    (1..=count)
        .filter_map(|sub| {
            let raw = od.raw_bytes(map_index, Some(sub)).ok()?;
            Some(PdoMapping::from_u32(bytes_to_u32_le(&raw)))
        })
        .collect()
}

fn read_u32(od: &mut OdStore, index: u16, sub_index: u8) -> Option<u32> {
    od.raw_bytes(index, Some(sub_index)).ok().map(|raw| bytes_to_u32_le(&raw))
}

fn bytes_to_u32_le(raw: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let len = raw.len().min(4);
    buf[..len].copy_from_slice(&raw[..len]);
    u32::from_le_bytes(buf)
}

/// Pack the mapped objects' raw bytes into a CAN payload, LSB-first starting at bit 0
/// of byte 0, each mapping occupying the next `bit_length` bits (CiA 301 section 7.3).
///
/// Each mapped object is read via `sdo`, so a registered SDO read callback sees
/// this as an ordinary read of that name pair.
fn gather_payload(od: &mut OdStore, sdo: &mut SdoDispatcher, mappings: &[PdoMapping]) -> Result<Vec<u8>, PdoError> {
    let mut buf = [0u8; 8];
    let mut bit_offset = 0u32;
    for mapping in mappings {
        let raw = sdo
            .read_raw(od, mapping.object.index, mapping.object.subindex)
            .map_err(|_| PdoError::ObjectMissing { index: mapping.object.index, sub_index: mapping.object.subindex })?;
        let value = bytes_to_u64_le(&raw);
        write_bits(&mut buf, bit_offset, mapping.bit_length, value);
        bit_offset += mapping.bit_length as u32;
    }
    if bit_offset > 64 {
        return Err(PdoError::LengthExceeded(bit_offset));
    }
    let len = bit_offset.div_ceil(8) as usize;
    Ok(buf[..len].to_vec())
}

/// Inverse of [`gather_payload`]: unpack each mapping's bits and write them back
/// into the Object Dictionary at their raw (unscaled) width.
///
/// Each mapped object is written via `sdo`, so a registered SDO write callback
/// fires exactly as it would for an SDO download to that name pair.
fn scatter_payload(od: &mut OdStore, sdo: &mut SdoDispatcher, mappings: &[PdoMapping], payload: &[u8]) -> Result<(), PdoError> {
    let mut bit_offset = 0u32;
    for mapping in mappings {
        let value = read_bits(payload, bit_offset, mapping.bit_length);
        bit_offset += mapping.bit_length as u32;
        let byte_len = od
            .raw_bytes(mapping.object.index, Some(mapping.object.subindex))
            .map(|raw| raw.len().max(1))
            .unwrap_or((mapping.bit_length as usize).div_ceil(8));
        let bytes = value.to_le_bytes();
        sdo.commit_write_raw(od, mapping.object.index, mapping.object.subindex, &bytes[..byte_len.min(8)])
            .map_err(|_| PdoError::ObjectMissing { index: mapping.object.index, sub_index: mapping.object.subindex })?;
    }
    Ok(())
}

fn bytes_to_u64_le(raw: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = raw.len().min(8);
    buf[..len].copy_from_slice(&raw[..len]);
    u64::from_le_bytes(buf)
}

fn write_bits(buf: &mut [u8; 8], bit_offset: u32, bits: u8, value: u64) {
    for i in 0..bits as u32 {
        if (value >> i) & 1 == 1 {
            let pos = bit_offset + i;
            let (byte_i, bit_i) = ((pos / 8) as usize, pos % 8);
            if byte_i < buf.len() {
                buf[byte_i] |= 1 << bit_i;
            }
        }
    }
}

fn read_bits(buf: &[u8], bit_offset: u32, bits: u8) -> u64 {
    let mut value = 0u64;
    for i in 0..bits as u32 {
        let pos = bit_offset + i;
        let (byte_i, bit_i) = ((pos / 8) as usize, pos % 8);
        let bit = buf.get(byte_i).map(|b| (b >> bit_i) & 1).unwrap_or(0);
        value |= (bit as u64) << i;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_counter_eds(node_id: u8) -> String {
        format!(
            "[2000]\nParameterName=A\nObjectType=0x7\nDataType=0x5\nAcessType=rw\nDefaultValue=0xAB\nPDOMapping=1\n\n\
             [2001]\nParameterName=B\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nDefaultValue=0x1234\nPDOMapping=1\n\n\
             [1800]\nParameterName=TPDO1 comm\nObjectType=0x9\n\n\
             [1800sub1]\nParameterName=COB-ID\nObjectType=0x7\nDataType=0x7\nAcessType=rw\nDefaultValue=$NODEID+0x180\n\n\
             [1800sub2]\nParameterName=Transmission type\nObjectType=0x7\nDataType=0x5\nAcessType=rw\nDefaultValue=255\n\n\
             [1A00]\nParameterName=TPDO1 mapping\nObjectType=0x9\n\n\
             [1A00sub0]\nParameterName=count\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=2\n\n\
             [1A00sub1]\nParameterName=map1\nObjectType=0x7\nDataType=0x7\nAcessType=ro\nDefaultValue={m1}\n\n\
             [1A00sub2]\nParameterName=map2\nObjectType=0x7\nDataType=0x7\nAcessType=ro\nDefaultValue={m2}\n\n\
             [1400]\nParameterName=RPDO1 comm\nObjectType=0x9\n\n\
             [1400sub1]\nParameterName=COB-ID\nObjectType=0x7\nDataType=0x7\nAcessType=rw\nDefaultValue=$NODEID+0x200\n\n\
             [1400sub2]\nParameterName=Transmission type\nObjectType=0x7\nDataType=0x5\nAcessType=rw\nDefaultValue=255\n\n\
             [1600]\nParameterName=RPDO1 mapping\nObjectType=0x9\n\n\
             [1600sub0]\nParameterName=count\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=2\n\n\
             [1600sub1]\nParameterName=map1\nObjectType=0x7\nDataType=0x7\nAcessType=ro\nDefaultValue={m1}\n\n\
             [1600sub2]\nParameterName=map2\nObjectType=0x7\nDataType=0x7\nAcessType=ro\nDefaultValue={m2}\n",
            m1 = PdoMapping { object: crate::ObjectIndex::new(0x2000, 0), bit_length: 8 }.to_u32(),
            m2 = PdoMapping { object: crate::ObjectIndex::new(0x2001, 0), bit_length: 16 }.to_u32(),
        )
        .replace("$NODEID", &node_id.to_string())
    }

    #[test]
    fn tpdo_gather_then_rpdo_scatter_round_trips() {
        let mut od = OdStore::load(0x10, &two_counter_eds(0x10)).unwrap();
        let mut sdo = SdoDispatcher::new();
        let frame = PdoEngine::build_tpdo_frame(&mut od, &mut sdo, 1).unwrap();
        assert_eq!(frame.data(), &[0xAB, 0x34, 0x12]);

        PdoEngine::apply_rpdo_frame(&mut od, &mut sdo, 1, &frame).unwrap();
        assert_eq!(od.raw_bytes(0x2000, None).unwrap(), vec![0xAB]);
        assert_eq!(od.raw_bytes(0x2001, None).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn rpdo_scatter_invokes_write_callback() {
        let mut od = OdStore::load(0x10, &two_counter_eds(0x10)).unwrap();
        let mut sdo = SdoDispatcher::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        sdo.register_write(
            &od,
            "A",
            None,
            Box::new(move |scalar| {
                *seen_clone.lock().unwrap() = Some(scalar.clone());
            }),
        );

        let frame = CanFrame::new(0x210u16, &[0xAA, 0x34, 0x12], None).unwrap();
        PdoEngine::apply_rpdo_frame(&mut od, &mut sdo, 1, &frame).unwrap();

        assert!(seen.lock().unwrap().is_some());
        assert_eq!(od.raw_bytes(0x2000, None).unwrap(), vec![0xAA]);
    }

    #[test]
    fn tpdo_gather_uses_read_callback_override() {
        let mut od = OdStore::load(0x10, &two_counter_eds(0x10)).unwrap();
        let mut sdo = SdoDispatcher::new();
        sdo.register_read(&od, "A", None, Box::new(|| Some(crate::dictionary::Scalar::UInt(0x42))));

        let frame = PdoEngine::build_tpdo_frame(&mut od, &mut sdo, 1).unwrap();
        assert_eq!(frame.data(), &[0x42, 0x34, 0x12]);
    }

    #[test]
    fn invalid_slot_numbers_are_rejected() {
        let mut od = OdStore::load(0x10, &two_counter_eds(0x10)).unwrap();
        assert_eq!(PdoEngine::read_tpdo_params(&mut od, 0), Err(PdoError::InvalidSlot(0)));
        assert_eq!(PdoEngine::read_tpdo_params(&mut od, 17), Err(PdoError::InvalidSlot(17)));
    }
}
