//! Typed Object Dictionary access: [`OdStore`] wraps the EDS-loaded [`ObjectDirectory`]
//! with range-checked read/write, bitfield, and enum helpers (spec section 4.1).

use super::{DataType, LoadError, ObjectDirectory, OdError, Value, Variable};

/// A typed value going into or coming out of the Object Dictionary.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// RPDO/TPDO communication parameter defaults that trigger COB-ID sanitization
/// (spec section 4.1, last paragraph). `base` is the reserved default for slot 0;
/// each subsequent group of four slots adds `0x100`.
const RPDO_BASES: [u16; 4] = [0x200, 0x300, 0x400, 0x500];
const TPDO_BASES: [u16; 4] = [0x180, 0x280, 0x380, 0x480];

/// The holder of the parsed Object Dictionary, with typed access on top of the
/// raw EDS-derived [`ObjectDirectory`].
#[derive(Debug)]
pub struct OdStore {
    dict: ObjectDirectory,
}

impl OdStore {
    /// Load an Object Dictionary from EDS/DCF content, then run COB-ID sanitization.
    pub fn load(node_id: u8, content: &str) -> Result<Self, LoadError> {
        let dict = ObjectDirectory::load_from_content(node_id, content)?;
        let mut store = Self { dict };
        store.sanitize_pdo_cob_ids();
        Ok(store)
    }

    pub fn node_id(&self) -> u8 {
        self.dict.node_id()
    }

    /// Borrow the underlying EDS-derived directory (used by the PDO engine to
    /// walk communication/mapping parameters directly).
    pub fn dict(&self) -> &ObjectDirectory {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut ObjectDirectory {
        &mut self.dict
    }

    pub fn get(&mut self, index: u16, sub_index: Option<u8>) -> Result<&Variable, OdError> {
        self.dict
            .get(index, sub_index)
            .ok_or(OdError::NotFound { index, sub_index })
    }

    fn get_mut(&mut self, index: u16, sub_index: Option<u8>) -> Result<&mut Variable, OdError> {
        self.dict
            .get_mut(index, sub_index)
            .ok_or(OdError::NotFound { index, sub_index })
    }

    /// `read(index, subindex)`: applies `factor` scaling to numeric types.
    pub fn read(&mut self, index: u16, sub_index: Option<u8>) -> Result<Scalar, OdError> {
        let var = self.get(index, sub_index)?;
        scalar_from_variable(var)
    }

    /// `read_bitfield`: gather the listed bit positions into a right-packed result.
    pub fn read_bitfield(&mut self, index: u16, sub_index: Option<u8>, field_name: &str) -> Result<u64, OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get(index, sub_index)?;
        let Some(positions) = var.bit_definitions.get(field_name).cloned() else {
            return Err(OdError::UnknownBitField { index, sub_index: sub, field: field_name.to_string() });
        };
        let raw = var.value.as_u64(var.data_type).or_else(|| var.value.as_i64(var.data_type).map(|v| v as u64));
        let Some(raw) = raw else {
            return Err(OdError::TypeMismatch { index, sub_index: sub });
        };
        let mut out = 0u64;
        for (result_bit, field_bit) in positions.iter().enumerate() {
            let bit = (raw >> field_bit) & 1;
            out |= bit << result_bit;
        }
        Ok(out)
    }

    /// `read_enum`: the display string whose integer key equals the stored value.
    pub fn read_enum(&mut self, index: u16, sub_index: Option<u8>) -> Result<String, OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get(index, sub_index)?;
        let raw = var
            .value
            .as_i64(var.data_type)
            .or_else(|| var.value.as_u64(var.data_type).map(|v| v as i64))
            .ok_or(OdError::TypeMismatch { index, sub_index: sub })?;
        var.value_descriptions
            .get(&raw)
            .cloned()
            .ok_or(OdError::EnumOutOfRange { index, sub_index: sub, value: raw })
    }

    /// `write`: type-check, range-check, then store.
    pub fn write(&mut self, index: u16, sub_index: Option<u8>, value: Scalar) -> Result<(), OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get_mut(index, sub_index)?;
        let encoded = encode_for_write(var, &value).ok_or(OdError::TypeMismatch { index, sub_index: sub })?;
        if !in_range(var, &encoded) {
            return Err(OdError::OutOfRange { index, sub_index: sub });
        }
        var.value = encoded;
        Ok(())
    }

    /// `write_bitfield`: clear the field's bits, then OR in `value` shifted to the field's base position.
    pub fn write_bitfield(&mut self, index: u16, sub_index: Option<u8>, field_name: &str, value: u64) -> Result<(), OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get_mut(index, sub_index)?;
        let Some(positions) = var.bit_definitions.get(field_name).cloned() else {
            return Err(OdError::UnknownBitField { index, sub_index: sub, field: field_name.to_string() });
        };
        let raw = var
            .value
            .as_u64(var.data_type)
            .or_else(|| var.value.as_i64(var.data_type).map(|v| v as u64))
            .ok_or(OdError::TypeMismatch { index, sub_index: sub })?;

        let mut mask = 0u64;
        for bit in &positions {
            mask |= 1 << bit;
        }
        let mut new_raw = raw & !mask;
        for (result_bit, field_bit) in positions.iter().enumerate() {
            let bit = (value >> result_bit) & 1;
            new_raw |= bit << field_bit;
        }

        var.value = Value::from_u64(new_raw, var.data_type)
            .or_else(|| Value::from_i64(new_raw as i64, var.data_type))
            .ok_or(OdError::TypeMismatch { index, sub_index: sub })?;
        Ok(())
    }

    /// `write_enum`: inverse of `read_enum`.
    pub fn write_enum(&mut self, index: u16, sub_index: Option<u8>, display: &str) -> Result<(), OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get_mut(index, sub_index)?;
        let value = var
            .value_descriptions
            .iter()
            .find(|(_, d)| d.as_str() == display)
            .map(|(v, _)| *v)
            .ok_or_else(|| OdError::EnumUnknown { index, sub_index: sub, display: display.to_string() })?;

        var.value = Value::from_i64(value, var.data_type)
            .or_else(|| Value::from_u64(value as u64, var.data_type))
            .ok_or(OdError::TypeMismatch { index, sub_index: sub })?;
        Ok(())
    }

    /// Encode a typed value into its raw wire-format bytes without storing it, applying
    /// the same factor-scaling and type-checking as [`Self::write`]. Used by the SDO
    /// server when a read callback supplies an override value.
    pub fn encode_scalar(&mut self, index: u16, sub_index: Option<u8>, value: &Scalar) -> Result<Vec<u8>, OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get(index, sub_index)?;
        let encoded = encode_for_write(var, value).ok_or(OdError::TypeMismatch { index, sub_index: sub })?;
        Ok(encoded.as_slice().to_vec())
    }

    /// Raw little-endian bytes currently stored at `index`/`sub_index`, with no factor
    /// scaling applied. Used by the SDO server for expedited/segmented transfers.
    pub fn raw_bytes(&mut self, index: u16, sub_index: Option<u8>) -> Result<Vec<u8>, OdError> {
        Ok(self.get(index, sub_index)?.value.as_slice().to_vec())
    }

    /// Write raw little-endian bytes directly into storage, bypassing factor scaling
    /// and the physical-unit `Scalar` type check, but still range-checked against
    /// `LowLimit`/`HighLimit`. Used by the SDO server.
    pub fn write_raw(&mut self, index: u16, sub_index: Option<u8>, data: &[u8]) -> Result<(), OdError> {
        let sub = sub_index.unwrap_or(0);
        let var = self.get(index, sub_index)?;
        if var.data_type.size() != 0 && var.data_type.size() != data.len() {
            return Err(OdError::TypeMismatch { index, sub_index: sub });
        }
        if !in_range(var, &Value::from_bytes(data)) {
            return Err(OdError::OutOfRange { index, sub_index: sub });
        }
        self.dict
            .set(index, sub_index, data)
            .map_err(|_| OdError::TypeMismatch { index, sub_index: sub })
    }

    /// Run once after load: rewrite default PDO COB-IDs to a guaranteed-distinct pattern.
    fn sanitize_pdo_cob_ids(&mut self) {
        let node_id = self.dict.node_id() as u16;
        for n in 0u16..16 {
            sanitize_slot(&mut self.dict, 0x1400 + n, n, node_id, &RPDO_BASES);
            sanitize_slot(&mut self.dict, 0x1800 + n, n, node_id, &TPDO_BASES);
        }
    }
}

fn sanitize_slot(dict: &mut ObjectDirectory, comm_index: u16, n: u16, node_id: u16, bases: &[u16; 4]) {
    let Some(var) = dict.get_mut(comm_index, Some(1)) else { return };
    let Some(current) = var.value.as_u64(var.data_type).or_else(|| var.value.as_i64(var.data_type).map(|v| v as u64)) else { return };
    let low_bits = (current & 0xFFF) as u16;
    if bases.iter().any(|base| low_bits == base + node_id) {
        let group = n % 4;
        let offset = n / 4;
        let new_cob_id = bases[group as usize] as u32 + node_id as u32 + offset as u32;
        if let Some(encoded) = Value::from_u64(new_cob_id as u64, var.data_type).or_else(|| Value::from_i64(new_cob_id as i64, var.data_type)) {
            var.value = encoded;
        }
    }
}

fn scalar_from_variable(var: &Variable) -> Result<Scalar, OdError> {
    let err = || OdError::TypeMismatch { index: var.index, sub_index: var.sub_index };
    match var.data_type {
        DataType::Boolean => Ok(Scalar::Bool(var.value.as_u64(var.data_type).ok_or_else(err)? != 0)),
        t if t.is_integer() => {
            if let Some(raw) = var.value.as_i64(t) {
                Ok(Scalar::Int(scale_int(raw, var.factor)))
            } else {
                let raw = var.value.as_u64(t).ok_or_else(err)?;
                Ok(Scalar::UInt(scale_uint(raw, var.factor)))
            }
        }
        t if t.is_float() => Ok(Scalar::Float(var.value.as_f64(t).ok_or_else(err)? * var.factor)),
        DataType::VisibleString | DataType::UnicodeString => {
            Ok(Scalar::Str(String::from_utf8_lossy(var.value.as_slice()).into_owned()))
        }
        DataType::OctetString | DataType::Domain => Ok(Scalar::Bytes(var.value.as_slice().to_vec())),
        DataType::Unknown => Err(err()),
    }
}

fn scale_int(raw: i64, factor: f64) -> i64 {
    if factor == 1.0 {
        raw
    } else {
        (raw as f64 * factor).round() as i64
    }
}

fn scale_uint(raw: u64, factor: f64) -> u64 {
    if factor == 1.0 {
        raw
    } else {
        (raw as f64 * factor).round() as u64
    }
}

/// Type-check `value` against `var.data_type` and encode it back into storage units
/// (dividing out `factor` for numeric types), per spec section 4.1's `write` contract.
fn encode_for_write(var: &Variable, value: &Scalar) -> Option<Value> {
    match (var.data_type, value) {
        (DataType::Boolean, Scalar::Bool(b)) => Value::from_u64(*b as u64, var.data_type),
        (t, Scalar::Int(v)) if t.is_integer() => {
            let raw = if var.factor == 1.0 { *v } else { (*v as f64 / var.factor).round() as i64 };
            Value::from_i64(raw, t)
        }
        (t, Scalar::UInt(v)) if t.is_integer() => {
            let raw = if var.factor == 1.0 { *v } else { (*v as f64 / var.factor).round() as u64 };
            Value::from_u64(raw, t).or_else(|| Value::from_i64(raw as i64, t))
        }
        (t, Scalar::Float(v)) if t.is_float() => {
            let raw = if var.factor == 1.0 { *v } else { v / var.factor };
            Value::from_f64(raw, t)
        }
        // Float-typed entries also accept integer input (spec: "float types accept integer or real").
        (t, Scalar::Int(v)) if t.is_float() => {
            let raw = if var.factor == 1.0 { *v as f64 } else { *v as f64 / var.factor };
            Value::from_f64(raw, t)
        }
        (DataType::VisibleString | DataType::UnicodeString, Scalar::Str(s)) => Some(Value::from_bytes(s.as_bytes())),
        (DataType::OctetString | DataType::Domain, Scalar::Bytes(b)) => Some(Value::from_bytes(b)),
        _ => None,
    }
}

fn in_range(var: &Variable, encoded: &Value) -> bool {
    let (Some(min), Some(max)) = (&var.min, &var.max) else { return true };
    let is_zero = |v: &Value| v.as_i64(var.data_type).map(|x| x == 0).unwrap_or(false)
        && v.as_u64(var.data_type).map(|x| x == 0).unwrap_or(true);
    if is_zero(min) && is_zero(max) {
        return true;
    }
    if let Some(raw) = encoded.as_i64(var.data_type) {
        let lo = min.as_i64(var.data_type).unwrap_or(i64::MIN);
        let hi = max.as_i64(var.data_type).unwrap_or(i64::MAX);
        return raw >= lo && raw <= hi;
    }
    if let Some(raw) = encoded.as_u64(var.data_type) {
        let lo = min.as_u64(var.data_type).unwrap_or(0);
        let hi = max.as_u64(var.data_type).unwrap_or(u64::MAX);
        return raw >= lo && raw <= hi;
    }
    if let Some(raw) = encoded.as_f64(var.data_type) {
        let lo = min.as_f64(var.data_type).unwrap_or(f64::MIN);
        let hi = max.as_f64(var.data_type).unwrap_or(f64::MAX);
        return raw >= lo && raw <= hi;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned16_eds(node_id_expr: &str) -> String {
        format!(
            "[2000]\nParameterName=Counter\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nLowLimit=0\nHighLimit=1000\nDefaultValue=5\nPDOMapping=1\n\n\
             [1800]\nParameterName=TPDO1 comm\nObjectType=0x9\n\n\
             [1800sub1]\nParameterName=COB-ID\nObjectType=0x7\nDataType=0x7\nAcessType=rw\nDefaultValue={node}\n",
            node = node_id_expr,
        )
    }

    #[test]
    fn write_then_read_round_trips_within_bounds() {
        let mut store = OdStore::load(0x10, &unsigned16_eds("0x180")).unwrap();
        store.write(0x2000, None, Scalar::UInt(42)).unwrap();
        assert_eq!(store.read(0x2000, None).unwrap(), Scalar::UInt(42));
    }

    #[test]
    fn write_rejects_out_of_range() {
        let mut store = OdStore::load(0x10, &unsigned16_eds("0x180")).unwrap();
        let err = store.write(0x2000, None, Scalar::UInt(5000)).unwrap_err();
        assert!(matches!(err, OdError::OutOfRange { .. }));
        assert_eq!(store.read(0x2000, None).unwrap(), Scalar::UInt(5));
    }

    #[test]
    fn bitfield_round_trips() {
        let eds = "[2001]\nParameterName=Flags\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nDefaultValue=0\nBitDefinitions=low:0,1;high:2,3\n";
        let mut store = OdStore::load(0x10, eds).unwrap();
        store.write_bitfield(0x2001, None, "low", 0b11).unwrap();
        assert_eq!(store.read_bitfield(0x2001, None, "low").unwrap(), 0b11);
        assert_eq!(store.read_bitfield(0x2001, None, "high").unwrap(), 0);
    }

    #[test]
    fn enum_round_trips() {
        let eds = "[2002]\nParameterName=Mode\nObjectType=0x7\nDataType=0x5\nAcessType=rw\nDefaultValue=0\nValueDescriptions=0=Off;1=On\n";
        let mut store = OdStore::load(0x10, eds).unwrap();
        store.write_enum(0x2002, None, "On").unwrap();
        assert_eq!(store.read_enum(0x2002, None).unwrap(), "On");
    }

    #[test]
    fn pdo_cob_id_sanitization_matches_default_slot_repair_scenario() {
        let mut eds = String::new();
        for n in 0..16u16 {
            eds.push_str(&format!(
                "[{idx:04X}]\nParameterName=TPDO{n} comm\nObjectType=0x9\n\n[{idx:04X}sub1]\nParameterName=COB-ID\nObjectType=0x7\nDataType=0x7\nAcessType=rw\nDefaultValue=$NODEID+0x180\n\n",
                idx = 0x1800 + n,
                n = n + 1,
            ));
        }
        let mut store = OdStore::load(0x10, &eds).unwrap();

        let cob_id = |store: &mut OdStore, n: u16| {
            let var = store.dict_mut().get(0x1800 + n, Some(1)).unwrap();
            var.value.as_u64(var.data_type).unwrap()
        };

        assert_eq!(cob_id(&mut store, 0), 0x190);
        assert_eq!(cob_id(&mut store, 1), 0x290);
        assert_eq!(cob_id(&mut store, 2), 0x390);
        assert_eq!(cob_id(&mut store, 3), 0x490);
        assert_eq!(cob_id(&mut store, 4), 0x191);
        assert_eq!(cob_id(&mut store, 15), 0x493);

        let mut ids = std::collections::HashSet::new();
        for n in 0..16u16 {
            assert!(ids.insert(cob_id(&mut store, n)), "duplicate cob id at slot {n}");
        }
    }
}
