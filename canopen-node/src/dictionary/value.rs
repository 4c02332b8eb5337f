use super::{parse_number, DataType};

#[derive(Clone, Debug)]
pub struct Value {
    data: Vec<u8>,
}

impl Value {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub fn from_str(raw_value: &str, kind: DataType) -> Result<Value, String> {
        match kind {
            DataType::Unknown => Err("Unknown data type!".into()),

            DataType::Boolean => {
                let val = match raw_value.to_lowercase().as_str() {
                    "true" | "1" => 1u8,
                    "false" | "0" => 0u8,
                    _ => return Err("Invalid bool value".into()),
                };

                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Integer8 => {
                let val: i8 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Integer16 => {
                let val: i16 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Integer32 => {
                let val: i32 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Integer64 => {
                let val: i64 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Unsigned8 => {
                let val: u8 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Unsigned16 => {
                let val: u16 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Unsigned32 => {
                let val: u32 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Unsigned64 => {
                let val: u64 = parse_number(raw_value);
                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Real32 => {
                let Ok(val) = raw_value.parse::<f32>() else {
                    return Err("Failed to parse f32".into());
                };

                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::Real64 => {
                let Ok(val) = raw_value.parse::<f64>() else {
                    return Err("Failed to parse f64".into());
                };

                Ok(Value::from_bytes(&val.to_le_bytes()))
            }

            DataType::VisibleString
            | DataType::OctetString
            | DataType::UnicodeString => Ok(Value {
                data: raw_value.as_bytes().to_vec(),
            }),

            DataType::Domain => {
                let Ok(val) = raw_value.parse::<i32>() else {
                    return Err("Failed to parse domain id".into());
                };

                Ok(Value::from_bytes(&val.to_le_bytes()))
            }
        }
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Interpret the stored bytes as a signed integer, little-endian, per `kind`.
    ///
    /// Returns `None` for non-integer or variable-length types.
    pub fn as_i64(&self, kind: DataType) -> Option<i64> {
        match kind {
            DataType::Integer8 => Some(i8::from_le_bytes(self.data.clone().try_into().ok()?) as i64),
            DataType::Integer16 => Some(i16::from_le_bytes(self.data.clone().try_into().ok()?) as i64),
            DataType::Integer32 => Some(i32::from_le_bytes(self.data.clone().try_into().ok()?) as i64),
            DataType::Integer64 => Some(i64::from_le_bytes(self.data.clone().try_into().ok()?)),
            _ => None,
        }
    }

    /// Interpret the stored bytes as an unsigned integer, little-endian, per `kind`.
    pub fn as_u64(&self, kind: DataType) -> Option<u64> {
        match kind {
            DataType::Boolean | DataType::Unsigned8 => Some(*self.data.first()? as u64),
            DataType::Unsigned16 => Some(u16::from_le_bytes(self.data.clone().try_into().ok()?) as u64),
            DataType::Unsigned32 => Some(u32::from_le_bytes(self.data.clone().try_into().ok()?) as u64),
            DataType::Unsigned64 => Some(u64::from_le_bytes(self.data.clone().try_into().ok()?)),
            _ => None,
        }
    }

    /// Interpret the stored bytes as a floating point number per `kind`.
    pub fn as_f64(&self, kind: DataType) -> Option<f64> {
        match kind {
            DataType::Real32 => Some(f32::from_le_bytes(self.data.clone().try_into().ok()?) as f64),
            DataType::Real64 => Some(f64::from_le_bytes(self.data.clone().try_into().ok()?)),
            _ => None,
        }
    }

    /// Build a `Value` from a signed integer, encoded little-endian at the width of `kind`.
    pub fn from_i64(raw: i64, kind: DataType) -> Option<Self> {
        Some(match kind {
            DataType::Integer8 => Self::from_bytes(&(raw as i8).to_le_bytes()),
            DataType::Integer16 => Self::from_bytes(&(raw as i16).to_le_bytes()),
            DataType::Integer32 => Self::from_bytes(&(raw as i32).to_le_bytes()),
            DataType::Integer64 => Self::from_bytes(&raw.to_le_bytes()),
            _ => return None,
        })
    }

    /// Build a `Value` from an unsigned integer, encoded little-endian at the width of `kind`.
    pub fn from_u64(raw: u64, kind: DataType) -> Option<Self> {
        Some(match kind {
            DataType::Boolean => Self::from_bytes(&[(raw != 0) as u8]),
            DataType::Unsigned8 => Self::from_bytes(&(raw as u8).to_le_bytes()),
            DataType::Unsigned16 => Self::from_bytes(&(raw as u16).to_le_bytes()),
            DataType::Unsigned32 => Self::from_bytes(&(raw as u32).to_le_bytes()),
            DataType::Unsigned64 => Self::from_bytes(&raw.to_le_bytes()),
            _ => return None,
        })
    }

    /// Build a `Value` from a float, encoded little-endian at the width of `kind`.
    pub fn from_f64(raw: f64, kind: DataType) -> Option<Self> {
        Some(match kind {
            DataType::Real32 => Self::from_bytes(&(raw as f32).to_le_bytes()),
            DataType::Real64 => Self::from_bytes(&raw.to_le_bytes()),
            _ => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
