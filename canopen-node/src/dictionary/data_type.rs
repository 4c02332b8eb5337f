//! The CANopen primitive data types (CiA 301 table 44) that a [`super::Variable`] can hold.

/// Tag for the ten CANopen primitive data types a `Variable` can carry.
///
/// `Unknown` is not a real CiA 301 data type; it is the value used when an EDS/DCF
/// `DataType` keyword can't be parsed, so a malformed entry fails at the point it's
/// used rather than at load time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
	Unknown,
	Boolean,
	Integer8,
	Integer16,
	Integer32,
	Integer64,
	Unsigned8,
	Unsigned16,
	Unsigned32,
	Unsigned64,
	Real32,
	Real64,
	VisibleString,
	OctetString,
	UnicodeString,
	Domain,
}

impl DataType {
	/// Decode the numeric `DataType` keyword value used in EDS/DCF files (CiA 301 table 44).
	pub fn from_u32(raw: u32) -> Self {
		match raw {
			0x01 => DataType::Boolean,
			0x02 => DataType::Integer8,
			0x03 => DataType::Integer16,
			0x04 => DataType::Integer32,
			0x05 => DataType::Unsigned8,
			0x06 => DataType::Unsigned16,
			0x07 => DataType::Unsigned32,
			0x08 => DataType::Real32,
			0x09 => DataType::VisibleString,
			0x0A => DataType::OctetString,
			0x0B => DataType::UnicodeString,
			0x0F => DataType::Domain,
			0x10 => DataType::Integer64,
			0x11 => DataType::Unsigned64,
			0x1B => DataType::Real64,
			_ => DataType::Unknown,
		}
	}

	/// Size in bytes of the encoded value, or `0` for variable-length types
	/// ([`DataType::VisibleString`], [`DataType::OctetString`], [`DataType::UnicodeString`], [`DataType::Domain`]).
	pub fn size(&self) -> usize {
		match self {
			DataType::Unknown => 0,
			DataType::Boolean | DataType::Integer8 | DataType::Unsigned8 => 1,
			DataType::Integer16 | DataType::Unsigned16 => 2,
			DataType::Integer32 | DataType::Unsigned32 | DataType::Real32 => 4,
			DataType::Integer64 | DataType::Unsigned64 | DataType::Real64 => 8,
			DataType::VisibleString | DataType::OctetString | DataType::UnicodeString | DataType::Domain => 0,
		}
	}

	/// Bit width of the type, used for bitfield range checks. Variable-length types report `0`.
	pub fn bit_width(&self) -> u32 {
		self.size() as u32 * 8
	}

	/// `true` for the eight `INTEGER*`/`UNSIGNED*` types.
	pub fn is_integer(&self) -> bool {
		matches!(
			self,
			DataType::Integer8
				| DataType::Integer16
				| DataType::Integer32
				| DataType::Integer64
				| DataType::Unsigned8
				| DataType::Unsigned16
				| DataType::Unsigned32
				| DataType::Unsigned64
		)
	}

	/// `true` for `REAL32`/`REAL64`.
	pub fn is_float(&self) -> bool {
		matches!(self, DataType::Real32 | DataType::Real64)
	}

	/// `true` for any numeric type (integer or float), the set eligible for `factor` scaling.
	pub fn is_numeric(&self) -> bool {
		self.is_integer() || self.is_float()
	}

	/// Zero-valued byte buffer of the correct width, used as the fallback default
	/// when an EDS entry has no `DefaultValue`.
	pub fn as_default_bytes(&self) -> Vec<u8> {
		vec![0u8; self.size()]
	}
}
