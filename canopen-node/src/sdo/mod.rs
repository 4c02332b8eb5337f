//! Service Data Object (SDO) server: wire-level command vocabulary plus the
//! name-keyed callback dispatcher (spec section 4.3).

mod address;
pub use address::*;

mod server;
pub use server::*;

/// SDO command sent by a client (master), received by this node's server.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[derive(num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub(crate) enum ClientCommand {
	/// Download a segment to the server.
	SegmentDownload = 0,

	/// Initiate a download to the server.
	InitiateDownload = 1,

	/// Initiate an upload from the server.
	InitiateUpload = 2,

	/// Request the server to upload a segment.
	SegmentUpload = 3,

	/// Tell the server we are aborting the transfer.
	AbortTransfer = 4,
}

/// SDO command sent by this node acting as a server.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[derive(num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub(crate) enum ServerCommand {
	/// The server is uploading a segment.
	SegmentUpload = 0,

	/// The server has downloaded the segment.
	SegmentDownload = 1,

	/// The server accepts the upload request.
	InitiateUpload = 2,

	/// The server accepts the download request.
	InitiateDownload = 3,

	/// The server is aborting the transfer.
	AbortTransfer = 4,
}

/// The reason for aborting a transfer.
///
/// Definitions come from CiA 301 section 7.2.3.3.17 table 22.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[derive(num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u32)]
pub enum AbortReason {
	/// Toggle bit not alternated.
	ToggleBitNotAlternated = 0x0503_0000,

	/// SDO protocol timed out.
	SdoProtocolTimedOut = 0x0504_0000,

	/// Client/server command specifier not valid or unknown.
	InvalidOrUnknownCommandSpecifier = 0x0504_0001,

	/// Invalid block size (block mode only).
	InvalidBlockSize = 0x0504_0002,

	/// Invalid sequence number (block mode only).
	InvalidSequenceNumber = 0x0504_0003,

	/// CRC error (block mode only).
	CrcError = 0x0504_0004,

	/// Out of memory.
	OutOfMemory = 0x0504_0005,

	/// Unsupported access to an object.
	UnsupportedObjectAccess = 0x0601_0000,

	/// Attempt to read a write only object.
	ReadFromWriteOnlyObject = 0x0601_0001,

	/// Attempt to write a read only object.
	WriteToReadOnlyObject = 0x0601_0002,

	/// Object does not exist in the object dictionary.
	ObjectDoesNotExist = 0x0602_0000,

	/// Object cannot be mapped to the PDO.
	ObjectCanNotBeMapped = 0x0604_0041,

	/// The number and length of the objects to be mapped would exceed PDO length.
	NumberAndLengthOfObjectsExceedPdoLength = 0x0604_0042,

	/// General parameter incompatibility reason.
	GeneralParameterError = 0x0604_0043,

	/// General internal incompatibility in the device.
	GeneralInternalError = 0x0604_0047,

	/// Access failed due to an hardware error.
	HardwareError = 0x0606_0000,

	/// Data type does not match, length of service parameter does not match.
	LengthMismatch = 0x0607_0010,

	/// Data type does not match, length of service parameter too high.
	LengthTooHigh = 0x0607_0012,

	/// Data type does not match, length of service parameter too low.
	LengthTooLow = 0x0607_0013,

	/// Sub-index does not exist.
	SubIndexDoesNotExist = 0x0609_0011,

	/// Invalid value for parameter (download only).
	ObjectValueInvalid = 0x0609_0030,

	/// Value of parameter written too high (download only).
	ObjectValueTooHigh = 0x0609_0031,

	/// Value of parameter written too low (download only).
	ObjectValueTooLow = 0x0609_0032,

	/// Maximum value is less than minimum value.
	MaximumBelowMinimum = 0x0609_0036,

	/// Resource not available: SDO connection.
	ResourceNotAvailable = 0x060A_0023,

	/// General error.
	GeneralError = 0x0800_0000,

	/// Data cannot be transferred or stored to the application.
	CanNotTransferData = 0x0800_0020,

	/// Data cannot be transferred or stored to the application because of local control.
	LocalControlError = 0x0800_0021,

	/// Data cannot be transferred or stored to the application because of the present device state.
	InvalidDeviceStateForTransfer = 0x0800_0022,

	/// Object dictionary dynamic generation fails or no object dictionary is present.
	FailedToGenerateDynamicDictionary = 0x0800_0023,

	/// No data available.
	NoDataAvailable = 0x0800_0024,
}

impl std::fmt::Display for ClientCommand {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ClientCommand::SegmentDownload => write!(f, "download-segment"),
			ClientCommand::InitiateDownload => write!(f, "initiate-download"),
			ClientCommand::InitiateUpload => write!(f, "initiate-upload"),
			ClientCommand::SegmentUpload => write!(f, "upload-segment"),
			ClientCommand::AbortTransfer => write!(f, "abort-transfer"),
		}
	}
}

impl std::fmt::Display for ServerCommand {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ServerCommand::SegmentDownload => write!(f, "download-segment"),
			ServerCommand::InitiateDownload => write!(f, "initiate-download"),
			ServerCommand::InitiateUpload => write!(f, "initiate-upload"),
			ServerCommand::SegmentUpload => write!(f, "upload-segment"),
			ServerCommand::AbortTransfer => write!(f, "abort-transfer"),
		}
	}
}

impl std::fmt::Display for AbortReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::ToggleBitNotAlternated => write!(f, "toggle bit not alternated"),
			Self::SdoProtocolTimedOut => write!(f, "SDO protocol timed out"),
			Self::InvalidOrUnknownCommandSpecifier => write!(f, "invalid or unknown SDO command"),
			Self::InvalidBlockSize => write!(f, "invalid block size"),
			Self::InvalidSequenceNumber => write!(f, "invalid sequence number"),
			Self::CrcError => write!(f, "CRC error"),
			Self::OutOfMemory => write!(f, "out of memory"),
			Self::UnsupportedObjectAccess => write!(f, "unsupported access to an object"),
			Self::ReadFromWriteOnlyObject => write!(f, "attempt to read a write only object"),
			Self::WriteToReadOnlyObject => write!(f, "attempt to write a read only object"),
			Self::ObjectDoesNotExist => write!(f, "object does not exist in the object dictionary"),
			Self::ObjectCanNotBeMapped => write!(f, "object cannot be mapped to the PDO"),
			Self::NumberAndLengthOfObjectsExceedPdoLength => write!(f, "the number and length of the objects to be mapped would exceed PDO length"),
			Self::GeneralParameterError => write!(f, "general parameter incompatibility reason"),
			Self::GeneralInternalError => write!(f, "general internal incompatibility in the device"),
			Self::HardwareError => write!(f, "access failed due to an hardware error"),
			Self::LengthMismatch => write!(f, "data type does not match, length of service parameter does not match"),
			Self::LengthTooHigh => write!(f, "data type does not match, length of service parameter too high"),
			Self::LengthTooLow => write!(f, "data type does not match, length of service parameter too low"),
			Self::SubIndexDoesNotExist => write!(f, "sub-index does not exist"),
			Self::ObjectValueInvalid => write!(f, "invalid value for parameter"),
			Self::ObjectValueTooHigh => write!(f, "value of parameter written is too high"),
			Self::ObjectValueTooLow => write!(f, "value of parameter written is too low"),
			Self::MaximumBelowMinimum => write!(f, "maximum value is less than minimum value"),
			Self::ResourceNotAvailable => write!(f, "resource not available: SDO connection"),
			Self::GeneralError => write!(f, "general error"),
			Self::CanNotTransferData => write!(f, "data cannot be transferred or stored to the application"),
			Self::LocalControlError => write!(f, "data cannot be transferred or stored to the application because of local control"),
			Self::InvalidDeviceStateForTransfer => write!(f, "data cannot be transferred or stored to the application because of the present device state"),
			Self::FailedToGenerateDynamicDictionary => write!(f, "dynamic object dictionary generation failed or no object dictionary is present"),
			Self::NoDataAvailable => write!(f, "no data available"),
		}
	}
}
