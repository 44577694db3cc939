//! A dedicated error type for everything that can go wrong building, parsing or
//! exchanging mDNS packets: I/O, malformed wire data, and the handful of
//! caller-facing validation failures named in the registration/resolution APIs.
use std::fmt;
use std::io;
use std::str;

#[derive(Debug)]
pub enum DNSError {
    Io(io::Error),
    Utf8(str::Utf8Error),
    /// The incoming packet could not be parsed: bad domain name, circular
    /// compression pointer, or a record that runs past the end of the buffer.
    MalformedPacket(String),
    /// A single DNS label exceeded the 63 byte limit.
    NameTooLong,
    /// `register_service` exhausted its probe rounds without finding a free name.
    NameNotUnique(String),
    /// A `ServiceInfo` instance name does not end with its own service type.
    BadInstanceName(String),
    /// `sendto` wrote fewer bytes than the serialized message.
    SendFailure,
}

impl fmt::Display for DNSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSError::Io(e) => write!(f, "I/O error: {}", e),
            DNSError::Utf8(e) => write!(f, "invalid UTF-8 in packet: {}", e),
            DNSError::MalformedPacket(s) => write!(f, "malformed packet: {}", s),
            DNSError::NameTooLong => write!(f, "domain label longer than 63 bytes"),
            DNSError::NameNotUnique(s) => write!(f, "name not unique: {}", s),
            DNSError::BadInstanceName(s) => write!(f, "instance name does not end with its service type: {}", s),
            DNSError::SendFailure => write!(f, "short write sending packet"),
        }
    }
}

impl std::error::Error for DNSError {}

/// A specific custom `Result` for all functions in this crate.
pub type DNSResult<T> = Result<T, DNSError>;

impl From<io::Error> for DNSError {
    fn from(err: io::Error) -> Self {
        DNSError::Io(err)
    }
}

impl From<str::Utf8Error> for DNSError {
    fn from(err: str::Utf8Error) -> Self {
        DNSError::Utf8(err)
    }
}
