//! Listener Address Parsing
//!
//! Two forms are accepted:
//!
//! - `A.B.C.D:port` binds that IPv4 address
//! - a bare decimal `port` binds the wildcard address `0.0.0.0`
//!
//! Anything else, including surrounding whitespace, IPv6 literals and host
//! names, is rejected.

use std::net::{Ipv4Addr, SocketAddrV4};
use thiserror::Error;

/// Errors produced while parsing a listener address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input was empty
    #[error("empty listener address")]
    Empty,

    /// The input matched neither `A.B.C.D:port` nor `port`
    #[error("malformed listener address {0:?}, expected A.B.C.D:port or port")]
    Malformed(String),
}

/// Parses a listener address into an IPv4 socket address.
///
/// # Example
///
/// ```
/// use ringpoll::net::parse_address;
/// use std::net::{Ipv4Addr, SocketAddrV4};
///
/// assert_eq!(
///     parse_address("127.0.0.1:9000").unwrap(),
///     SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000)
/// );
/// assert_eq!(
///     parse_address("8080").unwrap(),
///     SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080)
/// );
/// assert!(parse_address("localhost:80").is_err());
/// ```
pub fn parse_address(input: &str) -> Result<SocketAddrV4, AddressError> {
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    if input.contains(':') {
        return input
            .parse::<SocketAddrV4>()
            .map_err(|_| AddressError::Malformed(input.to_string()));
    }

    // `u16::from_str` accepts a leading '+', a port must be plain digits
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::Malformed(input.to_string()));
    }

    input
        .parse::<u16>()
        .map(|port| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .map_err(|_| AddressError::Malformed(input.to_string()))
}
