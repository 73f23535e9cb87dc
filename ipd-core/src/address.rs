use std::net::Ipv4Addr;

use crate::error::AddressError;

const OCTETS: usize = 4;

/// Parses exactly four dot-separated decimal octets into a packed value.
///
/// No surrounding whitespace is accepted. Leading zeros are tolerated
/// (`"010.0.0.1"` is `10.0.0.1`), signs are not.
pub fn parse_address(line: &str) -> Result<u32, AddressError> {
    let segments = line.split('.').count();
    if segments != OCTETS {
        return Err(AddressError::SegmentCount(segments));
    }

    let mut value = 0u32;
    for segment in line.split('.') {
        value = (value << 8) | u32::from(parse_octet(segment)?);
    }
    Ok(value)
}

fn parse_octet(segment: &str) -> Result<u8, AddressError> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::InvalidOctet(segment.to_string()));
    }
    let value = segment.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    });
    u8::try_from(value).map_err(|_| AddressError::OctetOutOfRange(value))
}

pub fn format_address(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}
