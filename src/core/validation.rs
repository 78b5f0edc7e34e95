//! IPv4 address and CIDR validation.
//!
//! These checks are shared verbatim by the main process and the privileged
//! helper binary; the helper re-runs them on every invocation.

/// Rejection reasons from the network validators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The string does not have the `address/prefix` shape.
    #[error("invalid CIDR format '{0}'")]
    InvalidFormat(String),

    /// The prefix is not an integer in `0..=32`.
    #[error("prefix length out of range in '{0}'")]
    PrefixOutOfRange(String),

    /// The address part is not a canonical dotted-quad.
    #[error("invalid IPv4 address '{0}'")]
    InvalidAddress(String),
}

/// Four dot-separated decimal octets in `0..=255`, no leading zeros.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|part| {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match part.parse::<u8>() {
            // "01" parses but does not round-trip.
            Ok(octet) => octet.to_string() == *part,
            Err(_) => false,
        }
    })
}

/// Exactly one `/`, a valid IPv4 address on the left and a prefix in `0..=32` on the right.
pub fn is_valid_cidr(cidr: &str) -> bool {
    let Some((address, prefix)) = split_cidr(cidr) else {
        return false;
    };
    is_valid_ipv4(address) && parse_prefix(prefix).is_some()
}

/// Gateways are plain IPv4 addresses.
pub fn is_valid_gateway(gateway: &str) -> bool {
    is_valid_ipv4(gateway)
}

/// Address portion of `address/prefix`.
pub fn network_address(cidr: &str) -> Result<&str, ValidationError> {
    split_cidr(cidr)
        .map(|(address, _)| address)
        .ok_or_else(|| ValidationError::InvalidFormat(cidr.to_string()))
}

/// Dotted-decimal subnet mask for the prefix length of `cidr`.
pub fn subnet_mask(cidr: &str) -> Result<String, ValidationError> {
    let (_, prefix) =
        split_cidr(cidr).ok_or_else(|| ValidationError::InvalidFormat(cidr.to_string()))?;
    let prefix =
        parse_prefix(prefix).ok_or_else(|| ValidationError::PrefixOutOfRange(cidr.to_string()))?;
    let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let [b1, b2, b3, b4] = mask.to_be_bytes();
    Ok(format!("{b1}.{b2}.{b3}.{b4}"))
}

/// Full check of a rule's network, mapping the failure to the matching error variant.
pub fn validate_cidr(cidr: &str) -> Result<(), ValidationError> {
    let (address, prefix) =
        split_cidr(cidr).ok_or_else(|| ValidationError::InvalidFormat(cidr.to_string()))?;
    if !is_valid_ipv4(address) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }
    if parse_prefix(prefix).is_none() {
        return Err(ValidationError::PrefixOutOfRange(cidr.to_string()));
    }
    Ok(())
}

fn split_cidr(cidr: &str) -> Option<(&str, &str)> {
    let mut parts = cidr.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(address), Some(prefix), None) => Some((address, prefix)),
        _ => None,
    }
}

fn parse_prefix(prefix: &str) -> Option<u32> {
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse::<u32>().ok().filter(|p| *p <= 32)
}
