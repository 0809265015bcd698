use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DrivePulseError;

// Device identifiers are interpolated into time-series queries and delete
// predicates, so they are validated against a strict character set before any
// storage access. Accepted WWN forms:
//   - hex:    0x followed by exactly 16 hex characters (0x5000cca264eb01d7)
//   - UUID:   8-4-4-4-12 hex with dashes (a4c8e8ed-11a0-4c97-9bba-306440f1b944)
//   - serial: restricted fallback [0-9A-Za-z_-]{1,64} for NVMe devices that
//     expose no hardware WWN
static WWN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0x[0-9a-fA-F]{16}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|[0-9A-Za-z_-]{1,64})$",
    )
    .expect("wwn regex must compile")
});

// ZFS pool GUIDs: decimal (up to 20 digits, max uint64) or 0x-prefixed hex.
static GUID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0x[0-9a-fA-F]{1,16}|[0-9]{1,20})$").expect("guid regex must compile"));

/// Validate a device WWN before it is used in any storage query.
pub fn validate_wwn(wwn: &str) -> Result<(), DrivePulseError> {
    if !WWN_REGEX.is_match(wwn) {
        return Err(DrivePulseError::ValidationError(
            "invalid WWN format: must be 0x followed by 16 hex characters, UUID format, or a short serial".to_string(),
        ));
    }
    Ok(())
}

/// Validate a ZFS pool GUID before it is used in any storage query.
pub fn validate_guid(guid: &str) -> Result<(), DrivePulseError> {
    if !GUID_REGEX.is_match(guid) {
        return Err(DrivePulseError::ValidationError(
            "invalid GUID format: must be a decimal number or hexadecimal with 0x prefix".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_wwn_hex_format() {
        assert!(validate_wwn("0x5000cca264eb01d7").is_ok());
        assert!(validate_wwn("0x5000CCA264EB01D7").is_ok());
    }

    #[test]
    fn test_validate_wwn_uuid_format() {
        assert!(validate_wwn("a4c8e8ed-11a0-4c97-9bba-306440f1b944").is_ok());
    }

    #[test]
    fn test_validate_wwn_serial_fallback() {
        // NVMe devices without a hardware WWN register under their serial
        assert!(validate_wwn("S4EWNX0N123456").is_ok());
        assert!(validate_wwn("SN_123-456").is_ok());
    }

    #[test]
    fn test_validate_wwn_rejects_injection() {
        assert!(validate_wwn("0x5000cca264eb01d7\" or 1=1").is_err());
        assert!(validate_wwn("0x5000cca264eb01d7; drop table devices").is_err());
        assert!(validate_wwn("wwn|pipe").is_err());
        assert!(validate_wwn("wwn\nnewline").is_err());
        assert!(validate_wwn("wwn with spaces").is_err());
        assert!(validate_wwn("(parens)").is_err());
    }

    #[test]
    fn test_validate_wwn_rejects_empty_and_oversized() {
        assert!(validate_wwn("").is_err());
        let too_long = "a".repeat(65);
        assert!(validate_wwn(&too_long).is_err());
        let max_len = "a".repeat(64);
        assert!(validate_wwn(&max_len).is_ok());
    }

    #[test]
    fn test_validate_guid() {
        assert!(validate_guid("12345678901234567890").is_ok());
        assert!(validate_guid("0xABCD1234").is_ok());
        assert!(validate_guid("0x").is_err());
        assert!(validate_guid("123456789012345678901").is_err());
        assert!(validate_guid("tank; drop").is_err());
        assert!(validate_guid("").is_err());
    }
}
