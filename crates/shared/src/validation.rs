//! Common validation utilities.

use validator::ValidationError;

/// Maximum trainer level accepted for instance level bounds.
pub const MAX_LEVEL: u8 = 50;

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates that a trainer level is within the accepted range.
pub fn validate_level(level: u8) -> Result<(), ValidationError> {
    if level <= MAX_LEVEL {
        Ok(())
    } else {
        let mut err = ValidationError::new("level_range");
        err.message = Some("Level must be between 0 and 50".into());
        Err(err)
    }
}

/// Validates a trigger time-of-day in seconds since local midnight.
///
/// Zero is valid and means "fire on source-instance completion".
pub fn validate_trigger_time(time: u32) -> Result<(), ValidationError> {
    if time < 86_400 {
        Ok(())
    } else {
        let mut err = ValidationError::new("trigger_time_range");
        err.message = Some("Trigger time must be below 86400 seconds".into());
        Err(err)
    }
}
