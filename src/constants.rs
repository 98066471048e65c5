//! Application-wide constants.

/// Human-readable application name.
pub const APP_NAME: &str = "StickShift";

/// Binary name as installed on the user's PATH.
pub const APP_BINARY_NAME: &str = "stickshift";

/// Schema version written into editable profile documents.
pub const PROFILE_SCHEMA_VERSION: &str = "1.0";

/// Raw value range assumed for axes the name database has no entry for.
pub const DEFAULT_AXIS_RANGE: (i32, i32) = (-32768, 32767);
