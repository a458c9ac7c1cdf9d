/// Message recorded on a Config whose name is not the one the operator
/// honors. The expected name is appended.
pub const INVALID_NAME: &str = "metadata.name must be ";

/// Version recorded on conditions that cannot be attributed to a release.
pub const UNKNOWN_VERSION: &str = "unknown";
