//! Hard bounds on inputs. Everything here exists to keep a hostile or buggy
//! caller from inflating the WAL or wedging expansion loops.

use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_USERNAME_LEN: usize = 128;
pub const MAX_EQUIPMENT_TAGS: usize = 64;
pub const MAX_RULE_LEN: usize = 1024;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking longer than 90 days is assumed to be caller error.
pub const MAX_SPAN_DURATION_MS: Ms = 90 * 24 * 3_600_000;

/// Cap on occurrences enumerated per expansion, window notwithstanding.
pub const MAX_OCCURRENCES: usize = 10_000;
