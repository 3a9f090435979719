//! Signal engine constants.
//!
//! Single source of truth for the fixed limits of signal definitions,
//! shared signal storage and the reserved namespace names.

use static_assertions::const_assert;

/// Maximum number of dimensions of a signal (scalar = 0, vector = 1, matrix = 2, cube = 3).
pub const MAX_DIMENSIONS: usize = 3;

/// Number of buffer slots of every shared signal (double buffering).
pub const BUFFER_COUNT: usize = 2;

/// Default ring depth of a shared signal.
pub const DEFAULT_NUMBER_OF_SAMPLES: u32 = 1;

/// Reserved namespace group holding the per-module timing signals.
///
/// Created on demand the first time a path references it.
pub const GAM_TIMES_GROUP: &str = "GAM_Times";

/// Suffix of the absolute elapsed-microseconds timing signal.
pub const ABSOLUTE_TIME_SIGNAL: &str = "AbsoluteUsecTime";

/// Suffix of the relative elapsed-microseconds timing signal.
pub const RELATIVE_TIME_SIGNAL: &str = "RelativeUsecTime";

/// Type of both timing signals.
pub const TIME_SIGNAL_TYPE: &str = "uint64";

/// Path separator of the shared namespace.
pub const PATH_SEPARATOR: char = '.';

/// Sigil of a regular member in configuration keys.
pub const REGULAR_SIGIL: char = '+';

/// Sigil of a domain member in configuration keys.
pub const DOMAIN_SIGIL: char = '$';

/// Number of columns of a `Samples` matrix row: `{begin, end, total}`.
pub const SAMPLES_COLUMNS: usize = 3;

/// Number of columns of an `Operation` matrix row: `{begin, end}`.
pub const BLOCK_COLUMNS: usize = 2;

const_assert!(MAX_DIMENSIONS == 3);
const_assert!(BUFFER_COUNT == 2);
const_assert!(DEFAULT_NUMBER_OF_SAMPLES >= 1);
