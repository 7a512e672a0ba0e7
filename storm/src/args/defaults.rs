use nonzero_lit::u32;
use std::num::NonZeroU32;

pub const DEFAULT_REPEAT_COUNT: NonZeroU32 = u32!(1);
pub const DEFAULT_REQUEST_TIMEOUT: &str = "1s";
pub const DEFAULT_MAX_IDLE_TIMEOUT: &str = "0";
pub const DEFAULT_INITIAL_RETRANSMIT_COUNT: u32 = 0;
pub const DEFAULT_TRACE_DIR: &str = ".";
