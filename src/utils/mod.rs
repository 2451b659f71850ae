//! Small helpers shared by the codec: checked arithmetic, MUTF-8 and checksums.

pub mod checksum;
pub mod math;
pub mod mutf8;
