//! GPU resource management.

mod partitioned;

pub use partitioned::{BufferBlock, BufferReservation, PartitionedBuffer};
