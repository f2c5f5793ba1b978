//! Crate-internal plumbing shared by the registry, gate cache, and
//! pending-local table.

mod sharded;

pub(crate) use sharded::{ShardedOnceMap, ShardedTable};
