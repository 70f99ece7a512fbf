pub mod record;
pub mod statement_cache;
pub mod traversal;

pub use record::{Record, RecordState};
pub use statement_cache::{CachedStatement, Slot, StatementCache};
pub use traversal::FindAll;
