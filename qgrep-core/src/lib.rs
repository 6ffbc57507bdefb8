#![forbid(unsafe_code)]

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod options;

pub mod util {
    pub mod eol;
    pub mod pool;
}

pub mod ngram {
    pub mod bloom;
}

pub mod fuzzy;
pub mod highlight;
pub mod codec;

pub mod store {
    pub mod format;
    pub mod reader;
    pub mod writer;
}

pub mod builder;
pub mod updater;
pub mod changelist;

pub mod search {
    pub mod driver;
    pub mod ordered_output;
    pub mod regexec;
    pub mod workqueue;
}

pub mod filter;

pub use crate::error::{QgrepError, Result};

pub use builder::{Builder, BuilderStats};
pub use changelist::ChangeList;
pub use filter::{FilterOptions, FilterResult};
pub use options::{FilterMode, QueryOptions, SearchFlags};
pub use search::driver::{SearchOutcome, search};
pub use store::reader::StoreReader;
pub use updater::{UpdateStats, update};

pub mod prelude {
    pub use crate::error::{QgrepError, Result};
    pub use crate::options::{FilterMode, QueryOptions, SearchFlags};
    pub use crate::search::driver::search;
    pub use crate::store::reader::StoreReader;
}
