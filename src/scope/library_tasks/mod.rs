//! Library-level tasks
//!
//! | Task | Input | Pending when |
//! |------|-------|--------------|
//! | compile | compiler config | config file missing |
//! | lint | files emitted by compile | nothing emitted |
//! | api | API-report config | config file missing |
//! | bundle | bundle config | config file missing |
//! | build | the four above | a dependency failed |
//! | watch | library directory | never |

pub(crate) mod api;
pub(crate) mod build;
pub(crate) mod bundle;
pub(crate) mod compile;
pub(crate) mod lint;
pub(crate) mod watch;

pub use compile::BUILD_INFO_OVERWRITE_CODE;
pub use watch::{FileEvent, FileEventKind, FileStats};
