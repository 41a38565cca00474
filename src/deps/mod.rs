//! Function-level dependency graph between code chunks.
//!
//! [`resolver`] computes each chunk's `functions` list offline;
//! [`expander`] walks those lists at query time.
pub mod expander;
pub mod resolver;

pub use expander::{DependencyExpander, ExpandError};
pub use resolver::{
    DependencyResolver, ResolveError, ResolveStats, add_function_dependencies,
    resolve_chunk_dependencies,
};
