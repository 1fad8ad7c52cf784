//! Entry points for the two operations the CLI exposes.
//!
//! Both take explicit parameters and return a summary; they hold no global
//! state and do not print anything themselves.

mod inspect;
mod split;

pub use inspect::inspect;
pub use split::split;
