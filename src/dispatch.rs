//! Implementation dispatcher: discovers candidate runtimes on disk, checks
//! their exported symbol tables, filters them by capability and binds an
//! application to one of them.

pub mod caps;
pub mod config;
pub mod discovery;
pub mod loader;

pub use caps::{CapsFormat, ImplDescription};
pub use config::{Config, ConfigHandle};
pub use discovery::SEARCH_PATH_ENV;
pub use loader::{ImplDescHandle, Loader, RuntimeSession};
