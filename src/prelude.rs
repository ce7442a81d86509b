//! Error and logging vocabulary used throughout the crate.

pub use color_eyre::eyre::{bail, eyre, Context, Report, Result};
pub use color_eyre::Section;
pub use tracing::{debug, error, info, warn};
