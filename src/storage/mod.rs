pub mod artifacts;
pub mod workspace;

pub use workspace::PaperWorkspace;
