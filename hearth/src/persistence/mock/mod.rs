mod error;
mod view;

pub use error::MockViewError;
pub use view::MemoryViewStore;
