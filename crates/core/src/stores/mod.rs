pub mod local;

pub use local::{content_id, LocalVectorIndex};
