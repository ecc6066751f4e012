pub mod logging;

pub use logging::{preview_line, truncate_text};
