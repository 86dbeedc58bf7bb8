pub mod ascii_preview;

pub use ascii_preview::{clear_screen, poll_key, progress_bar, AsciiRenderer, EnrollKey};
