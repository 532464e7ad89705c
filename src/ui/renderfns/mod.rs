pub mod header;
pub mod utils;

pub use header::draw_header;
pub use utils::{cell_text, status_color, truncate};
