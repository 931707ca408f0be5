pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, goal_line, header, section, status, success, summary_row, warn};
pub use table::TableBuilder;
pub use theme::{theme, Theme};
