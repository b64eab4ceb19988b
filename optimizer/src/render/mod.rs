pub mod pdf;

pub use pdf::{render_json_pdf, title_for, write_json_pdf};
