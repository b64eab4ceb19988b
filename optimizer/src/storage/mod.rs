pub mod io;

pub use io::{concat_files, ensure_parent_dir, read_json_file, write_json_file, write_jsonl_file};
