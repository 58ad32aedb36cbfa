// ABOUTME: Export and reconstruction building blocks
// ABOUTME: Schema extraction, Parquet dump/restore, checksums and size accounting

pub mod checksum;
pub mod dump;
pub mod estimation;
pub mod filtered;
pub mod restore;
pub mod schema;

pub use checksum::{sha256_file, verify_sha256};
pub use dump::TableExporter;
pub use estimation::{format_bytes, SizeSummary};
pub use filtered::build_select_sql;
pub use restore::{set_pragma, SchemaApplier, TableLoader};
pub use schema::{extract_schema, strip_pragmas};
