//! Row and schema model
//!
//! The fixed-layout data model every other stage works against:
//!
//! - **`Field`**: one requested output column (metric, property or tag,
//!   optionally sourced from a related resource)
//! - **`Schema`**: the compiled, immutable column layout; assigns each field
//!   its slot index and resolves source keys and aliases
//! - **`Row`**: one timestamp's values for one resource, with a presence
//!   mask for metrics and nullable property slots
//! - **`Rowset`**: a resource's rows keyed by timestamp, always iterated in
//!   timestamp order
//!
//! A schema is built once per export, before any network activity, and then
//! shared read-only across all workers. Rows are mutable while the decoder
//! and splicer assemble them and treated as immutable once a sink sees them.

pub mod field;
pub mod row;
pub mod schema;

pub use field::{Field, FieldKind, Relation, RelationKind};
pub use row::{Row, Rowset};
pub use schema::Schema;
