/// Data layer: tables, loading, filtering and export.
///
/// Architecture:
/// ```text
///  .csv / .xls / .xlsx
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse upload → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  country → status → establishment
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  project 4 columns → .csv + .xlsx
///   └──────────┘
/// ```
///
/// `schema` holds the column names and presence checks shared by all three.

pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod schema;
