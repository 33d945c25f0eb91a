/*!
# Inventory

A small inventory tracker: sign up, log in, add products one at a time or in
bulk from a spreadsheet, list them by category or name, show a scannable code
per product, and remove them.

## Architecture

### Catalog Store
- Holds the ordered product list in memory
- Validates single additions; admits spreadsheet rows with defaults
- Writes the whole catalog back to storage after every mutation
- Hands out ids from a millisecond clock that never repeats itself

### Storage
- A `get`/`set`/`remove` port over string values
- In-memory backend (optionally quota-limited) and a one-file-per-key disk backend
- Keys: `products`, `loggedInUser`, `users`

### Spreadsheets
- Import of xlsx/xls/ods through calamine, CSV through a quoted-field parser
- Import template and catalog export (CSV, XLSX) through rust_xlsxwriter
- Full catalog backups as gzip-compressed bincode

### Web Layer (feature `web`)
- axum JSON API, catalog routes gated on a logged-in session

## Modules

- **product**: Product, Category, add form, import row, listing filter
- **catalog**: the catalog store
- **storage**: storage port and backends
- **loader**: spreadsheet decoding
- **downloader**: template and export generation
- **saving**: catalog backups
- **login**: accounts and session
- **config**: command-line configuration
- **error**: crate error type
- **app**: routing and middleware
*/

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod login;
pub mod product;
pub mod saving;
pub mod storage;

#[cfg(feature = "web")]
pub mod app;

pub use catalog::CatalogStore;
pub use error::{InventoryError, Result};
pub use product::{Category, ImportRow, Product, ProductFilter, ProductForm, ProductId};
pub use storage::{FileStorage, MemoryStorage, Storage};
