//! Typed, self-describing containers for each reduction stage, and their
//! persisted binary form.

pub mod header;
pub mod level0;
pub mod level1;
pub mod level2;
pub mod persist;
mod product;

pub use header::{Header, HeaderValue, ProvenanceEntry, CARD_DATE_OBS};
pub use level0::{AuxTable, Level0};
pub use level1::{HkSpectrum, Level1, Spectrum};
pub use level2::{Level2, Measurement};
pub use persist::{ArrayExtension, ProductFile, PRODUCT_FORMAT_VERSION, PRODUCT_MAGIC};
pub use product::DataProduct;
