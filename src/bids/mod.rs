//! BIDS layout: path descriptors, discovery, and conversion of foreign
//! recordings into the standard tree.

pub mod convert;
pub mod path;

pub use convert::{
    convert_dataset_to_bids, read_recording, write_recording, ConvertError, EdfImport, Import,
    ImportError, ImportedRecording,
};
pub use path::{BidsPathError, RecordingPath, DATA_EXTENSION};

#[cfg(any(test, feature = "test-export-mocks"))]
pub use convert::MockImport;
