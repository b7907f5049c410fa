pub mod config;
pub mod error;
pub mod printer;

pub use error::{PrinterError, Result, TransportCause, UploadStep};
pub use printer::{DeviceAddress, PrinterClient};
