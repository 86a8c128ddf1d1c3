pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod options;
pub mod view;

pub use client::{Generator, HttpGenerator};
pub use config::{ClientConfig, InFlightPolicy, Variant};
pub use controller::{Controller, SubmitOutcome};
pub use error::{ControllerError, DownloadError, GenerateError, OptionsError};
pub use options::{FormData, GenerationOptions};
pub use view::{MemoryView, View, ViewState};
