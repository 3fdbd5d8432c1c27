//! EXG-Processing: decoding and filtering for the acquisition path
//!
//! Raw frame decoding, per-channel SOS filter banks, Butterworth and notch
//! design, spatial artifact cleaning and reader-side spectral analysis.

pub mod config;
pub mod decoder;
pub mod design;
pub mod sos;
pub mod spatial;
pub mod spectrum;

pub use config::{FilterConfig, FilterSpec};
pub use decoder::{decode, FrameEncoder, SampleDecoder};
pub use design::{butter_bandpass, butter_highpass, butter_lowpass, magnitude_response, notch, FilterKind};
pub use sos::{InitialState, SosFilterBank, SosSection};
pub use spatial::{SpatialFilter, SpatialFilterConfig};
pub use spectrum::{band_power, Band, Spectrum, SpectrumAnalyzer, BANDS};
