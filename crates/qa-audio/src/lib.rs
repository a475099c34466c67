// Audio capture, analyser emulation, and feature extraction for quanta.

pub mod analyser;
pub mod capture;
pub mod error;
pub mod features;
pub mod session;
