pub mod fft;
pub mod filters;
