pub mod analyzer;
pub mod decoder;
pub mod dsp;
pub mod engine;
pub mod graph;
pub mod shadow;
pub mod widget;

#[cfg(test)]
pub(crate) mod fakes;
