pub mod calibration;
pub mod ingest;
pub mod mapper;
pub mod mode;
