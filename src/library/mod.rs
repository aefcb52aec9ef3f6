pub mod resolve_queue;
pub mod resolver;
pub mod track;
