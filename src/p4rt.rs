pub mod pipeconf;
pub mod pool;
pub mod pure;
pub mod schema;
pub mod session;
pub mod text_format;
pub mod transport;
