pub mod invoker;
pub mod transport;

pub use invoker::FetchOutcome;
pub use invoker::ResilientInvoker;
pub use transport::ReportTransport;
pub use transport::TransportConfig;
