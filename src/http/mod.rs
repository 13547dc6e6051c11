//! Request pipeline and the transport/connectivity seams it runs on.

pub mod connectivity;
pub mod pipeline;
pub mod transport;

pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityFlag};
pub use pipeline::{ApiResponse, RequestDescriptor, RequestPipeline};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
