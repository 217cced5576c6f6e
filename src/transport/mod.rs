mod http_transport;
mod prepared_upstream;

pub use http_transport::{HttpTransport, IdleTimeout};
pub(crate) use http_transport::describe_reqwest_error;
pub use prepared_upstream::PreparedUpstream;
