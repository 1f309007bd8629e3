//! Network layer: HTTP/1.1 framing and the encrypted record transport

pub mod http;
pub mod secure;


pub use http::{HttpRequest, HttpResponse, Method, StatusCode};
pub use secure::SecureStream;
