pub mod api_server;
pub mod batch_issuer;
pub mod certificate_issuer;
pub mod verifier;
