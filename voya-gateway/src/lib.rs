pub mod gateway;
pub mod signature;

pub use gateway::{GatewayConfig, GatewayError, ReconciliationGateway, ReturnOutcome};
pub use signature::SignatureError;
