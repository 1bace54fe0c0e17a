pub mod database; // One adapter per engine
pub mod gateway;
pub mod pipeline;
pub mod resolver; // (intent, dialect) -> query
pub mod session;
pub mod sink;

pub use database::{Connector, DatabaseAdapter, DriverConnector};
pub use gateway::{GatewaySettings, QueryGateway};
pub use pipeline::{IntrospectionPipeline, PreviewBatch, PreviewOutcome};
pub use resolver::{DiscoveryIntent, NativeCall, QuerySpec};
pub use session::ConnectionSession;
pub use sink::{Emitter, EventSink};
