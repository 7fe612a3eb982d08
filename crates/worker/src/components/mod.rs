pub mod coordinator_client;
pub mod heartbeat_manager;

pub use coordinator_client::CoordinatorClient;
pub use heartbeat_manager::HeartbeatManager;
