pub mod gateway;

pub use gateway::AppState;
