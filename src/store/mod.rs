pub mod activity;
pub mod agents;
pub mod models;

pub use activity::ActivityLog;
pub use agents::AgentStore;
