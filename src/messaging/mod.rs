//! Topic/queue messaging: the client seam, provisioning, polling and publishing

pub mod client;
pub mod envelope;
pub mod memory;
pub mod poller;
pub mod provisioner;
pub mod publisher;

pub use client::{MessagingClient, QueueMessage};
pub use memory::InMemoryBroker;
pub use poller::{PollReport, QueueBindingRuntime, QueuePoller};
pub use provisioner::{ProvisionedQueue, QueueProvisioner};
pub use publisher::Publisher;
