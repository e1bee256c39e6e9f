pub mod builds;
pub mod deployments;
pub mod health;
