//! Query routing and conversational-context resolution.

pub mod classifier;
pub mod resolver;
pub mod router;

#[cfg(test)]
pub(crate) mod fakes;

pub use classifier::FollowUpClassifier;
pub use resolver::{FollowUpResolver, NewQueryResolver};
pub use router::{QueryRouter, DEFAULT_SESSION};
