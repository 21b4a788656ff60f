// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "verification/mod.rs"]
pub mod verification;
