pub mod ingress;
pub mod liveness;
pub mod readiness;
pub mod search;
