pub mod link;
pub mod reconcile;
