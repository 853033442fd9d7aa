pub mod audit;
pub mod naming;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod signature;
pub mod storage;
pub mod worker;
