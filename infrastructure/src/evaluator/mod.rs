//! Policy evaluator adapters

mod command;

pub use command::CommandPolicyEvaluator;
