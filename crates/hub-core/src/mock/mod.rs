//! Rule Store and Mock Engine (§4.4).

mod engine;
mod rule;
mod store;

pub use engine::{match_path, match_query_params, synthesize_response, MatchOutcome};
pub use rule::{Collection, MatchType, MockMatch, MockResponseSpec, MockRule, QueryParam};
pub use store::RuleStore;
