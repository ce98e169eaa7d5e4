pub mod candidate_pool;
pub mod chat_clients;
pub mod dispatcher;
pub mod factory;
pub mod http_oracle;
pub mod llm;
pub mod oracle;
pub mod pair_key;
pub mod reconcile;
pub mod similarity;
pub mod validator;

pub use candidate_pool::CandidatePool;
pub use oracle::{resolve_and_validate, MatchOracle};
pub use pair_key::PairKey;
