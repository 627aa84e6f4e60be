pub mod builders;
pub mod dns_server_mock;

pub use builders::{closed_port_addr, ForwardConfigBuilder, QueryBuilder};
pub use dns_server_mock::{MockBehavior, MockDnsServer, LARGE_ANSWER_RECORDS};
