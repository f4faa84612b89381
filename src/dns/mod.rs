//! DNS-related modules.

pub mod blocker;
pub mod doh;
pub mod resolver;
pub mod stats;

use hickory_proto::op::{Message, MessageType};

pub use blocker::Blocker;
pub use doh::DohResolver;
pub use resolver::{DnsResolver, UdpResolver, UpstreamResolver};
pub use stats::{QueryCounts, QueryStats};

/// An empty NOERROR response matching `query`.
///
/// Copies the id, opcode, RD and CD flags and the question section, and
/// advertises recursion.
pub fn reply_to(query: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_checking_disabled(query.checking_disabled())
        .set_recursion_available(true);
    response.add_queries(query.queries().iter().cloned());
    response
}
