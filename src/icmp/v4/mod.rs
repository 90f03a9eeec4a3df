mod fields;
pub use fields::{Identifier, SequenceNumber, Ttl};

mod icmpv4;
pub(crate) use icmpv4::{decode, IcmpMessage, IcmpV4};

pub(crate) mod socket;
pub use socket::raw_socket::RawSocket;
pub use socket::TSocket;
