#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub use ping_error::{PingError, PingResult};
pub use ping_output::{PingEvent, PingEventReceiver, PingOutput};
pub use pinger::{Pinger, PingerConfig, SocketType};
pub use resolver::{resolve, AddressFamily, Target};
pub use statistics::{PingSummary, StopReason};
pub use stop_handle::StopHandle;
pub use ttl::Ttl;

pub(crate) use sequence_number::SequenceNumber;

mod icmp;
mod packet_processor;
mod ping_error;
mod ping_output;
mod ping_receiver;
mod ping_sender;
mod pinger;
mod records;
mod resolver;
mod sequence_number;
mod statistics;
mod stop_handle;
mod ttl;
