//! longpoll - HTTP long-poll event manager
//!
//! Clients block on a category until a matching event is published or a
//! bounded timeout elapses. Events live in memory only.

pub mod cli;
pub mod http_server;
pub mod longpoll;
pub mod observability;

pub use longpoll::{
    Event, LongpollError, LongpollManager, LongpollResult, Options, PollOutcome, PollRequest,
    Watermark,
};
